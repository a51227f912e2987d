//! HTTP JSON API.
//!
//! Exposes the chat engine and document management over a small axum
//! router. Multipart parsing is deliberately not supported; uploads are
//! JSON bodies carrying either inline text or base64 data.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/chat` | Ask a question in a conversation scope |
//! | `GET`  | `/conversations` | List conversations |
//! | `GET`  | `/conversations/{id}` | Conversation with messages and documents |
//! | `DELETE` | `/conversations/{id}` | Delete a conversation and its data |
//! | `POST` | `/conversations/{id}/documents` | Upload a document (JSON) |
//! | `GET`  | `/conversations/{id}/documents` | List a conversation's documents |
//! | `DELETE` | `/documents/{id}` | Delete one document and its chunks |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "file_name must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! CORS is fully permissive to support browser clients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::ChatEngine;
use crate::config::Config;
use crate::embedding::FeatureHashEmbedder;
use crate::extract;
use crate::generate::CompletionClient;
use crate::index::VectorIndex;
use crate::ingest;
use crate::models::{ChatRequest, ConversationDetail};
use crate::segment::TextSegmenter;
use crate::store;
use crate::{db, migrate};

/// Shared state passed to all route handlers.
pub struct AppState {
    pool: sqlx::SqlitePool,
    index: Arc<VectorIndex>,
    embedder: Arc<FeatureHashEmbedder>,
    segmenter: TextSegmenter,
    engine: ChatEngine,
}

/// Start the HTTP server; runs until the process is terminated.
///
/// Connects to the database, rebuilds the in-memory index from persisted
/// chunk rows, and binds to `[server].bind`.
pub async fn run_server(config: &Config, completion: Arc<dyn CompletionClient>) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;

    let index = Arc::new(VectorIndex::new(config.rag.top_k));
    let restored = ingest::load_index(&pool, &index).await?;

    let embedder = Arc::new(FeatureHashEmbedder::new(config.rag.vector_dims));
    let segmenter = TextSegmenter::new(config.rag.chunk_size, config.rag.chunk_overlap);

    let engine = ChatEngine::new(
        pool.clone(),
        index.clone(),
        embedder.clone(),
        completion,
        config.rag.clone(),
        config.generation.clone(),
    );

    let state = Arc::new(AppState {
        pool,
        index,
        embedder,
        segmenter,
        engine,
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/conversations", get(list_conversations))
        .route(
            "/conversations/{id}",
            get(get_conversation).delete(delete_conversation),
        )
        .route(
            "/conversations/{id}/documents",
            post(upload_document).get(list_documents),
        )
        .route("/documents/{id}", delete(delete_document))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    println!("restored {} chunks into the index", restored);
    println!("listening on {}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": { "code": code, "message": message } })),
    )
        .into_response()
}

fn internal_error(err: anyhow::Error) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", &err.to_string())
}

async fn health() -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .into_response()
}

async fn chat(State(state): State<Arc<AppState>>, Json(request): Json<ChatRequest>) -> Response {
    if request.message.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "message must not be empty",
        );
    }
    match state.engine.chat(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn list_conversations(State(state): State<Arc<AppState>>) -> Response {
    match store::list_conversations(&state.pool).await {
        Ok(conversations) => Json(conversations).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn get_conversation(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let conversation = match store::get_conversation(&state.pool, &id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, "not_found", "no such conversation")
        }
        Err(err) => return internal_error(err),
    };

    let messages = match store::history(&state.pool, &id).await {
        Ok(m) => m,
        Err(err) => return internal_error(err),
    };
    let document_ids = match store::list_documents(&state.pool, &id).await {
        Ok(docs) => docs.into_iter().map(|d| d.id).collect(),
        Err(err) => return internal_error(err),
    };

    Json(ConversationDetail {
        id: conversation.id,
        title: conversation.title,
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
        messages,
        document_ids,
    })
    .into_response()
}

async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match ingest::delete_conversation(&state.pool, &state.index, &id).await {
        Ok(()) => Json(serde_json::json!({ "deleted": id })).into_response(),
        Err(err) => internal_error(err),
    }
}

/// JSON upload body: inline `text`, or `data_base64` for binary formats.
#[derive(Debug, Deserialize)]
struct UploadRequest {
    file_name: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    data_base64: Option<String>,
}

async fn upload_document(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Json(upload): Json<UploadRequest>,
) -> Response {
    if upload.file_name.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "file_name must not be empty",
        );
    }

    let bytes = if let Some(text) = &upload.text {
        text.clone().into_bytes()
    } else if let Some(data) = &upload.data_base64 {
        match BASE64.decode(data) {
            Ok(bytes) => bytes,
            Err(_) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "bad_request",
                    "data_base64 is not valid base64",
                )
            }
        }
    } else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "provide either text or data_base64",
        );
    };

    let content_type = upload
        .content_type
        .clone()
        .unwrap_or_else(|| {
            extract::content_type_for_path(std::path::Path::new(&upload.file_name)).to_string()
        });

    match ingest::ingest_document(
        &state.pool,
        &state.index,
        &state.embedder,
        &state.segmenter,
        &conversation_id,
        &upload.file_name,
        &content_type,
        &bytes,
    )
    .await
    {
        Ok(info) => Json(info).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn list_documents(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match store::list_documents(&state.pool, &id).await {
        Ok(documents) => Json(documents).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn delete_document(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match ingest::delete_document(&state.pool, &state.index, &id).await {
        Ok(true) => Json(serde_json::json!({ "deleted": id })).into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "not_found", "no such document"),
        Err(err) => internal_error(err),
    }
}
