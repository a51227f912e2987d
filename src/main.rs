//! # docchat CLI
//!
//! The `docchat` binary drives the chat engine from the command line and
//! hosts the HTTP server.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Create the SQLite database and run schema migrations |
//! | `docchat ingest <path>` | Ingest a file or directory into a conversation |
//! | `docchat ask "<question>"` | Ask a question in a conversation scope |
//! | `docchat documents` | List a conversation's documents |
//! | `docchat serve` | Start the HTTP JSON API |
//!
//! All commands accept a `--config` flag pointing to a TOML configuration
//! file; see `config/docchat.example.toml`.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docchat::chat::ChatEngine;
use docchat::config::{load_config, Config};
use docchat::embedding::FeatureHashEmbedder;
use docchat::generate::OpenAiClient;
use docchat::index::VectorIndex;
use docchat::models::ChatRequest;
use docchat::segment::TextSegmenter;
use docchat::{db, extract, ingest, migrate, server, store};

/// docchat — retrieval-augmented document chat with local embeddings.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Retrieval-augmented document chat with local feature-hash embeddings",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest a file, or every matching file under a directory, into a
    /// conversation's retrieval scope.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,
        /// Conversation (retrieval scope) receiving the documents.
        #[arg(long)]
        conversation: String,
    },

    /// Ask a question against a conversation's documents.
    Ask {
        /// The question text.
        question: String,
        /// Conversation (retrieval scope) to query.
        #[arg(long)]
        conversation: String,
    },

    /// List a conversation's documents and their status.
    Documents {
        #[arg(long)]
        conversation: String,
    },

    /// Start the HTTP JSON API server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config.db.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("initialized database at {}", config.db.path.display());
        }
        Commands::Ingest { path, conversation } => {
            run_ingest(&config, &path, &conversation).await?;
        }
        Commands::Ask {
            question,
            conversation,
        } => {
            run_ask(&config, &question, &conversation).await?;
        }
        Commands::Documents { conversation } => {
            let pool = db::connect(&config.db.path).await?;
            migrate::run_migrations(&pool).await?;
            let documents = store::list_documents(&pool, &conversation).await?;
            if documents.is_empty() {
                println!("no documents in conversation {}", conversation);
            } else {
                for doc in documents {
                    println!(
                        "{}  {}  {}  {} chunks",
                        doc.id,
                        doc.name,
                        doc.status.as_str(),
                        doc.total_chunks
                    );
                }
            }
        }
        Commands::Serve => {
            let completion = Arc::new(OpenAiClient::from_config(&config.generation)?);
            server::run_server(&config, completion).await?;
        }
    }

    Ok(())
}

async fn run_ingest(config: &Config, path: &Path, conversation: &str) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;

    let index = VectorIndex::new(config.rag.top_k);
    let embedder = FeatureHashEmbedder::new(config.rag.vector_dims);
    let segmenter = TextSegmenter::new(config.rag.chunk_size, config.rag.chunk_overlap);

    println!("ingest {}", path.display());
    if path.is_file() {
        let bytes = std::fs::read(path)?;
        let content_type = extract::content_type_for_path(path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let info = ingest::ingest_document(
            &pool,
            &index,
            &embedder,
            &segmenter,
            conversation,
            &name,
            content_type,
            &bytes,
        )
        .await?;
        println!("  document: {} ({})", info.name, info.status.as_str());
        println!("  chunks written: {}", info.total_chunks);
    } else {
        let summary = ingest::ingest_directory(
            &pool,
            &index,
            &embedder,
            &segmenter,
            &config.ingest,
            conversation,
            path,
        )
        .await?;
        println!("  files ingested: {}", summary.files);
        println!("  documents ready: {}", summary.documents_ready);
        println!("  documents failed: {}", summary.documents_failed);
        println!("  chunks written: {}", summary.chunks_written);
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

async fn run_ask(config: &Config, question: &str, conversation: &str) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;

    let index = Arc::new(VectorIndex::new(config.rag.top_k));
    ingest::load_index(&pool, &index).await?;
    let embedder = Arc::new(FeatureHashEmbedder::new(config.rag.vector_dims));
    let completion = Arc::new(OpenAiClient::from_config(&config.generation)?);

    let engine = ChatEngine::new(
        pool.clone(),
        index,
        embedder,
        completion,
        config.rag.clone(),
        config.generation.clone(),
    );

    let response = engine
        .chat(&ChatRequest {
            message: question.to_string(),
            conversation_id: Some(conversation.to_string()),
        })
        .await?;

    println!("{}", response.answer);
    if !response.sources.is_empty() {
        println!();
        println!("sources:");
        for source in &response.sources {
            println!(
                "  - {} / {} (score {:.3})",
                source.document_name, source.section, source.relevance_score
            );
        }
    }

    pool.close().await;
    Ok(())
}
