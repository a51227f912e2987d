//! Persistence collaborators over SQLite.
//!
//! Conversations, messages, document metadata, and chunk rows. The chat
//! engine only depends on the operations here — create-or-fetch a
//! conversation, append/read messages in timestamp order, and manage
//! document/chunk rows — so the storage technology stays swappable behind
//! this module boundary.
//!
//! Chunk embeddings are stored as little-endian `f32` BLOBs
//! ([`vec_to_blob`]/[`blob_to_vec`]); they exist only so a restarted
//! process can rebuild the in-memory index.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{
    Chunk, Conversation, DocumentInfo, DocumentStatus, SourceReference, StoredMessage,
};

/// Longest auto-derived conversation title before truncation.
const TITLE_CHARS: usize = 50;

/// Encode a float vector as little-endian `f32` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Fetch the conversation with `requested_id`, creating it when absent.
///
/// A missing id gets a fresh UUID. New conversations take their title from
/// the first message, truncated to 50 characters plus an ellipsis.
pub async fn ensure_conversation(
    pool: &SqlitePool,
    requested_id: Option<&str>,
    first_message: &str,
) -> Result<Conversation> {
    let id = match requested_id {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    };

    if let Some(existing) = get_conversation(pool, &id).await? {
        return Ok(existing);
    }

    let title = derive_title(first_message);
    let now = Utc::now().timestamp_millis();
    sqlx::query("INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(&title)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    Ok(Conversation {
        id,
        title,
        created_at: now,
        updated_at: now,
    })
}

fn derive_title(first_message: &str) -> String {
    let chars: Vec<char> = first_message.chars().collect();
    if chars.len() > TITLE_CHARS {
        let mut title: String = chars[..TITLE_CHARS].iter().collect();
        title.push_str("...");
        title
    } else {
        first_message.to_string()
    }
}

pub async fn get_conversation(pool: &SqlitePool, id: &str) -> Result<Option<Conversation>> {
    let row = sqlx::query(
        "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| Conversation {
        id: r.get("id"),
        title: r.get("title"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }))
}

pub async fn list_conversations(pool: &SqlitePool) -> Result<Vec<Conversation>> {
    let rows = sqlx::query(
        "SELECT id, title, created_at, updated_at FROM conversations ORDER BY updated_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Conversation {
            id: r.get("id"),
            title: r.get("title"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        })
        .collect())
}

/// Bump the conversation's `updated_at` to now.
pub async fn touch_conversation(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a conversation's messages and its row. Documents and chunks are
/// removed by the caller's cascade before this runs.
pub async fn delete_conversation_rows(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM conversations WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Append a role-tagged message, optionally with source references.
pub async fn append_message(
    pool: &SqlitePool,
    conversation_id: &str,
    role: &str,
    content: &str,
    sources: Option<&[SourceReference]>,
) -> Result<StoredMessage> {
    let message = StoredMessage {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_string(),
        role: role.to_string(),
        content: content.to_string(),
        sources: sources.map(|s| s.to_vec()),
        timestamp: Utc::now().timestamp_millis(),
    };

    let sources_json = match &message.sources {
        Some(sources) => Some(serde_json::to_string(sources)?),
        None => None,
    };

    sqlx::query(
        "INSERT INTO messages (id, conversation_id, role, content, sources_json, timestamp) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&message.id)
    .bind(&message.conversation_id)
    .bind(&message.role)
    .bind(&message.content)
    .bind(&sources_json)
    .bind(message.timestamp)
    .execute(pool)
    .await?;

    Ok(message)
}

/// A conversation's messages in timestamp order (stable on collisions).
pub async fn history(pool: &SqlitePool, conversation_id: &str) -> Result<Vec<StoredMessage>> {
    let rows = sqlx::query(
        "SELECT id, conversation_id, role, content, sources_json, timestamp FROM messages WHERE conversation_id = ? ORDER BY timestamp ASC, rowid ASC",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let sources_json: Option<String> = r.get("sources_json");
            StoredMessage {
                id: r.get("id"),
                conversation_id: r.get("conversation_id"),
                role: r.get("role"),
                content: r.get("content"),
                sources: sources_json.and_then(|s| serde_json::from_str(&s).ok()),
                timestamp: r.get("timestamp"),
            }
        })
        .collect())
}

pub async fn insert_document(pool: &SqlitePool, info: &DocumentInfo) -> Result<()> {
    sqlx::query(
        "INSERT INTO documents (id, conversation_id, name, content_type, size, status, total_chunks, uploaded_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&info.id)
    .bind(&info.conversation_id)
    .bind(&info.name)
    .bind(&info.content_type)
    .bind(info.size)
    .bind(info.status.as_str())
    .bind(info.total_chunks)
    .bind(info.uploaded_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_document_status(
    pool: &SqlitePool,
    id: &str,
    status: DocumentStatus,
    total_chunks: i64,
) -> Result<()> {
    sqlx::query("UPDATE documents SET status = ?, total_chunks = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(total_chunks)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_document(pool: &SqlitePool, id: &str) -> Result<Option<DocumentInfo>> {
    let row = sqlx::query(
        "SELECT id, conversation_id, name, content_type, size, status, total_chunks, uploaded_at FROM documents WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(document_from_row))
}

pub async fn list_documents(pool: &SqlitePool, conversation_id: &str) -> Result<Vec<DocumentInfo>> {
    let rows = sqlx::query(
        "SELECT id, conversation_id, name, content_type, size, status, total_chunks, uploaded_at FROM documents WHERE conversation_id = ? ORDER BY uploaded_at ASC, rowid ASC",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(document_from_row).collect())
}

fn document_from_row(r: sqlx::sqlite::SqliteRow) -> DocumentInfo {
    let status: String = r.get("status");
    DocumentInfo {
        id: r.get("id"),
        conversation_id: r.get("conversation_id"),
        name: r.get("name"),
        content_type: r.get("content_type"),
        size: r.get("size"),
        status: DocumentStatus::from_str(&status),
        total_chunks: r.get("total_chunks"),
        uploaded_at: r.get("uploaded_at"),
    }
}

pub async fn delete_document_row(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Insert a document's full chunk set in one transaction, so no reader of
/// the table ever observes a partial set.
pub async fn insert_chunks(pool: &SqlitePool, chunks: &[Chunk]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for chunk in chunks {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, conversation_id, document_name, section, content, chunk_index, embedding) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(&chunk.conversation_id)
        .bind(&chunk.document_name)
        .bind(&chunk.section)
        .bind(&chunk.content)
        .bind(chunk.chunk_index)
        .bind(vec_to_blob(&chunk.embedding))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn delete_chunks_by_document(pool: &SqlitePool, document_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Every chunk row in original insertion order, for index rebuild.
pub async fn load_all_chunks(pool: &SqlitePool) -> Result<Vec<Chunk>> {
    let rows = sqlx::query(
        "SELECT id, document_id, conversation_id, document_name, section, content, chunk_index, embedding FROM chunks ORDER BY rowid ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let blob: Vec<u8> = r.get("embedding");
            Chunk {
                id: r.get("id"),
                document_id: r.get("document_id"),
                conversation_id: r.get("conversation_id"),
                document_name: r.get("document_name"),
                section: r.get("section"),
                content: r.get("content"),
                chunk_index: r.get("chunk_index"),
                embedding: blob_to_vec(&blob),
            }
        })
        .collect())
}
