//! Core data models used throughout docchat.
//!
//! These types represent the chunks, documents, conversations, and chat
//! responses that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// Section label assigned to content that appears before any detected heading.
pub const DEFAULT_SECTION: &str = "Introduction";

/// A bounded slice of a document's text — the unit of embedding and retrieval.
///
/// Chunks are created once during ingestion and read-only afterwards. The
/// `conversation_id` is the partition key: a chunk is never visible to a
/// search against any other conversation.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    /// Display name of the source document, propagated unchanged for citation.
    pub document_name: String,
    /// Heading detected during segmentation, or [`DEFAULT_SECTION`].
    pub section: String,
    pub content: String,
    /// Zero-based position within the document's chunk sequence.
    pub chunk_index: i64,
    pub conversation_id: String,
    /// Fixed-dimension L2-normalized vector, or all zeros for blank content.
    pub embedding: Vec<f32>,
}

/// Processing state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
        }
    }

    /// Parse the stored form; unknown values degrade to `Error`.
    pub fn from_str(s: &str) -> Self {
        match s {
            "processing" => DocumentStatus::Processing,
            "ready" => DocumentStatus::Ready,
            _ => DocumentStatus::Error,
        }
    }
}

/// Metadata for an uploaded document, scoped to one conversation.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub id: String,
    pub conversation_id: String,
    pub name: String,
    pub content_type: String,
    pub size: i64,
    pub status: DocumentStatus,
    pub total_chunks: i64,
    /// Unix milliseconds.
    pub uploaded_at: i64,
}

/// A conversation record (one retrieval partition).
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Full conversation view: metadata plus ordered messages and document ids.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    pub id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub messages: Vec<StoredMessage>,
    pub document_ids: Vec<String>,
}

/// A persisted chat message.
///
/// `sources` is an explicit optional list — user messages and failed turns
/// carry none; assistant answers carry the references they were built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceReference>>,
    /// Unix milliseconds; history is read back in ascending order.
    pub timestamp: i64,
}

/// A citation attached to an assistant answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReference {
    pub document_name: String,
    pub section: String,
    pub snippet: String,
    pub relevance_score: f64,
}

/// The ranked outcome of a single retrieval pass.
///
/// `chunks` is ordered by descending similarity; `scores` holds the same
/// ranking as `(chunk id, score)` pairs. Both come from one pass over the
/// partition, so rank and score cannot disagree. Never mutated after
/// construction.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub chunks: Vec<Chunk>,
    pub scores: Vec<(String, f64)>,
}

impl RetrievalResult {
    /// Score for a chunk id, or 0.0 when the id was not ranked.
    pub fn score_for(&self, chunk_id: &str) -> f64 {
        self.scores
            .iter()
            .find(|(id, _)| id == chunk_id)
            .map(|(_, s)| *s)
            .unwrap_or(0.0)
    }
}

/// Incoming chat request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Chat response returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub conversation_id: String,
    pub sources: Vec<SourceReference>,
}
