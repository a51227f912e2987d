//! Document ingestion pipeline.
//!
//! Coordinates the full upload flow: extraction → segmentation → embedding
//! → chunk persistence → index insertion, with the document status moving
//! `processing → ready` (or `error` when extraction fails, in which case no
//! chunks are committed). Also owns the deletion cascades and the index
//! rebuild used at startup.

use anyhow::Result;
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sqlx::SqlitePool;
use std::path::Path;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::embedding::FeatureHashEmbedder;
use crate::extract;
use crate::index::VectorIndex;
use crate::models::{Chunk, DocumentInfo, DocumentStatus};
use crate::segment::TextSegmenter;
use crate::store;

/// Ingest one document into a conversation's partition.
///
/// Extraction failure is contained: the document row ends in `error`, no
/// chunks are committed anywhere, and the failed info is returned rather
/// than an `Err`. Database errors still propagate.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_document(
    pool: &SqlitePool,
    index: &VectorIndex,
    embedder: &FeatureHashEmbedder,
    segmenter: &TextSegmenter,
    conversation_id: &str,
    file_name: &str,
    content_type: &str,
    bytes: &[u8],
) -> Result<DocumentInfo> {
    let mut info = DocumentInfo {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_string(),
        name: file_name.to_string(),
        content_type: content_type.to_string(),
        size: bytes.len() as i64,
        status: DocumentStatus::Processing,
        total_chunks: 0,
        uploaded_at: Utc::now().timestamp_millis(),
    };
    store::insert_document(pool, &info).await?;

    let text = match extract::extract_text(bytes, content_type) {
        Ok(text) => text,
        Err(_) => {
            store::set_document_status(pool, &info.id, DocumentStatus::Error, 0).await?;
            info.status = DocumentStatus::Error;
            return Ok(info);
        }
    };

    let segments = segmenter.segment(&text);
    let mut chunks = Vec::with_capacity(segments.len());
    for (i, segment) in segments.iter().enumerate() {
        chunks.push(Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: info.id.clone(),
            document_name: info.name.clone(),
            section: segment.section.clone(),
            content: segment.content.clone(),
            chunk_index: i as i64,
            conversation_id: conversation_id.to_string(),
            embedding: embedder.embed(&segment.content),
        });
    }

    store::insert_chunks(pool, &chunks).await?;
    for chunk in &chunks {
        index.add(conversation_id, chunk.clone());
    }

    store::set_document_status(pool, &info.id, DocumentStatus::Ready, chunks.len() as i64).await?;
    info.status = DocumentStatus::Ready;
    info.total_chunks = chunks.len() as i64;
    Ok(info)
}

/// Delete a document and every chunk it owns, in index and store.
///
/// Returns `false` when the document does not exist.
pub async fn delete_document(
    pool: &SqlitePool,
    index: &VectorIndex,
    document_id: &str,
) -> Result<bool> {
    let Some(info) = store::get_document(pool, document_id).await? else {
        return Ok(false);
    };

    index.remove_by_document(&info.conversation_id, document_id);
    store::delete_chunks_by_document(pool, document_id).await?;
    store::delete_document_row(pool, document_id).await?;
    Ok(true)
}

/// Tear down a conversation: its documents (with chunks), messages, and the
/// conversation row itself.
pub async fn delete_conversation(
    pool: &SqlitePool,
    index: &VectorIndex,
    conversation_id: &str,
) -> Result<()> {
    for doc in store::list_documents(pool, conversation_id).await? {
        delete_document(pool, index, &doc.id).await?;
    }
    index.remove_partition(conversation_id);
    store::delete_conversation_rows(pool, conversation_id).await?;
    Ok(())
}

/// Rebuild the in-memory index from persisted chunk rows.
///
/// Rows come back in insertion order, so tie-breaking in later searches
/// matches the original process.
pub async fn load_index(pool: &SqlitePool, index: &VectorIndex) -> Result<usize> {
    let chunks = store::load_all_chunks(pool).await?;
    let count = chunks.len();
    for chunk in chunks {
        let partition = chunk.conversation_id.clone();
        index.add(&partition, chunk);
    }
    Ok(count)
}

/// Outcome counts for a directory ingest run.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub files: usize,
    pub documents_ready: usize,
    pub documents_failed: usize,
    pub chunks_written: usize,
}

/// Ingest every file under `root` matching the configured glob patterns.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_directory(
    pool: &SqlitePool,
    index: &VectorIndex,
    embedder: &FeatureHashEmbedder,
    segmenter: &TextSegmenter,
    ingest_config: &IngestConfig,
    conversation_id: &str,
    root: &Path,
) -> Result<IngestSummary> {
    let include = build_glob_set(&ingest_config.include_globs)?;
    let exclude = build_glob_set(&ingest_config.exclude_globs)?;

    let mut summary = IngestSummary::default();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if !include.is_match(rel) || exclude.is_match(rel) {
            continue;
        }

        let bytes = std::fs::read(entry.path())?;
        let content_type = extract::content_type_for_path(entry.path());
        let name = entry.file_name().to_string_lossy().to_string();
        let info = ingest_document(
            pool,
            index,
            embedder,
            segmenter,
            conversation_id,
            &name,
            content_type,
            &bytes,
        )
        .await?;

        summary.files += 1;
        if info.status == DocumentStatus::Ready {
            summary.documents_ready += 1;
            summary.chunks_written += info.total_chunks as usize;
        } else {
            summary.documents_failed += 1;
        }
    }

    Ok(summary)
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
