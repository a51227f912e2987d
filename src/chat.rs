//! Retrieval orchestration: from a user question to a cited answer.
//!
//! [`ChatEngine`] owns one query's whole path: create-or-fetch the
//! conversation, retrieve ranked chunks (skipping embedding entirely for
//! empty partitions), assemble a length-capped context, run the generation
//! degradation ladder, derive per-chunk snippets from the query plus the
//! answer, and persist both sides of the turn.
//!
//! The ladder is a pure state machine over [`GenerationOutcome`]: a
//! retryable outcome earns one degraded attempt (smaller context, shorter
//! history, fewer tokens) after a short pause; a terminal outcome with a
//! message becomes the answer immediately; everything else ends in a fixed
//! apology. Failures never surface as errors to the caller — the turn is
//! still recorded under its conversation id.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{GenerationConfig, RagConfig};
use crate::embedding::FeatureHashEmbedder;
use crate::generate::{CompletionClient, GenerationOutcome, PromptMessage};
use crate::index::VectorIndex;
use crate::models::{ChatRequest, ChatResponse, Chunk, RetrievalResult, SourceReference, StoredMessage};
use crate::snippet;
use crate::store;

/// Returned when the ladder is exhausted or the provider failed silently.
pub const APOLOGY: &str =
    "Sorry, the AI service is temporarily overloaded. Please try again in a few seconds.";

const SYSTEM_PROMPT: &str = "You are a document analysis assistant answering questions from the document context provided with each request.

Rules:
1. Base your answers only on the provided document context.
2. If the context does not contain the answer, state that clearly, but offer related insights from the documents when possible.
3. Cite the document name and section when providing information.
4. Respond in the same language as the user.
5. Use clean Markdown (headers, tables, bold text) for technical or structured data.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// How one run of the degradation ladder ended.
enum LadderOutcome {
    /// The model produced an answer; sources should be attached.
    Answered(String),
    /// A user-facing failure text; the turn carries no sources.
    Failed(String),
}

/// The retrieval orchestrator.
pub struct ChatEngine {
    pool: SqlitePool,
    index: Arc<VectorIndex>,
    embedder: Arc<FeatureHashEmbedder>,
    completion: Arc<dyn CompletionClient>,
    rag: RagConfig,
    generation: GenerationConfig,
}

impl ChatEngine {
    pub fn new(
        pool: SqlitePool,
        index: Arc<VectorIndex>,
        embedder: Arc<FeatureHashEmbedder>,
        completion: Arc<dyn CompletionClient>,
        rag: RagConfig,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            pool,
            index,
            embedder,
            completion,
            rag,
            generation,
        }
    }

    /// Handle one user question end to end.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let conversation =
            store::ensure_conversation(&self.pool, request.conversation_id.as_deref(), &request.message)
                .await?;

        store::append_message(&self.pool, &conversation.id, "user", &request.message, None).await?;

        // Empty partition: skip the embedding work entirely.
        let retrieval = if self.index.count(&conversation.id) > 0 {
            let query_embedding = self.embedder.embed(&request.message);
            self.index.search_ranked(&conversation.id, &query_embedding)
        } else {
            RetrievalResult::default()
        };

        let context = assemble_context(&retrieval.chunks, self.rag.context_char_cap);
        let history = store::history(&self.pool, &conversation.id).await?;

        let outcome = run_generation_ladder(
            self.completion.as_ref(),
            &self.rag,
            &self.generation,
            &request.message,
            &context,
            &history,
        )
        .await;

        let (answer, sources) = match outcome {
            LadderOutcome::Answered(answer) => {
                // Snippets need the answer: the search context is the query
                // concatenated with the generated text.
                let search_context = format!("{} {}", request.message, answer);
                let sources = retrieval
                    .chunks
                    .iter()
                    .map(|chunk| self.source_reference(chunk, &retrieval, &search_context))
                    .collect();
                (answer, sources)
            }
            LadderOutcome::Failed(answer) => (answer, Vec::new()),
        };

        // A failed turn is recorded without sources.
        let stored_sources = if sources.is_empty() {
            None
        } else {
            Some(sources.as_slice())
        };
        store::append_message(&self.pool, &conversation.id, "assistant", &answer, stored_sources)
            .await?;
        store::touch_conversation(&self.pool, &conversation.id).await?;

        Ok(ChatResponse {
            answer,
            conversation_id: conversation.id,
            sources,
        })
    }

    fn source_reference(
        &self,
        chunk: &Chunk,
        retrieval: &RetrievalResult,
        search_context: &str,
    ) -> SourceReference {
        SourceReference {
            document_name: chunk.document_name.clone(),
            section: chunk.section.clone(),
            snippet: snippet::smart_snippet(
                &chunk.content,
                search_context,
                self.rag.snippet_window,
                self.rag.snippet_lead,
            ),
            relevance_score: retrieval.score_for(&chunk.id),
        }
    }
}

/// Assemble ranked chunks into one context string bounded by `cap` chars.
///
/// Each block is `[Document: name]` plus the chunk content; blocks join
/// with a fixed delimiter. The would-exceed check includes the delimiter,
/// so the result never exceeds the cap: an oversized first block is
/// truncated to exactly `cap` characters, an oversized later block stops
/// assembly.
fn assemble_context(chunks: &[Chunk], cap: usize) -> String {
    let mut context = String::new();
    let mut used_chars = 0usize;

    for chunk in chunks {
        let entry = format!("[Document: {}]\n{}", chunk.document_name, chunk.content);
        let entry_chars = entry.chars().count();
        let separator_chars = if context.is_empty() {
            0
        } else {
            CONTEXT_SEPARATOR.len()
        };

        if used_chars + separator_chars + entry_chars > cap {
            if context.is_empty() {
                context = entry.chars().take(cap).collect();
            }
            break;
        }

        if !context.is_empty() {
            context.push_str(CONTEXT_SEPARATOR);
        }
        context.push_str(&entry);
        used_chars += separator_chars + entry_chars;
    }

    context
}

/// Run up to `max_attempts` generation attempts, degrading after the first.
async fn run_generation_ladder(
    client: &dyn CompletionClient,
    rag: &RagConfig,
    generation: &GenerationConfig,
    question: &str,
    context: &str,
    history: &[StoredMessage],
) -> LadderOutcome {
    for attempt in 0..rag.max_attempts {
        let degraded = attempt > 0;

        let attempt_context = if degraded {
            truncate_chars(context, rag.degraded_context_cap)
        } else {
            context.to_string()
        };
        let window = if degraded {
            rag.degraded_history_window
        } else {
            rag.history_window
        };
        let message_cap = if degraded {
            Some(rag.degraded_message_cap)
        } else {
            None
        };
        let max_tokens = if degraded {
            generation.degraded_max_tokens
        } else {
            generation.max_tokens
        };

        let messages = build_messages(question, &attempt_context, history, window, message_cap);

        match client.complete(&messages, max_tokens).await {
            GenerationOutcome::Success(text) => return LadderOutcome::Answered(text),
            GenerationOutcome::Terminal(Some(message)) => return LadderOutcome::Failed(message),
            GenerationOutcome::Terminal(None) => return LadderOutcome::Failed(APOLOGY.to_string()),
            GenerationOutcome::Retryable(_) => {
                if attempt + 1 < rag.max_attempts {
                    tokio::time::sleep(Duration::from_millis(rag.retry_delay_ms)).await;
                }
            }
        }
    }

    LadderOutcome::Failed(APOLOGY.to_string())
}

/// Build the role-tagged message list for one attempt.
///
/// History keeps the last `window` entries minus the final one — that is
/// the in-flight user message, which rides inside the user prompt instead.
/// `message_cap` truncates each history message on the degraded attempt.
fn build_messages(
    question: &str,
    context: &str,
    history: &[StoredMessage],
    window: usize,
    message_cap: Option<usize>,
) -> Vec<PromptMessage> {
    let mut messages = vec![PromptMessage::new("system", SYSTEM_PROMPT)];

    let start = history.len().saturating_sub(window);
    let recent = &history[start..];
    let prior = &recent[..recent.len().saturating_sub(1)];
    for message in prior {
        let content = match message_cap {
            Some(cap) if message.content.chars().count() > cap => {
                let mut truncated: String = message.content.chars().take(cap).collect();
                truncated.push_str("...");
                truncated
            }
            _ => message.content.clone(),
        };
        messages.push(PromptMessage::new(&message.role, content));
    }

    let user_prompt = if context.trim().is_empty() {
        format!(
            "No documents have been uploaded yet. Please answer this general question:\n\n{}",
            question
        )
    } else {
        format!(
            "Based on the following document context, answer the question.\n\nDOCUMENT CONTEXT:\n{}\n\nQUESTION: {}",
            context, question
        )
    };
    messages.push(PromptMessage::new("user", user_prompt));

    messages
}

fn truncate_chars(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}
