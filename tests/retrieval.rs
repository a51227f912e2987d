//! End-to-end retrieval tests over the library API.
//!
//! The completion collaborator is scripted, so every path through the chat
//! engine — retrieval, context assembly, the degradation ladder, snippets,
//! persistence — runs for real against a temporary database.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::SqlitePool;

use docchat::chat::{ChatEngine, APOLOGY};
use docchat::config::{GenerationConfig, RagConfig};
use docchat::embedding::FeatureHashEmbedder;
use docchat::generate::{CompletionClient, GenerationOutcome, PromptMessage, RetryReason};
use docchat::index::VectorIndex;
use docchat::models::ChatRequest;
use docchat::segment::TextSegmenter;
use docchat::{db, ingest, migrate, store};

/// Completion client that replays a fixed outcome script and records the
/// user prompt and token budget of every attempt.
struct ScriptedClient {
    outcomes: Mutex<Vec<GenerationOutcome>>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedClient {
    fn new(outcomes: Vec<GenerationOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn always(outcome: GenerationOutcome) -> Self {
        Self {
            outcomes: Mutex::new(vec![outcome; 8]),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, messages: &[PromptMessage], max_tokens: u32) -> GenerationOutcome {
        let user_prompt = messages.last().unwrap().content.clone();
        self.calls.lock().unwrap().push((user_prompt, max_tokens));
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            GenerationOutcome::Terminal(None)
        } else {
            outcomes.remove(0)
        }
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    pool: SqlitePool,
    index: Arc<VectorIndex>,
    embedder: Arc<FeatureHashEmbedder>,
    segmenter: TextSegmenter,
    client: Arc<ScriptedClient>,
    engine: ChatEngine,
}

async fn harness(client: ScriptedClient) -> Harness {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = db::connect(&dir.path().join("docchat.sqlite")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    let rag = RagConfig {
        retry_delay_ms: 1,
        ..RagConfig::default()
    };
    let index = Arc::new(VectorIndex::new(rag.top_k));
    let embedder = Arc::new(FeatureHashEmbedder::new(rag.vector_dims));
    let segmenter = TextSegmenter::new(rag.chunk_size, rag.chunk_overlap);
    let client = Arc::new(client);

    let engine = ChatEngine::new(
        pool.clone(),
        index.clone(),
        embedder.clone(),
        client.clone(),
        rag,
        GenerationConfig::default(),
    );

    Harness {
        _dir: dir,
        pool,
        index,
        embedder,
        segmenter,
        client,
        engine,
    }
}

async fn ingest_text(h: &Harness, conversation: &str, name: &str, text: &str) -> String {
    let info = ingest::ingest_document(
        &h.pool,
        &h.index,
        &h.embedder,
        &h.segmenter,
        conversation,
        name,
        "text/plain",
        text.as_bytes(),
    )
    .await
    .unwrap();
    info.id
}

/// The context slice of a recorded user prompt.
fn context_of(user_prompt: &str) -> &str {
    let start = user_prompt
        .find("DOCUMENT CONTEXT:\n")
        .map(|i| i + "DOCUMENT CONTEXT:\n".len())
        .unwrap_or(0);
    let end = user_prompt.rfind("\n\nQUESTION:").unwrap_or(user_prompt.len());
    &user_prompt[start..end]
}

#[tokio::test]
async fn ingest_then_ask_round_trip() {
    let h = harness(ScriptedClient::new(vec![GenerationOutcome::Success(
        "Deployment uses blue-green switching.".to_string(),
    )]))
    .await;

    ingest_text(
        &h,
        "conv",
        "runbook.txt",
        "DEPLOYMENT\nWe deploy with blue-green switching behind the load balancer.\nROLLBACK\nRollback reverts the release pointer within minutes.",
    )
    .await;
    ingest_text(
        &h,
        "conv",
        "cooking.txt",
        "RECIPES\nSimmer the tomato sauce gently for an hour.",
    )
    .await;

    let response = h
        .engine
        .chat(&ChatRequest {
            message: "How does blue-green deployment switching work?".to_string(),
            conversation_id: Some("conv".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(response.answer, "Deployment uses blue-green switching.");
    assert_eq!(response.conversation_id, "conv");
    assert!(!response.sources.is_empty());

    // Scores ride along in rank order and stay in cosine bounds.
    for pair in response.sources.windows(2) {
        assert!(pair[0].relevance_score >= pair[1].relevance_score);
    }
    for source in &response.sources {
        assert!((-1.0..=1.0).contains(&source.relevance_score));
        assert!(!source.snippet.is_empty());
        assert!(!source.section.is_empty());
    }
    // The best match comes from the deployment runbook.
    assert_eq!(response.sources[0].document_name, "runbook.txt");
    assert_eq!(response.sources[0].section, "DEPLOYMENT");

    // The prompt carried the retrieved context.
    let calls = h.client.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.contains("[Document: runbook.txt]"));

    // Both sides of the turn were recorded, assistant with sources.
    let history = store::history(&h.pool, "conv").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, "user");
    assert_eq!(history[1].role, "assistant");
    assert!(history[1].sources.as_ref().is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn empty_partition_skips_retrieval() {
    let h = harness(ScriptedClient::new(vec![GenerationOutcome::Success(
        "General knowledge answer.".to_string(),
    )]))
    .await;

    let response = h
        .engine
        .chat(&ChatRequest {
            message: "What is Rust?".to_string(),
            conversation_id: None,
        })
        .await
        .unwrap();

    assert!(response.sources.is_empty());
    assert!(!response.conversation_id.is_empty());

    let calls = h.client.calls();
    assert!(calls[0]
        .0
        .starts_with("No documents have been uploaded yet."));
}

#[tokio::test]
async fn rate_limited_ladder_degrades_then_apologizes() {
    let h = harness(ScriptedClient::always(GenerationOutcome::Retryable(
        RetryReason::RateLimited,
    )))
    .await;

    // Enough long words that the five retrieved chunks exceed the degraded
    // context cap.
    let words: Vec<String> = (0..1200).map(|i| format!("terminology{:05}", i)).collect();
    ingest_text(&h, "conv", "big.txt", &format!("GLOSSARY\n{}.", words.join(" "))).await;

    let response = h
        .engine
        .chat(&ChatRequest {
            message: "Define terminology00500 please".to_string(),
            conversation_id: Some("conv".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(response.answer, APOLOGY);
    assert!(response.sources.is_empty(), "failed turns carry no sources");

    let calls = h.client.calls();
    assert_eq!(calls.len(), 2, "the ladder runs exactly two attempts");

    let full = context_of(&calls[0].0);
    let degraded = context_of(&calls[1].0);
    assert!(full.chars().count() > 10_000);
    assert!(full.chars().count() <= 40_000);
    assert!(degraded.chars().count() <= 10_000);
    assert_eq!(calls[0].1, 4096);
    assert_eq!(calls[1].1, 2000);

    // The failed turn is still recorded under its conversation.
    let history = store::history(&h.pool, "conv").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, APOLOGY);
}

#[tokio::test]
async fn terminal_error_becomes_the_answer() {
    let h = harness(ScriptedClient::new(vec![GenerationOutcome::Terminal(Some(
        "Sorry, I encountered an error (500). Please try again.".to_string(),
    ))]))
    .await;

    let response = h
        .engine
        .chat(&ChatRequest {
            message: "hello".to_string(),
            conversation_id: Some("conv".to_string()),
        })
        .await
        .unwrap();

    assert!(response.answer.contains("(500)"));
    assert!(response.sources.is_empty());
    assert_eq!(h.client.calls().len(), 1, "terminal outcomes are not retried");
}

#[tokio::test]
async fn deleted_documents_stop_appearing_in_answers() {
    let h = harness(ScriptedClient::always(GenerationOutcome::Success(
        "answer".to_string(),
    )))
    .await;

    ingest_text(&h, "conv", "keep.txt", "NOTES\nkeep talking about gardening.").await;
    let doomed = ingest_text(&h, "conv", "drop.txt", "NOTES\ndrop everything about sailing.").await;

    let before = h.index.count("conv");
    assert!(ingest::delete_document(&h.pool, &h.index, &doomed)
        .await
        .unwrap());
    assert!(h.index.count("conv") < before);

    let response = h
        .engine
        .chat(&ChatRequest {
            message: "Tell me about sailing".to_string(),
            conversation_id: Some("conv".to_string()),
        })
        .await
        .unwrap();

    assert!(response
        .sources
        .iter()
        .all(|s| s.document_name != "drop.txt"));
}

#[tokio::test]
async fn history_accumulates_across_turns() {
    let h = harness(ScriptedClient::always(GenerationOutcome::Success(
        "ok".to_string(),
    )))
    .await;

    for question in ["first question", "second question"] {
        h.engine
            .chat(&ChatRequest {
                message: question.to_string(),
                conversation_id: Some("conv".to_string()),
            })
            .await
            .unwrap();
    }

    let history = store::history(&h.pool, "conv").await.unwrap();
    let roles: Vec<&str> = history.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
    assert_eq!(history[0].content, "first question");
    assert_eq!(history[2].content, "second question");

    // The second turn's prompt carried the first turn as history.
    let calls = h.client.calls();
    assert_eq!(calls.len(), 2);

    let conversation = store::get_conversation(&h.pool, "conv").await.unwrap().unwrap();
    assert_eq!(conversation.title, "first question");
}
