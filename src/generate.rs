//! Generative-model collaborator.
//!
//! The [`CompletionClient`] trait is the seam between the retrieval
//! orchestrator and whatever produces answers; the shipped implementation
//! talks to an OpenAI-compatible `/chat/completions` endpoint. Provider
//! failures are never raised as errors — every call resolves to a
//! [`GenerationOutcome`], and the retry ladder in the chat engine is a pure
//! state machine over that type.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::GenerationConfig;

/// Why an attempt may be retried with a smaller payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    RateLimited,
    Overloaded,
    PayloadTooLarge,
    Timeout,
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryReason::RateLimited => write!(f, "rate limited"),
            RetryReason::Overloaded => write!(f, "overloaded"),
            RetryReason::PayloadTooLarge => write!(f, "payload too large"),
            RetryReason::Timeout => write!(f, "timeout"),
        }
    }
}

/// Result of one generation attempt.
///
/// - `Success` carries the generated answer.
/// - `Retryable` asks the caller to try again with a degraded payload.
/// - `Terminal(Some(_))` carries a user-facing error answer; no retry.
/// - `Terminal(None)` is a transport or parse failure with nothing to show;
///   the caller treats it as ladder exhaustion.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Success(String),
    Retryable(RetryReason),
    Terminal(Option<String>),
}

/// A role-tagged message in the completion request.
#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Seam for answer generation; implemented over HTTP in production and by
/// scripted fakes in tests.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage], max_tokens: u32) -> GenerationOutcome;
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    api_key: String,
}

impl OpenAiClient {
    /// Build the client from `[generation]` config; the API key is read
    /// from the environment variable the config names.
    pub fn from_config(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[PromptMessage], max_tokens: u32) -> GenerationOutcome {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": max_tokens,
        });

        let response = match self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return GenerationOutcome::Retryable(RetryReason::Timeout),
            Err(_) => return GenerationOutcome::Terminal(None),
        };

        let status = response.status();
        match status.as_u16() {
            429 => return GenerationOutcome::Retryable(RetryReason::RateLimited),
            503 => return GenerationOutcome::Retryable(RetryReason::Overloaded),
            _ => {}
        }

        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 413 || body_text.contains("too large") {
                return GenerationOutcome::Retryable(RetryReason::PayloadTooLarge);
            }
            return GenerationOutcome::Terminal(Some(format!(
                "Sorry, I encountered an error ({}). Please try again.",
                status.as_u16()
            )));
        }

        let json: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(_) => return GenerationOutcome::Terminal(None),
        };

        match json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
        {
            Some(text) => GenerationOutcome::Success(text.to_string()),
            None => GenerationOutcome::Terminal(None),
        }
    }
}
