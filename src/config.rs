use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Retrieval-pipeline tunables. Read once at startup; never user input.
#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    /// Embedding vector dimensionality.
    #[serde(default = "default_vector_dims")]
    pub vector_dims: usize,
    /// Maximum chunks returned per search.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Chunk size in words.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between consecutive chunks, in words.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Hard cap on the assembled document context, in characters.
    #[serde(default = "default_context_char_cap")]
    pub context_char_cap: usize,
    /// Context cap used on the degraded retry attempt.
    #[serde(default = "default_degraded_context_cap")]
    pub degraded_context_cap: usize,
    /// Prior history entries sent on the first attempt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Prior history entries sent on the degraded attempt.
    #[serde(default = "default_degraded_history_window")]
    pub degraded_history_window: usize,
    /// Per-message character cap applied to history on the degraded attempt.
    #[serde(default = "default_degraded_message_cap")]
    pub degraded_message_cap: usize,
    /// Smart-snippet window width in characters.
    #[serde(default = "default_snippet_window")]
    pub snippet_window: usize,
    /// Leading context added before the densest snippet window.
    #[serde(default = "default_snippet_lead")]
    pub snippet_lead: usize,
    /// Generation attempts before giving up (the degradation ladder length).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Pause between generation attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            vector_dims: default_vector_dims(),
            top_k: default_top_k(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            context_char_cap: default_context_char_cap(),
            degraded_context_cap: default_degraded_context_cap(),
            history_window: default_history_window(),
            degraded_history_window: default_degraded_history_window(),
            degraded_message_cap: default_degraded_message_cap(),
            snippet_window: default_snippet_window(),
            snippet_lead: default_snippet_lead(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_vector_dims() -> usize {
    512
}
fn default_top_k() -> usize {
    5
}
fn default_chunk_size() -> usize {
    200
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_context_char_cap() -> usize {
    40_000
}
fn default_degraded_context_cap() -> usize {
    10_000
}
fn default_history_window() -> usize {
    20
}
fn default_degraded_history_window() -> usize {
    5
}
fn default_degraded_message_cap() -> usize {
    300
}
fn default_snippet_window() -> usize {
    200
}
fn default_snippet_lead() -> usize {
    40
}
fn default_max_attempts() -> usize {
    2
}
fn default_retry_delay_ms() -> u64 {
    2000
}

/// Settings for the OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Token budget used on the degraded retry attempt.
    #[serde(default = "default_degraded_max_tokens")]
    pub degraded_max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            degraded_max_tokens: default_degraded_max_tokens(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.5
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_degraded_max_tokens() -> u32 {
    2000
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// File-matching patterns for the CLI `ingest` command.
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
        "**/*.pdf".to_string(),
        "**/*.docx".to_string(),
    ]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.rag.vector_dims == 0 {
        anyhow::bail!("rag.vector_dims must be > 0");
    }

    if config.rag.top_k == 0 {
        anyhow::bail!("rag.top_k must be >= 1");
    }

    if config.rag.chunk_size == 0 {
        anyhow::bail!("rag.chunk_size must be > 0");
    }

    if config.rag.chunk_overlap >= config.rag.chunk_size {
        anyhow::bail!("rag.chunk_overlap must be smaller than rag.chunk_size");
    }

    if config.rag.degraded_context_cap > config.rag.context_char_cap {
        anyhow::bail!("rag.degraded_context_cap must not exceed rag.context_char_cap");
    }

    if config.rag.max_attempts == 0 {
        anyhow::bail!("rag.max_attempts must be >= 1");
    }

    if config.generation.base_url.is_empty() || config.generation.model.is_empty() {
        anyhow::bail!("generation.base_url and generation.model must be set");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("docchat.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let (_dir, path) = write_config(
            r#"[db]
path = "/tmp/docchat.sqlite"

[server]
bind = "127.0.0.1:8087"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.rag.vector_dims, 512);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.rag.chunk_size, 200);
        assert_eq!(config.rag.chunk_overlap, 50);
        assert_eq!(config.rag.context_char_cap, 40_000);
        assert_eq!(config.rag.max_attempts, 2);
        assert_eq!(config.generation.max_tokens, 4096);
        assert_eq!(config.generation.degraded_max_tokens, 2000);
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let (_dir, path) = write_config(
            r#"[db]
path = "/tmp/docchat.sqlite"

[rag]
chunk_size = 50
chunk_overlap = 50

[server]
bind = "127.0.0.1:8087"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn zero_dims_rejected() {
        let (_dir, path) = write_config(
            r#"[db]
path = "/tmp/docchat.sqlite"

[rag]
vector_dims = 0

[server]
bind = "127.0.0.1:8087"
"#,
        );
        assert!(load_config(&path).is_err());
    }
}
