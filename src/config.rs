//! TOML configuration parsing and validation.
//!
//! Configuration is read from a single file (default `./config/srag.toml`).
//! Secrets are never stored in the file: each section names the environment
//! variables that hold its credentials.
//!
//! ```toml
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [store]
//! backend = "supabase"
//! url = "https://project.supabase.co"
//!
//! [retrieval]
//! similarity_threshold = 0.5
//! escalation = "always"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use scoped_rag_core::retriever::{
    RetrievalParams, DEFAULT_FALLBACK_SCORE, DEFAULT_MIN_PER_CONTEXT, DEFAULT_SIMILARITY_THRESHOLD,
};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embedding_url")]
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: default_embedding_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_url() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Base URL of the PostgREST/Supabase project (supabase backend).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_anon_key_env")]
    pub anon_key_env: String,
    #[serde(default = "default_service_key_env")]
    pub service_key_env: String,
    /// Holds the end user's access token; the anon key is used when unset.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_caller_database_url_env")]
    pub caller_database_url_env: String,
    #[serde(default = "default_elevated_database_url_env")]
    pub elevated_database_url_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_backend() -> String {
    "supabase".to_string()
}
fn default_anon_key_env() -> String {
    "SUPABASE_ANON_KEY".to_string()
}
fn default_service_key_env() -> String {
    "SUPABASE_SERVICE_ROLE_KEY".to_string()
}
fn default_access_token_env() -> String {
    "SUPABASE_ACCESS_TOKEN".to_string()
}
fn default_caller_database_url_env() -> String {
    "DATABASE_URL".to_string()
}
fn default_elevated_database_url_env() -> String {
    "SERVICE_DATABASE_URL".to_string()
}
fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_fallback_score")]
    pub fallback_score: f64,
    #[serde(default = "default_min_per_context")]
    pub min_per_context: i64,
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    #[serde(default = "default_escalation")]
    pub escalation: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            fallback_score: default_fallback_score(),
            min_per_context: default_min_per_context(),
            default_limit: default_limit(),
            escalation: default_escalation(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}
fn default_fallback_score() -> f64 {
    DEFAULT_FALLBACK_SCORE
}
fn default_min_per_context() -> i64 {
    DEFAULT_MIN_PER_CONTEXT
}
fn default_limit() -> i64 {
    10
}
fn default_escalation() -> String {
    "always".to_string()
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            similarity_threshold: self.similarity_threshold,
            fallback_score: self.fallback_score,
            min_per_context: self.min_per_context,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate retrieval
    if !(0.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.retrieval.fallback_score) {
        anyhow::bail!("retrieval.fallback_score must be in [0.0, 1.0]");
    }
    if config.retrieval.min_per_context < 1 {
        anyhow::bail!("retrieval.min_per_context must be >= 1");
    }
    if config.retrieval.default_limit < 1 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }
    match config.retrieval.escalation.as_str() {
        "always" | "policy-rejection" | "never" => {}
        other => anyhow::bail!(
            "Unknown retrieval.escalation: '{}'. Must be always, policy-rejection, or never.",
            other
        ),
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.timeout_secs == 0 {
        anyhow::bail!("embedding.timeout_secs must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate store
    match config.store.backend.as_str() {
        "supabase" => {
            if config.store.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                anyhow::bail!("store.url must be specified when backend is 'supabase'");
            }
        }
        "postgres" => {}
        other => anyhow::bail!(
            "Unknown store backend: '{}'. Must be supabase or postgres.",
            other
        ),
    }
    if config.store.timeout_secs == 0 {
        anyhow::bail!("store.timeout_secs must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[store]
url = "https://example.supabase.co"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.embedding.provider, "disabled");
        assert_eq!(cfg.store.backend, "supabase");
        assert_eq!(cfg.store.anon_key_env, "SUPABASE_ANON_KEY");
        assert_eq!(cfg.retrieval.similarity_threshold, 0.5);
        assert_eq!(cfg.retrieval.fallback_score, 0.8);
        assert_eq!(cfg.retrieval.min_per_context, 5);
        assert_eq!(cfg.retrieval.escalation, "always");
    }

    #[test]
    fn openai_requires_model_and_dims() {
        let text = format!("{MINIMAL}\n[embedding]\nprovider = \"openai\"\n");
        let err = parse_config(&text).unwrap_err().to_string();
        assert!(err.contains("embedding.dims"), "{err}");
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let text = format!("{MINIMAL}\n[retrieval]\nsimilarity_threshold = 1.5\n");
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn rejects_unknown_escalation() {
        let text = format!("{MINIMAL}\n[retrieval]\nescalation = \"sometimes\"\n");
        let err = parse_config(&text).unwrap_err().to_string();
        assert!(err.contains("sometimes"));
    }

    #[test]
    fn supabase_backend_requires_url() {
        let err = parse_config("[store]\nbackend = \"supabase\"\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("store.url"));
    }

    #[test]
    fn postgres_backend_needs_no_url() {
        let cfg = parse_config("[store]\nbackend = \"postgres\"\n").unwrap();
        assert_eq!(cfg.store.caller_database_url_env, "DATABASE_URL");
        assert_eq!(cfg.store.max_connections, 5);
    }

    #[test]
    fn retrieval_params_follow_config() {
        let text = format!(
            "{MINIMAL}\n[retrieval]\nsimilarity_threshold = 0.3\nfallback_score = 0.6\nmin_per_context = 2\n"
        );
        let params = parse_config(&text).unwrap().retrieval.params();
        assert_eq!(params.similarity_threshold, 0.3);
        assert_eq!(params.fallback_score, 0.6);
        assert_eq!(params.min_per_context, 2);
    }
}
