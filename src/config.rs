//! Configuration management for specforge.
//!
//! Loads configuration from environment variables (and a `.env` file when
//! present) with support for:
//! - Multiple completion providers with fallback priority
//! - Embedding providers, or the local hashing embedder when none are set
//! - In-memory or Qdrant vector storage
//! - Investigation tuning constants

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use specforge_embeddings::{EmbeddingConfig, EmbeddingProviderConfig};
use specforge_llm::{LlmConfig, LlmProviderConfig, RetryPolicy};
use specforge_vectors::QdrantConfig;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub vectors: VectorConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub investigation: InvestigationConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    /// Markdown transcripts, one per session.
    pub fn transcripts_dir(&self) -> PathBuf {
        self.data_dir.join("conversations")
    }

    /// JSON session snapshots.
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    Memory,
    Qdrant,
}

impl FromStr for VectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(format!("Unknown vector backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorConfig {
    pub backend: VectorBackend,
    pub qdrant: QdrantConfig,
}

/// Tuning for the question flow, retrieval, and synthesis.
#[derive(Debug, Clone)]
pub struct InvestigationConfig {
    /// Answers with fewer words trigger a follow-up.
    pub followup_word_threshold: usize,
    /// Age at which recency weight halves.
    pub recency_half_life_hours: f64,
    pub similarity_weight: f64,
    pub recency_weight: f64,
    pub context_top_k: usize,
    pub context_max_tokens: usize,
    /// Completed pairs between automatic checkpoints.
    pub checkpoint_interval: usize,
    pub prompt_token_budget: usize,
    pub max_answer_chars: usize,
    pub temperature: f32,
    pub retry: RetryPolicy,
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            followup_word_threshold: 15,
            recency_half_life_hours: 24.0,
            similarity_weight: 0.7,
            recency_weight: 0.3,
            context_top_k: 5,
            context_max_tokens: 4000,
            checkpoint_interval: 5,
            prompt_token_budget: 8000,
            max_answer_chars: 5000,
            temperature: specforge_llm::DEFAULT_TEMPERATURE,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = InvestigationConfig::default();

        Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0"),
                port: env_parse("PORT", 8000),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from(env_or("DATA_DIR", "./data")),
            },
            vectors: VectorConfig {
                backend: env_parse("VECTOR_BACKEND", VectorBackend::Memory),
                qdrant: QdrantConfig::new(
                    env_or("QDRANT_URL", "http://localhost:6334"),
                    env_or("QDRANT_COLLECTION_PREFIX", "specforge_"),
                ),
            },
            embedding: Self::parse_embedding_config(),
            llm: LlmConfig {
                providers: Self::parse_llm_providers(),
                ..Default::default()
            },
            investigation: InvestigationConfig {
                followup_word_threshold: env_parse(
                    "FOLLOWUP_WORD_THRESHOLD",
                    defaults.followup_word_threshold,
                ),
                recency_half_life_hours: env_parse(
                    "RECENCY_HALF_LIFE_HOURS",
                    defaults.recency_half_life_hours,
                ),
                similarity_weight: defaults.similarity_weight,
                recency_weight: defaults.recency_weight,
                context_top_k: env_parse("CONTEXT_TOP_K", defaults.context_top_k),
                context_max_tokens: env_parse("CONTEXT_MAX_TOKENS", defaults.context_max_tokens),
                checkpoint_interval: env_parse("CHECKPOINT_INTERVAL", defaults.checkpoint_interval)
                    .max(1),
                prompt_token_budget: env_parse("PROMPT_TOKEN_BUDGET", defaults.prompt_token_budget),
                max_answer_chars: env_parse("MAX_ANSWER_CHARS", defaults.max_answer_chars),
                temperature: env_parse("LLM_TEMPERATURE", defaults.temperature),
                retry: RetryPolicy::new(
                    env_parse("RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts),
                    Duration::from_secs(env_parse("RETRY_BASE_DELAY_SECS", 2)),
                    Duration::from_secs(env_parse("RETRY_MAX_DELAY_SECS", 10)),
                ),
            },
        }
    }

    /// Parse completion providers from environment.
    /// Groq first (fast, free tier), then OpenAI, Anthropic, and Gemini.
    fn parse_llm_providers() -> Vec<LlmProviderConfig> {
        let mut providers = Vec::new();

        for (priority, name, key_var, model_var) in [
            (1u8, "groq", "GROQ_API_KEY", "GROQ_MODEL"),
            (2, "openai", "OPENAI_API_KEY", "OPENAI_MODEL"),
            (3, "anthropic", "ANTHROPIC_API_KEY", "ANTHROPIC_MODEL"),
            (4, "gemini", "GOOGLE_API_KEY", "GEMINI_MODEL"),
        ] {
            if let Ok(api_key) = env::var(key_var) {
                let mut provider = LlmProviderConfig::with_defaults(name, api_key, priority);
                if let Ok(model) = env::var(model_var) {
                    provider.model = model;
                }
                providers.push(provider);
            }
        }

        providers.sort_by_key(|p| p.priority);
        providers
    }

    /// Parse embedding providers from environment.
    /// A local Ollama wins over hosted APIs when configured.
    fn parse_embedding_config() -> EmbeddingConfig {
        let mut providers = Vec::new();

        if let Ok(ollama_url) = env::var("OLLAMA_URL") {
            providers.push(EmbeddingProviderConfig {
                name: "ollama".to_string(),
                base_url: ollama_url,
                model: env_or(
                    "OLLAMA_EMBEDDING_MODEL",
                    &specforge_embeddings::default_model("ollama"),
                ),
                api_key: String::new(), // No authentication needed
                priority: 1,
            });
        }

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            providers.push(EmbeddingProviderConfig {
                name: "openai".to_string(),
                base_url: specforge_embeddings::default_endpoint("openai"),
                model: env_or(
                    "OPENAI_EMBEDDING_MODEL",
                    &specforge_embeddings::default_model("openai"),
                ),
                api_key,
                priority: 2,
            });
        }

        if let Ok(api_key) = env::var("GOOGLE_API_KEY") {
            providers.push(EmbeddingProviderConfig {
                name: "gemini".to_string(),
                base_url: specforge_embeddings::default_endpoint("gemini"),
                model: env_or(
                    "GEMINI_EMBEDDING_MODEL",
                    &specforge_embeddings::default_model("gemini"),
                ),
                api_key,
                priority: 3,
            });
        }

        providers.sort_by_key(|p| p.priority);

        EmbeddingConfig {
            providers,
            dimension: env_parse("EMBEDDING_DIMENSION", specforge_embeddings::DEFAULT_DIMENSION),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an env var, falling back to `default` when unset or malformed.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring malformed configuration value");
            default
        }),
        Err(_) => default,
    }
}
