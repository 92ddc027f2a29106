//! Embedding service with multi-provider fallback.
//!
//! Supports Gemini, OpenAI, and Ollama embedding APIs, tried in priority
//! order. When no provider is configured the service embeds locally with a
//! feature-hashing bag of words, which keeps retrieval deterministic and
//! still ranks texts that share vocabulary above unrelated ones.
//!
//! # Example
//!
//! ```no_run
//! use specforge_embeddings::{EmbeddingConfig, EmbeddingService};
//!
//! # async fn example() -> Result<(), specforge_embeddings::Error> {
//! let service = EmbeddingService::from_config(&EmbeddingConfig::default())?;
//! let vector = service.embed_single("Q: Who is it for?\nA: Dog owners").await?;
//! assert_eq!(vector.len(), 384);
//! # Ok(())
//! # }
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Dimension used when nothing else is configured.
pub const DEFAULT_DIMENSION: usize = 384;

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur in the embedding service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Internal error (HTTP client, parsing, etc.)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Provider API error
    #[error("Provider error: {0}")]
    Provider(String),

    /// No credentials configured
    #[error("No credentials configured")]
    NoCredentials,

    /// All providers failed
    #[error("All embedding providers failed")]
    AllProvidersFailed,
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Anything that maps text to a fixed-length vector.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}

// ============================================================================
// Configuration types
// ============================================================================

/// Configuration for the embedding service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// List of embedding providers in priority order.
    pub providers: Vec<EmbeddingProviderConfig>,
    /// Vector dimension requested from providers and produced locally.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            dimension: DEFAULT_DIMENSION,
        }
    }
}

/// Configuration for a single embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingProviderConfig {
    /// Provider name (e.g., "gemini", "openai", "ollama").
    pub name: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Model name to use.
    pub model: String,
    /// API key for authentication. Empty for keyless providers such as Ollama.
    pub api_key: String,
    /// Priority (lower = higher priority).
    pub priority: u8,
}

/// Get default endpoint for a provider.
pub fn default_endpoint(name: &str) -> String {
    match name {
        "gemini" => "https://generativelanguage.googleapis.com/v1beta".to_string(),
        "openai" => "https://api.openai.com/v1".to_string(),
        "ollama" => "http://localhost:11434".to_string(),
        _ => "https://api.openai.com/v1".to_string(),
    }
}

/// Get default model for a provider.
pub fn default_model(name: &str) -> String {
    match name {
        "gemini" => "text-embedding-004".to_string(),
        "openai" => "text-embedding-3-small".to_string(),
        "ollama" => "all-minilm".to_string(),
        _ => "text-embedding-3-small".to_string(),
    }
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GeminiEmbedResponse {
    embedding: Option<GeminiEmbedding>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    code: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbedResponse {
    data: Option<Vec<OpenAIEmbedding>>,
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embedding: Option<Vec<f32>>,
    error: Option<String>,
}

// ============================================================================
// Embedding service
// ============================================================================

/// Service for generating text embeddings with multi-provider fallback.
///
/// Constructed once at startup and shared; providers are only announced on
/// first use.
#[derive(Clone)]
pub struct EmbeddingService {
    inner: Arc<EmbeddingServiceInner>,
}

struct EmbeddingServiceInner {
    providers: Vec<EmbeddingProviderConfig>,
    dimension: usize,
    client: Client,
    initialized: RwLock<bool>,
}

impl EmbeddingService {
    /// Create a new embedding service from configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let mut providers = config.providers.clone();
        providers.sort_by_key(|p| p.priority);

        Ok(Self {
            inner: Arc::new(EmbeddingServiceInner {
                providers,
                dimension: config.dimension,
                client,
                initialized: RwLock::new(false),
            }),
        })
    }

    /// Get the embedding dimension.
    pub fn dimension(&self) -> usize {
        self.inner.dimension
    }

    /// Get provider names in priority order.
    pub fn providers(&self) -> Vec<String> {
        self.inner.providers.iter().map(|p| p.name.clone()).collect()
    }

    /// Check if real embedding providers are available.
    pub fn has_providers(&self) -> bool {
        !self.inner.providers.is_empty()
    }

    /// Lazily initialize the service.
    async fn ensure_initialized(&self) {
        let mut initialized = self.inner.initialized.write().await;
        if !*initialized {
            if self.inner.providers.is_empty() {
                warn!(
                    dimension = self.inner.dimension,
                    "No embedding providers configured - using local hashing embedder"
                );
            } else {
                info!(
                    providers = ?self.providers(),
                    dimension = self.inner.dimension,
                    "Embedding service ready"
                );
            }
            *initialized = true;
        }
    }

    /// Generate embedding for a single text.
    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        self.ensure_initialized().await;

        if self.inner.providers.is_empty() {
            return Ok(hash_embed(text, self.inner.dimension));
        }

        let mut last_error = None;

        for provider in &self.inner.providers {
            if provider.api_key.is_empty() && provider.name != "ollama" {
                debug!(provider = %provider.name, "Skipping provider without credentials");
                continue;
            }

            match self.call_provider(provider, text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    warn!(
                        provider = %provider.name,
                        error = %e,
                        "Embedding provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        // Configured providers that all fail are an error, not a silent downgrade
        Err(last_error.unwrap_or(Error::AllProvidersFailed))
    }

    async fn call_provider(&self, provider: &EmbeddingProviderConfig, text: &str) -> Result<Vec<f32>> {
        match provider.name.as_str() {
            "gemini" => self.call_gemini(provider, text).await,
            "openai" => self.call_openai(provider, text).await,
            "ollama" => self.call_ollama(provider, text).await,
            _ => Err(Error::Internal(format!(
                "Unknown embedding provider: {}",
                provider.name
            ))),
        }
    }

    /// Call Gemini embedding API.
    async fn call_gemini(&self, provider: &EmbeddingProviderConfig, text: &str) -> Result<Vec<f32>> {
        if provider.api_key.is_empty() {
            return Err(Error::NoCredentials);
        }

        let url = format!(
            "{}/models/{}:embedContent",
            provider.base_url, provider.model
        );

        let body = json!({
            "model": format!("models/{}", provider.model),
            "content": {
                "parts": [{"text": text}]
            },
            "outputDimensionality": self.inner.dimension
        });

        let response = self
            .inner
            .client
            .post(&url)
            .header("x-goog-api-key", &provider.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        let resp: GeminiEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to parse Gemini response: {}", e)))?;

        if let Some(error) = resp.error {
            return Err(Error::Provider(format!(
                "Gemini error ({}): {}",
                error.code.unwrap_or(status.as_u16() as i32),
                error.message
            )));
        }

        resp.embedding
            .map(|e| e.values)
            .ok_or_else(|| Error::Internal("No embedding in Gemini response".to_string()))
    }

    /// Call OpenAI embedding API.
    async fn call_openai(&self, provider: &EmbeddingProviderConfig, text: &str) -> Result<Vec<f32>> {
        if provider.api_key.is_empty() {
            return Err(Error::NoCredentials);
        }

        let url = format!("{}/embeddings", provider.base_url);

        let body = json!({
            "model": provider.model,
            "input": text,
            "dimensions": self.inner.dimension
        });

        let response = self
            .inner
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", provider.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("OpenAI request failed: {}", e)))?;

        let resp: OpenAIEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to parse OpenAI response: {}", e)))?;

        if let Some(error) = resp.error {
            return Err(Error::Provider(format!("OpenAI error: {}", error.message)));
        }

        resp.data
            .and_then(|d| d.into_iter().next())
            .map(|e| e.embedding)
            .ok_or_else(|| Error::Internal("No embedding in OpenAI response".to_string()))
    }

    /// Call Ollama embedding API.
    async fn call_ollama(&self, provider: &EmbeddingProviderConfig, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", provider.base_url);

        let body = json!({
            "model": provider.model,
            "prompt": text
        });

        let response = self
            .inner
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Ollama request failed: {}", e)))?;

        let resp: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to parse Ollama response: {}", e)))?;

        if let Some(error) = resp.error {
            return Err(Error::Provider(format!("Ollama error: {}", error)));
        }

        resp.embedding
            .ok_or_else(|| Error::Internal("No embedding in Ollama response".to_string()))
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_single(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension
    }
}

/// Scale a vector to unit L2 length. Zero vectors are left untouched.
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

/// Deterministic bag-of-words embedding using the hashing trick.
///
/// Each lowercase alphanumeric token lands in one signed bucket, so texts
/// sharing words point in similar directions. Not semantic beyond that.
pub fn hash_embed(text: &str, dim: usize) -> Vec<f32> {
    let mut embedding = vec![0.0f32; dim.max(1)];

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        token.to_lowercase().hash(&mut hasher);
        let hash = hasher.finish();

        let bucket = (hash % embedding.len() as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        embedding[bucket] += sign;
    }

    normalize(embedding)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_hash_embed_deterministic() {
        let emb1 = hash_embed("test text", 384);
        let emb2 = hash_embed("test text", 384);

        assert_eq!(emb1, emb2);
        assert_eq!(emb1.len(), 384);
    }

    #[test]
    fn test_hash_embed_normalized() {
        let emb = hash_embed("a mobile app for dog walkers", 384);
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();

        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_hash_embed_shared_vocabulary_is_closer() {
        let query = hash_embed("mobile app for dog walkers", 384);
        let related = hash_embed("Q: What is it?\nA: A mobile app that helps dog walkers", 384);
        let unrelated = hash_embed("Q: Budget?\nA: Twenty thousand euros per quarter", 384);

        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn test_normalize_leaves_zero_vector() {
        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
        let unit = normalize(vec![3.0, 4.0]);
        assert!((unit[0] - 0.6).abs() < 1e-6);
        assert!((unit[1] - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_no_providers_uses_hash_embedder() {
        let service = EmbeddingService::from_config(&EmbeddingConfig::default()).unwrap();

        assert!(!service.has_providers());
        let emb = service.embed("hello world").await.unwrap();
        assert_eq!(emb, hash_embed("hello world", DEFAULT_DIMENSION));
    }

    #[tokio::test]
    async fn test_openai_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
            })))
            .mount(&server)
            .await;

        let service = EmbeddingService::from_config(&EmbeddingConfig {
            providers: vec![EmbeddingProviderConfig {
                name: "openai".into(),
                base_url: server.uri(),
                model: "text-embedding-3-small".into(),
                api_key: "key".into(),
                priority: 1,
            }],
            dimension: 3,
        })
        .unwrap();

        assert_eq!(service.embed("hi").await.unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_ollama_provider_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "model not found"})),
            )
            .mount(&server)
            .await;

        let service = EmbeddingService::from_config(&EmbeddingConfig {
            providers: vec![EmbeddingProviderConfig {
                name: "ollama".into(),
                base_url: server.uri(),
                model: "all-minilm".into(),
                api_key: String::new(),
                priority: 1,
            }],
            dimension: 384,
        })
        .unwrap();

        let err = service.embed("hi").await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[test]
    fn test_default_endpoints() {
        assert_eq!(
            default_endpoint("gemini"),
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(default_endpoint("openai"), "https://api.openai.com/v1");
        assert_eq!(default_endpoint("ollama"), "http://localhost:11434");
    }
}
