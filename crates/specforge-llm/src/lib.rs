//! Completion service with multi-provider fallback.
//!
//! Supports Groq, OpenAI, Anthropic (Claude), and Gemini. Providers are tried
//! in priority order; a failing provider hands over to the next one. Retrying
//! a whole completion is left to [`retry::retry_with_backoff`] so callers can
//! decide how patient to be.

pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub use retry::{retry_with_backoff, RetryPolicy};

/// Default sampling temperature for generated questions.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default completion length cap.
pub const DEFAULT_MAX_TOKENS: u32 = 256;

/// Error types for the completion service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("No providers configured")]
    NoProviders,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<Error> },
}

impl Error {
    /// Worth another attempt: rate limits, timeouts, 5xx, dropped connections.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RateLimitExceeded | Error::Request(_))
    }

    /// Missing or rejected credentials. Never retried.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::NoProviders)
    }
}

/// Result type for LLM operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Anything that can turn a system + user prompt into text.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str, temperature: f32)
        -> Result<String>;
}

/// Configuration for an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmProviderConfig {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub priority: u8,
}

impl LlmProviderConfig {
    /// Provider with default endpoint and model for its name.
    pub fn with_defaults(name: &str, api_key: impl Into<String>, priority: u8) -> Self {
        Self {
            name: name.to_string(),
            base_url: default_endpoint(name),
            model: default_model(name),
            api_key: api_key.into(),
            priority,
        }
    }
}

/// Configuration for the LLM service.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub providers: Vec<LlmProviderConfig>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: 60,
        }
    }
}

/// Runtime provider configuration.
#[derive(Debug, Clone)]
pub struct RuntimeLlmProvider {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub priority: i32,
}

impl RuntimeLlmProvider {
    pub fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl From<&LlmProviderConfig> for RuntimeLlmProvider {
    fn from(config: &LlmProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: if config.api_key.is_empty() {
                None
            } else {
                Some(config.api_key.clone())
            },
            priority: config.priority as i32,
        }
    }
}

/// Get default endpoint for a provider
pub fn default_endpoint(name: &str) -> String {
    match name {
        "groq" => "https://api.groq.com/openai/v1".to_string(),
        "gemini" => "https://generativelanguage.googleapis.com/v1beta".to_string(),
        "anthropic" => "https://api.anthropic.com/v1".to_string(),
        "openai" => "https://api.openai.com/v1".to_string(),
        _ => "https://api.openai.com/v1".to_string(),
    }
}

/// Get default model for a provider
pub fn default_model(name: &str) -> String {
    match name {
        "groq" => "llama-3.1-8b-instant".to_string(),
        "gemini" => "gemini-1.5-flash".to_string(),
        "anthropic" => "claude-3-5-haiku-20241022".to_string(),
        "openai" => "gpt-4o-mini".to_string(),
        _ => "gpt-4o-mini".to_string(),
    }
}

/// Service for completions with multi-provider fallback.
#[derive(Clone)]
pub struct LlmService {
    inner: Arc<LlmServiceInner>,
}

struct LlmServiceInner {
    providers: RwLock<Vec<RuntimeLlmProvider>>,
    client: Client,
    max_tokens: u32,
}

/// Response from LLM API
#[derive(Debug, Deserialize)]
struct LlmResponse {
    choices: Option<Vec<Choice>>,
    candidates: Option<Vec<Candidate>>,     // Gemini format
    content: Option<Vec<AnthropicContent>>, // Anthropic format
    error: Option<LlmError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}

#[derive(Debug, Deserialize)]
struct LlmError {
    message: String,
}

impl LlmService {
    /// Create LLM service from config.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Llm(format!("Failed to create HTTP client: {}", e)))?;

        let mut providers: Vec<RuntimeLlmProvider> =
            config.providers.iter().map(RuntimeLlmProvider::from).collect();
        providers.sort_by_key(|p| p.priority);

        if providers.is_empty() {
            warn!("No LLM providers configured - generated questions will fail");
        } else {
            info!(
                providers = ?providers.iter().map(|p| &p.name).collect::<Vec<_>>(),
                "LLM service initialized from config"
            );
        }

        Ok(Self {
            inner: Arc::new(LlmServiceInner {
                providers: RwLock::new(providers),
                client,
                max_tokens: config.max_tokens,
            }),
        })
    }

    /// Get provider names in priority order
    pub async fn providers(&self) -> Vec<String> {
        let guard = self.inner.providers.read().await;
        guard.iter().map(|p| p.name.clone()).collect()
    }

    /// Whether any provider has credentials.
    pub async fn is_available(&self) -> bool {
        let guard = self.inner.providers.read().await;
        guard.iter().any(RuntimeLlmProvider::has_credentials)
    }

    /// Complete a prompt with automatic provider fallback.
    pub async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        let providers = {
            let guard = self.inner.providers.read().await;
            guard.clone()
        };

        if providers.is_empty() {
            return Err(Error::NoProviders);
        }

        let mut last_error = None;

        for provider in &providers {
            if !provider.has_credentials() {
                debug!(provider = %provider.name, "Skipping provider without credentials");
                continue;
            }

            match self
                .call_provider(provider, system_prompt, user_prompt, temperature)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(
                        provider = %provider.name,
                        error = %e,
                        "Provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::Auth("no provider has an API key; set one and restart".to_string())
        }))
    }

    /// Make the actual API call to a provider.
    async fn call_provider(
        &self,
        provider: &RuntimeLlmProvider,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        let auth_token = provider
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Auth(format!("No credentials for provider {}", provider.name)))?;

        debug!(
            provider = %provider.name,
            model = %provider.model,
            "Calling LLM provider"
        );

        let (url, body) = match provider.name.as_str() {
            "gemini" => self.build_gemini_request(provider, system_prompt, user_prompt, temperature),
            "anthropic" => {
                self.build_anthropic_request(provider, system_prompt, user_prompt, temperature)
            }
            _ => self.build_openai_request(provider, system_prompt, user_prompt, temperature),
        };

        let mut request = self
            .inner
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        request = match provider.name.as_str() {
            "anthropic" => request
                .header("x-api-key", auth_token)
                .header("anthropic-version", "2023-06-01"),
            "gemini" => request.header("x-goog-api-key", auth_token),
            _ => request.header("Authorization", format!("Bearer {}", auth_token)),
        };

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Request(format!("Request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Request(format!("Failed to read response: {}", e)))?;

        if let Some(err) = classify_status(status, &text) {
            return Err(err);
        }

        self.parse_response(&provider.name, &text)
    }

    /// Build request for Gemini API
    fn build_gemini_request(
        &self,
        provider: &RuntimeLlmProvider,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> (String, Value) {
        let url = format!(
            "{}/models/{}:generateContent",
            provider.base_url, provider.model
        );

        let body = json!({
            "systemInstruction": {
                "parts": [{"text": system_prompt}]
            },
            "contents": [{
                "parts": [{"text": user_prompt}]
            }],
            "generationConfig": {
                "maxOutputTokens": self.inner.max_tokens,
                "temperature": temperature
            }
        });

        (url, body)
    }

    /// Build request for OpenAI-compatible APIs (OpenAI, Groq)
    fn build_openai_request(
        &self,
        provider: &RuntimeLlmProvider,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> (String, Value) {
        let url = format!("{}/chat/completions", provider.base_url);

        let body = json!({
            "model": provider.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "max_tokens": self.inner.max_tokens,
            "temperature": temperature
        });

        (url, body)
    }

    /// Build request for Anthropic Claude API
    fn build_anthropic_request(
        &self,
        provider: &RuntimeLlmProvider,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> (String, Value) {
        let url = format!("{}/messages", provider.base_url);

        let body = json!({
            "model": provider.model,
            "system": system_prompt,
            "messages": [
                {"role": "user", "content": user_prompt}
            ],
            "max_tokens": self.inner.max_tokens,
            "temperature": temperature
        });

        (url, body)
    }

    /// Parse response from different API formats
    fn parse_response(&self, provider: &str, text: &str) -> Result<String> {
        let response: LlmResponse = serde_json::from_str(text)
            .map_err(|e| Error::Llm(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = response.error {
            return Err(Error::Llm(error.message));
        }

        // Try Anthropic format first
        if let Some(content) = response.content {
            if let Some(content_block) = content.first() {
                return Ok(content_block.text.clone());
            }
        }

        // Try Gemini format
        if let Some(candidates) = response.candidates {
            if let Some(candidate) = candidates.first() {
                if let Some(part) = candidate.content.parts.first() {
                    return Ok(part.text.clone());
                }
            }
        }

        // Try OpenAI format
        if let Some(choices) = response.choices {
            if let Some(choice) = choices.first() {
                if let Some(message) = &choice.message {
                    return Ok(message.content.clone());
                }
                if let Some(text) = &choice.text {
                    return Ok(text.clone());
                }
            }
        }

        Err(Error::Llm(format!("No content in {} response", provider)))
    }
}

#[async_trait::async_trait]
impl CompletionProvider for LlmService {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        self.generate(system_prompt, user_prompt, temperature).await
    }
}

/// Map an HTTP status to the error taxonomy. `None` means success.
fn classify_status(status: StatusCode, body: &str) -> Option<Error> {
    if status.is_success() {
        return None;
    }

    let err = match status.as_u16() {
        401 | 403 => Error::Auth(format!("Provider rejected credentials ({})", status)),
        429 => Error::RateLimitExceeded,
        408 | 500..=599 => Error::Request(format!("Provider returned {}: {}", status, body)),
        _ => Error::Llm(format!("Provider returned {}: {}", status, body)),
    };

    Some(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_for(server: &MockServer, name: &str) -> LlmService {
        LlmService::new(&LlmConfig {
            providers: vec![LlmProviderConfig {
                name: name.to_string(),
                base_url: server.uri(),
                model: "test-model".to_string(),
                api_key: "secret".to_string(),
                priority: 1,
            }],
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_openai_compatible_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Who uses it?"}}]
            })))
            .mount(&server)
            .await;

        let service = service_for(&server, "groq");
        let text = service.complete("sys", "user", 0.7).await.unwrap();
        assert_eq!(text, "Who uses it?");
    }

    #[tokio::test]
    async fn test_anthropic_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "How often?"}]
            })))
            .mount(&server)
            .await;

        let service = service_for(&server, "anthropic");
        assert_eq!(service.complete("s", "u", 0.7).await.unwrap(), "How often?");
    }

    #[tokio::test]
    async fn test_status_classification() {
        for (status, check) in [
            (401u16, Error::is_auth as fn(&Error) -> bool),
            (429, Error::is_transient),
            (503, Error::is_transient),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let err = service_for(&server, "openai")
                .complete("s", "u", 0.7)
                .await
                .unwrap_err();
            assert!(check(&err), "status {} mapped to {:?}", status, err);
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_next_provider() {
        let failing = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&failing)
            .await;
        let healthy = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&healthy)
            .await;

        let service = LlmService::new(&LlmConfig {
            providers: vec![
                LlmProviderConfig {
                    name: "groq".into(),
                    base_url: failing.uri(),
                    model: "m".into(),
                    api_key: "k".into(),
                    priority: 1,
                },
                LlmProviderConfig {
                    name: "openai".into(),
                    base_url: healthy.uri(),
                    model: "m".into(),
                    api_key: "k".into(),
                    priority: 2,
                },
            ],
            ..Default::default()
        })
        .unwrap();

        assert_eq!(service.complete("s", "u", 0.7).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_no_providers_is_auth_error() {
        let service = LlmService::new(&LlmConfig::default()).unwrap();
        let err = service.complete("s", "u", 0.7).await.unwrap_err();
        assert!(err.is_auth());
        assert!(!service.is_available().await);
    }

    #[test]
    fn test_default_endpoints() {
        assert_eq!(default_endpoint("groq"), "https://api.groq.com/openai/v1");
        assert_eq!(
            default_endpoint("anthropic"),
            "https://api.anthropic.com/v1"
        );
        assert_eq!(default_endpoint("openai"), "https://api.openai.com/v1");
    }

    #[test]
    fn test_default_models() {
        assert_eq!(default_model("gemini"), "gemini-1.5-flash");
        assert_eq!(default_model("anthropic"), "claude-3-5-haiku-20241022");
        assert_eq!(default_model("openai"), "gpt-4o-mini");
    }
}
