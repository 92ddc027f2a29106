//! Error types for specforge.
//!
//! Uses thiserror for ergonomic error definitions that integrate
//! with axum's response system.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session is unavailable: {0}")]
    CorruptedSession(String),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Provider errors
    #[error("{0}. Configure a provider API key and restart the server.")]
    ProviderAuth(String),

    #[error("Provider error: {0}")]
    Provider(String),

    // Infrastructure errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 404
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,

            // 400
            Self::Validation(_) => StatusCode::BAD_REQUEST,

            // 422
            Self::CorruptedSession(_) => StatusCode::UNPROCESSABLE_ENTITY,

            // 503
            Self::ProviderAuth(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 502
            Self::Provider(_) | Self::Embedding(_) => StatusCode::BAD_GATEWAY,

            // 500
            Self::Storage(_) | Self::VectorStore(_) | Self::Internal(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::CorruptedSession(_) => "CORRUPTED_SESSION",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ProviderAuth(_) => "PROVIDER_AUTH_ERROR",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::VectorStore(_) => "VECTOR_STORE_ERROR",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "UNKNOWN_ERROR",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

// Convenience conversions
impl From<specforge_llm::Error> for Error {
    fn from(err: specforge_llm::Error) -> Self {
        warn!(error = %err, "Completion provider failed");
        if err.is_auth() {
            Self::ProviderAuth("No usable completion provider credentials".to_string())
        } else {
            Self::Provider("Question generation is temporarily unavailable".to_string())
        }
    }
}

impl From<specforge_embeddings::Error> for Error {
    fn from(err: specforge_embeddings::Error) -> Self {
        warn!(error = %err, "Embedding provider failed");
        Self::Embedding("Embedding generation is temporarily unavailable".to_string())
    }
}

impl From<specforge_vectors::Error> for Error {
    fn from(err: specforge_vectors::Error) -> Self {
        Self::VectorStore(err.to_string())
    }
}

impl From<specforge_storage::Error> for Error {
    fn from(err: specforge_storage::Error) -> Self {
        use specforge_storage::Error as StorageError;
        match err {
            StorageError::NotFound(what) => Self::Validation(format!("Unknown {}", what)),
            StorageError::InvalidInput(msg) => Self::Validation(msg),
            StorageError::Corrupted { path, reason } => {
                warn!(path = %path, reason = %reason, "Persisted session is unreadable");
                Self::CorruptedSession(path)
            }
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<specforge_models::Error> for Error {
    fn from(err: specforge_models::Error) -> Self {
        match err {
            specforge_models::Error::UnknownCategory(c) => {
                Self::Validation(format!("Unknown category: {}", c))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
