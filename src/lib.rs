//! specforge - Conversation Investigation Engine
//!
//! Interviews a user about a product idea one category at a time, keeps a
//! searchable record of every answer, and turns the finished conversation
//! into a structured technical brief.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod state;

pub use config::config;
pub use error::{Error, Result};
pub use state::AppState;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Full HTTP application with tracing and CORS layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(api::routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
