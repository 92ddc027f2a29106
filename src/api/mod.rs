//! API Routes for specforge
//!
//! This module combines all API routes into a single router.
//! Handlers only translate between HTTP and the investigation service.

mod sessions;
pub mod status;

use axum::Router;

use crate::AppState;

/// Build the complete API router.
///
/// Route structure:
/// - /health - Health check
/// - /sessions/* - Investigation sessions
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(status::routes())
        .nest("/sessions", sessions::routes())
}
