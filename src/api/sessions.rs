//! Sessions Routes
//!
//! Investigation lifecycle over HTTP.
//!
//! Routes:
//! - POST /sessions - Start a new investigation
//! - GET /sessions - List saved sessions
//! - GET /sessions/:session_id - Session status and progress
//! - DELETE /sessions/:session_id - Delete a session everywhere
//! - POST /sessions/:session_id/answers - Answer the pending question
//! - POST /sessions/:session_id/skip - Skip the current category
//! - GET /sessions/:session_id/messages - Conversation history
//! - PUT /sessions/:session_id/messages/:message_id - Edit a previous answer
//! - POST /sessions/:session_id/save - Save a snapshot now
//! - POST /sessions/:session_id/load - Restore the saved snapshot
//! - POST /sessions/:session_id/prompt - Regenerate the synthesized prompt

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use specforge_models::{Message, Question, SessionSummary};

use crate::services::{AnswerOutcome, SessionStatus, SynthesisOptions, SynthesizedPrompt};
use crate::{AppState, Result};

/// Build session routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions).post(start_session))
        .route("/:session_id", get(get_status).delete(delete_session))
        .route("/:session_id/answers", post(submit_answer))
        .route("/:session_id/skip", post(skip_question))
        .route("/:session_id/messages", get(get_history))
        .route("/:session_id/messages/:message_id", put(edit_answer))
        .route("/:session_id/save", post(save_session))
        .route("/:session_id/load", post(load_session))
        .route("/:session_id/prompt", post(synthesize_prompt))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response to starting an investigation.
#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub first_question: Question,
}

/// Request body carrying an answer.
#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
}

/// Either the next question or the completion signal with the prompt.
#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_question: Option<Question>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesized_prompt: Option<SynthesizedPrompt>,
}

impl From<AnswerOutcome> for AnswerResponse {
    fn from(outcome: AnswerOutcome) -> Self {
        match outcome {
            AnswerOutcome::Question { question } => Self {
                complete: false,
                next_question: Some(question),
                synthesized_prompt: None,
            },
            AnswerOutcome::Complete { prompt } => Self {
                complete: true,
                next_question: None,
                synthesized_prompt: Some(prompt),
            },
        }
    }
}

/// Conversation history.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
}

/// Saved session listing.
#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

async fn start_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<StartSessionResponse>)> {
    let started = state.investigation.start_session().await?;

    Ok((
        StatusCode::CREATED,
        Json(StartSessionResponse {
            session_id: started.session_id,
            first_question: started.question,
        }),
    ))
}

async fn list_sessions(State(state): State<AppState>) -> Result<Json<ListSessionsResponse>> {
    let sessions = state.investigation.list_saved_sessions().await?;

    Ok(Json(ListSessionsResponse {
        total: sessions.len(),
        sessions,
    }))
}

async fn get_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatus>> {
    let status = state.investigation.session_status(&session_id).await?;
    Ok(Json(status))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode> {
    state.investigation.delete_session(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn submit_answer(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>> {
    let outcome = state
        .investigation
        .submit_answer(&session_id, &req.answer)
        .await?;

    Ok(Json(outcome.into()))
}

async fn skip_question(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<AnswerResponse>> {
    let outcome = state.investigation.skip_question(&session_id).await?;
    Ok(Json(outcome.into()))
}

async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>> {
    let messages = state.investigation.history(&session_id).await?;

    Ok(Json(HistoryResponse {
        session_id,
        messages,
    }))
}

async fn edit_answer(
    State(state): State<AppState>,
    Path((session_id, message_id)): Path<(String, String)>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<Message>> {
    let message = state
        .investigation
        .edit_answer(&session_id, &message_id, &req.answer)
        .await?;

    Ok(Json(message))
}

async fn save_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSummary>> {
    let summary = state.investigation.save_session(&session_id).await?;
    Ok(Json(summary))
}

async fn load_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatus>> {
    let status = state.investigation.load_session(&session_id).await?;
    Ok(Json(status))
}

async fn synthesize_prompt(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Option<Json<SynthesisOptions>>,
) -> Result<Json<SynthesizedPrompt>> {
    let options = body.map(|Json(options)| options).unwrap_or_default();
    let prompt = state.investigation.synthesize(&session_id, &options).await?;
    Ok(Json(prompt))
}
