//! API Integration Tests for specforge
//!
//! Tests the REST API endpoints using axum-test. Completion providers are
//! either scripted in-process or mocked over HTTP with wiremock.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use specforge::state::ProviderSummary;
use specforge::AppState;
use specforge_llm::{LlmConfig, LlmProviderConfig, LlmService};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{brief, build_service, detailed, harness, test_config};

// ============================================================================
// Test Setup Helpers
// ============================================================================

fn server_for(app: axum::Router) -> TestServer {
    TestServer::new(app).expect("Failed to create test server")
}

/// Server whose completions come from an OpenAI-compatible mock.
fn llm_backed_server(mock: &MockServer, dir: &TempDir) -> TestServer {
    let llm = LlmService::new(&LlmConfig {
        providers: vec![LlmProviderConfig {
            name: "openai".to_string(),
            base_url: mock.uri(),
            model: "test-model".to_string(),
            api_key: "test-key".to_string(),
            priority: 1,
        }],
        ..Default::default()
    })
    .unwrap();

    let service = build_service(dir.path(), Arc::new(llm), test_config());
    server_for(specforge::app(AppState::from_service(
        service,
        ProviderSummary {
            completion: vec!["openai".to_string()],
            embedding: vec![],
            vector_backend: "memory".to_string(),
        },
    )))
}

async fn start(server: &TestServer) -> (String, Value) {
    let response = server.post("/sessions").await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    let id = body["session_id"].as_str().unwrap().to_string();
    (id, body["first_question"].clone())
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_reports_providers() {
    let h = harness();
    let server = server_for(h.app());

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["active_sessions"], 0);
    assert_eq!(body["providers"]["completion"][0], "scripted");
    assert_eq!(body["providers"]["vector_backend"], "memory");
}

#[tokio::test]
async fn test_health_degraded_without_completion_provider() {
    let dir = TempDir::new().unwrap();
    let llm = LlmService::new(&LlmConfig::default()).unwrap();
    let service = build_service(dir.path(), Arc::new(llm), test_config());
    let server = server_for(specforge::app(AppState::from_service(
        service,
        ProviderSummary::default(),
    )));

    let body: Value = server.get("/health").await.json();
    assert_eq!(body["status"], "degraded");

    // Template questions still work; follow-ups need a provider.
    let (id, _) = start(&server).await;
    let response = server
        .post(&format!("/sessions/{}/answers", id))
        .json(&json!({ "answer": brief("walks") }))
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "PROVIDER_AUTH_ERROR");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Configure a provider API key"));
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_answer_and_status() {
    let h = harness();
    let server = server_for(h.app());

    let (id, first) = start(&server).await;
    assert_eq!(first["category"], "functionality");
    assert_eq!(first["is_followup"], false);

    let response = server
        .post(&format!("/sessions/{}/answers", id))
        .json(&json!({ "answer": detailed("A dog walking marketplace") }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["complete"], false);
    assert_eq!(body["next_question"]["category"], "users");
    assert!(body.get("synthesized_prompt").is_none());

    let response = server.get(&format!("/sessions/{}", id)).await;
    response.assert_status_ok();
    let status: Value = response.json();
    assert_eq!(status["state"], "users");
    assert_eq!(status["message_count"], 3);
    assert_eq!(status["edited_answers"], 0);
    assert_eq!(status["is_complete"], false);
    assert_eq!(status["progress"]["functionality"], 1.0);
    assert_eq!(status["progress"]["users"], 0.0);

    let history: Value = server
        .get(&format!("/sessions/{}/messages", id))
        .await
        .json();
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["role"], "assistant");
    assert_eq!(messages[1]["role"], "user");
}

#[tokio::test]
async fn test_skip_to_completion_returns_prompt() {
    let h = harness();
    let server = server_for(h.app());
    let (id, _) = start(&server).await;

    server
        .post(&format!("/sessions/{}/answers", id))
        .json(&json!({ "answer": detailed("A dog walking marketplace") }))
        .await
        .assert_status_ok();

    let mut last = Value::Null;
    for _ in 0..6 {
        let response = server.post(&format!("/sessions/{}/skip", id)).await;
        response.assert_status_ok();
        last = response.json();
    }

    assert_eq!(last["complete"], true);
    let prompt = &last["synthesized_prompt"];
    assert!(prompt["content"]
        .as_str()
        .unwrap()
        .contains("A dog walking marketplace"));
    assert_eq!(prompt["within_budget"], true);

    let response = server.post(&format!("/sessions/{}/skip", id)).await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_edit_answer_endpoint() {
    let h = harness();
    let server = server_for(h.app());
    let (id, _) = start(&server).await;

    server
        .post(&format!("/sessions/{}/answers", id))
        .json(&json!({ "answer": detailed("A cat sitting service") }))
        .await
        .assert_status_ok();

    let history: Value = server
        .get(&format!("/sessions/{}/messages", id))
        .await
        .json();
    let message_id = history["messages"][1]["id"].as_str().unwrap().to_string();

    let response = server
        .put(&format!("/sessions/{}/messages/{}", id, message_id))
        .json(&json!({ "answer": detailed("A dog walking marketplace") }))
        .await;
    response.assert_status_ok();
    let message: Value = response.json();
    assert_eq!(message["metadata"]["edited"], true);

    let status: Value = server.get(&format!("/sessions/{}", id)).await.json();
    assert_eq!(status["edited_answers"], 1);

    let response = server
        .post(&format!("/sessions/{}/prompt", id))
        .json(&json!({ "focus_areas": ["security"] }))
        .await;
    response.assert_status_ok();
    let prompt: Value = response.json();
    let content = prompt["content"].as_str().unwrap();
    assert!(content.contains("A dog walking marketplace"));
    assert!(!content.contains("cat sitting"));
    assert!(content.contains("security"));
}

#[tokio::test]
async fn test_prompt_without_body_uses_defaults() {
    let h = harness();
    let server = server_for(h.app());
    let (id, _) = start(&server).await;

    let response = server.post(&format!("/sessions/{}/prompt", id)).await;
    response.assert_status_ok();
    let prompt: Value = response.json();
    assert!(prompt["content"]
        .as_str()
        .unwrap()
        .starts_with("# Product Development Prompt"));
}

#[tokio::test]
async fn test_save_list_load_and_delete() {
    let h = harness();
    let server = server_for(h.app());
    let (id, _) = start(&server).await;

    let response = server.post(&format!("/sessions/{}/save", id)).await;
    response.assert_status_ok();
    let summary: Value = response.json();
    assert_eq!(summary["id"], id);
    assert_eq!(summary["message_count"], 1);

    let listing: Value = server.get("/sessions").await.json();
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["sessions"][0]["id"], id);

    server
        .post(&format!("/sessions/{}/answers", id))
        .json(&json!({ "answer": detailed("A dog walking marketplace") }))
        .await
        .assert_status_ok();

    let response = server.post(&format!("/sessions/{}/load", id)).await;
    response.assert_status_ok();
    let status: Value = response.json();
    assert_eq!(status["message_count"], 1);
    assert_eq!(status["state"], "functionality");

    server
        .delete(&format!("/sessions/{}", id))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    server
        .get(&format!("/sessions/{}", id))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let listing: Value = server.get("/sessions").await.json();
    assert_eq!(listing["total"], 0);
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_unknown_session_returns_not_found() {
    let h = harness();
    let server = server_for(h.app());

    let response = server.get("/sessions/does-not-exist").await;
    response.assert_status(StatusCode::NOT_FOUND);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_empty_answer_is_rejected() {
    let h = harness();
    let server = server_for(h.app());
    let (id, _) = start(&server).await;

    let response = server
        .post(&format!("/sessions/{}/answers", id))
        .json(&json!({ "answer": "  " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

// ============================================================================
// HTTP completion provider
// ============================================================================

#[tokio::test]
async fn test_followup_generated_by_http_provider() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "\"How do owners book a walk\""}}]
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let dir = TempDir::new().unwrap();
    let server = llm_backed_server(&mock, &dir);
    let (id, _) = start(&server).await;

    let response = server
        .post(&format!("/sessions/{}/answers", id))
        .json(&json!({ "answer": brief("walks") }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["next_question"]["text"], "How do owners book a walk?");
    assert_eq!(body["next_question"]["is_followup"], true);
    assert_eq!(body["next_question"]["category"], "functionality");
}

#[tokio::test]
async fn test_provider_outage_maps_to_bad_gateway() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&mock)
        .await;

    let dir = TempDir::new().unwrap();
    let server = llm_backed_server(&mock, &dir);
    let (id, _) = start(&server).await;

    let response = server
        .post(&format!("/sessions/{}/answers", id))
        .json(&json!({ "answer": brief("walks") }))
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "PROVIDER_ERROR");

    // The session still waits on the same question.
    let status: Value = server.get(&format!("/sessions/{}", id)).await.json();
    assert_eq!(status["message_count"], 1);
}
