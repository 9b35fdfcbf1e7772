//! E2E integration tests for the HTTP surface
//!
//! Exercise the full request/response cycle through the axum router without
//! spawning a server. The LLM is absent, so reasoning deterministically
//! lands on the trivial shortcut or the canned fallback tier; escalation
//! detection, session reuse, tenant routing and persistence are all real.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use axelis::agents::AgentRegistry;
use axelis::config::{ApiKeys, EmbeddingsConfig};
use axelis::conversation::ConversationStore;
use axelis::db::DatabasePool;
use axelis::embeddings::EmbeddingClient;
use axelis::escalation::{ContextBuilder, EscalationDetector, EscalationRouter};
use axelis::knowledge::KnowledgeStore;
use axelis::orchestrator::CrewOrchestrator;
use axelis::packs::PackManager;
use axelis::pipeline::ChatPipeline;
use axelis::web::auth::ApiKeyAuth;
use axelis::web::state::AppState;

// ============================================================================
// Test Utilities
// ============================================================================

/// Build a full AppState over an in-memory pool, no LLM, seeded agents.
async fn create_test_state() -> (AppState, tempfile::TempDir) {
    let config_dir = tempfile::tempdir().unwrap();

    let embeddings = Arc::new(EmbeddingClient::from_config(
        &ApiKeys::default(),
        &EmbeddingsConfig::default(),
    ));
    let pool = Arc::new(
        DatabasePool::open_in_memory(embeddings.dimensions())
            .await
            .unwrap(),
    );
    let packs = Arc::new(PackManager::load(config_dir.path()).unwrap());
    let store = Arc::new(ConversationStore::new(pool.clone(), packs.clone()));
    let knowledge = Arc::new(KnowledgeStore::new(pool.clone(), embeddings.clone()));
    let orchestrator = Arc::new(CrewOrchestrator::new(AgentRegistry::empty(), None));
    let detector = Arc::new(EscalationDetector::new());
    let router = Arc::new(EscalationRouter::new(pool.clone()));
    let context_builder = Arc::new(ContextBuilder::new(store.clone(), packs.clone()));
    let pipeline = Arc::new(ChatPipeline::new(
        packs.clone(),
        store.clone(),
        orchestrator,
        detector.clone(),
        None,
    ));

    axelis::seed::seed_human_agents(&pool).await.unwrap();
    axelis::seed::seed_knowledge(&knowledge).await.unwrap();

    let state = AppState {
        pool,
        packs,
        store,
        knowledge,
        embeddings,
        pipeline,
        detector,
        router,
        context_builder,
        auth: Arc::new(ApiKeyAuth::from_table("test-key:basic,admin-key:admin")),
        banking: None,
        push_relay_url: None,
        environment: "test".to_string(),
    };
    (state, config_dir)
}

async fn test_router() -> (Router, tempfile::TempDir) {
    let (state, dir) = create_test_state().await;
    (axelis::web::create_router(state), dir)
}

async fn post_json(router: &Router, path: &str, body: Value, api_key: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| json!({"raw": String::from_utf8_lossy(&bytes).to_string()}));
    (status, body)
}

async fn get_json(router: &Router, path: &str, api_key: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    let request = builder.body(Body::empty()).unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| json!({"raw": String::from_utf8_lossy(&bytes).to_string()}));
    (status, body)
}

fn chat_body(message: &str) -> Value {
    json!({
        "user_id": "u1",
        "tenant_id": "t_ci",
        "message": message,
    })
}

// ============================================================================
// Auth & health
// ============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let (router, _dir) = test_router().await;
    let (status, body) = get_json(&router, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["components"]["database"], json!("healthy"));
    assert_eq!(body["components"]["embeddings"], json!("fallback"));
}

#[tokio::test]
async fn test_chat_requires_api_key() {
    let (router, _dir) = test_router().await;

    let (status, _) = post_json(&router, "/api/v1/chat", chat_body("Bonjour"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) =
        post_json(&router, "/api/v1/chat", chat_body("Bonjour"), Some("wrong-key")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_token_accepted() {
    let (router, _dir) = test_router().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/chat")
        .header("content-type", "application/json")
        .header("authorization", "Bearer test-key")
        .body(Body::from(chat_body("Bonjour").to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Scenario: greeting turn + session reuse
// ============================================================================

#[tokio::test]
async fn test_greeting_and_session_reuse() {
    let (router, _dir) = test_router().await;

    let (status, body) =
        post_json(&router, "/api/v1/chat", chat_body("Bonjour"), Some("test-key")).await;
    assert_eq!(status, StatusCode::OK);
    let first = &body["data"];
    assert_eq!(first["escalation_needed"], json!(false));
    let session_id = first["session_id"].as_str().unwrap().to_string();

    // Exactly two messages in history: one user, one assistant
    let (status, history) = get_json(
        &router,
        &format!("/api/v1/conversation/{session_id}/history"),
        Some("test-key"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = history["data"]["history"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], json!("user"));
    assert_eq!(messages[1]["role"], json!("assistant"));

    // A second POST within the idle window reuses the session
    let (_, second) =
        post_json(&router, "/api/v1/chat", chat_body("Et mon solde ?"), Some("test-key")).await;
    assert_eq!(second["data"]["session_id"], json!(session_id));
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let (router, _dir) = test_router().await;
    let (status, _) =
        post_json(&router, "/api/v1/chat", chat_body("   "), Some("test-key")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// ============================================================================
// Scenario: upstream outage -> fallback mode
// ============================================================================

#[tokio::test]
async fn test_fallback_assistant_answers_without_llm() {
    let (router, _dir) = test_router().await;
    let (status, body) = post_json(
        &router,
        "/api/v1/chat",
        chat_body("comment consulter mon solde s'il vous plaît"),
        Some("test-key"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["agent_used"], json!("fallback_assistant"));
    assert!(body["data"]["response"].as_str().unwrap().contains("reçu"));
}

// ============================================================================
// Scenario: urgent escalation
// ============================================================================

#[tokio::test]
async fn test_urgent_turn_then_escalation_assignment() {
    let (router, _dir) = test_router().await;

    let (status, body) = post_json(
        &router,
        "/api/v1/chat",
        chat_body("c'est urgent, mon transfert n'est pas arrivé, je veux parler à un responsable"),
        Some("test-key"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["escalation_needed"], json!(true));
    let session_id = body["data"]["session_id"].as_str().unwrap().to_string();

    let (status, escalation) = post_json(
        &router,
        "/api/v1/escalate",
        json!({
            "session_id": session_id,
            "reason": "transfert bloqué, client urgent",
            "priority": "urgent",
        }),
        Some("test-key"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let data = &escalation["data"];
    assert_eq!(data["status"], json!("escalated"));

    // The reason mentions a transfer, so an operations agent speaking fr
    // must be picked from the seeded pool
    let assigned = data["assigned_agent"].as_str().unwrap();
    assert!(["agent_ci_001", "agent_ci_002", "agent_ml_001"].contains(&assigned));

    // The conversation flipped to escalated
    let (_, history_status) = get_json(
        &router,
        &format!("/api/v1/conversation/{session_id}/history"),
        Some("test-key"),
    )
    .await;
    assert!(history_status["success"].as_bool().unwrap());
}

#[tokio::test]
async fn test_escalate_unknown_session_is_404() {
    let (router, _dir) = test_router().await;
    let (status, _) = post_json(
        &router,
        "/api/v1/escalate",
        json!({"session_id": "missing", "reason": "test"}),
        Some("test-key"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_history_unknown_session_is_404() {
    let (router, _dir) = test_router().await;
    let (status, _) = get_json(
        &router,
        "/api/v1/conversation/does-not-exist/history",
        Some("test-key"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Scenario: concurrent first messages
// ============================================================================

#[tokio::test]
async fn test_concurrent_first_messages_share_one_session() {
    let (router, _dir) = test_router().await;

    let mut handles = Vec::new();
    for _ in 0..3 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            let (status, body) =
                post_json(&router, "/api/v1/chat", chat_body("Bonjour"), Some("test-key")).await;
            assert_eq!(status, StatusCode::OK);
            body["data"]["session_id"].as_str().unwrap().to_string()
        }));
    }

    let mut session_ids = Vec::new();
    for handle in handles {
        session_ids.push(handle.await.unwrap());
    }
    session_ids.sort();
    session_ids.dedup();
    assert_eq!(session_ids.len(), 1, "exactly one session across the three turns");
}

// ============================================================================
// Metrics
// ============================================================================

#[tokio::test]
async fn test_metrics_endpoint() {
    let (router, _dir) = test_router().await;

    post_json(&router, "/api/v1/chat", chat_body("Bonjour"), Some("test-key")).await;

    let (status, body) = get_json(&router, "/api/v1/metrics", Some("test-key")).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["system"]["status"], json!("healthy"));
    assert!(data["conversations"]["total_conversations"].as_i64().unwrap() >= 1);
    assert!(data["prometheus_metrics"].is_string());

    let (status, _) = get_json(&router, "/api/v1/metrics", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Webhooks
// ============================================================================

#[tokio::test]
async fn test_webhook_fanout_accepts_event() {
    let (router, _dir) = test_router().await;
    let (status, body) = post_json(
        &router,
        "/api/v1/webhooks/escalation-assigned",
        json!({
            "event_type": "escalation_assigned",
            "session_id": "s1",
            "user_id": "u1",
            "tenant_id": "t_ci",
            "data": {},
            "timestamp": "2026-08-01T10:00:00Z",
        }),
        Some("test-key"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("accepted"));
}
