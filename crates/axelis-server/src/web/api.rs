// crates/axelis-server/src/web/api.rs
// REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axelis_types::{
    ApiResponse, ChatMessage, EscalationRequest, EscalationResponse, HealthStatus,
};
use serde_json::json;
use std::collections::HashMap;
use tracing::error;

use crate::error::AxelisError;
use crate::escalation::{Priority, router::RoutingContext};
use crate::web::state::AppState;

// ═══════════════════════════════════════
// CHAT
// ═══════════════════════════════════════

/// POST /api/v1/chat - handle one conversational turn
pub async fn chat(
    State(state): State<AppState>,
    Json(message): Json<ChatMessage>,
) -> impl IntoResponse {
    match state.pipeline.handle_turn(&message).await {
        Ok(response) => (StatusCode::OK, Json(ApiResponse::ok(response))).into_response(),
        Err(AxelisError::InvalidInput(detail)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::<()>::err(detail)),
        )
            .into_response(),
        Err(e) => {
            error!("Chat endpoint error: {}", e);
            crate::metrics::record_error("chat_endpoint", "web");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::err("Erreur interne du serveur")),
            )
                .into_response()
        }
    }
}

// ═══════════════════════════════════════
// ESCALATION
// ═══════════════════════════════════════

/// POST /api/v1/escalate - force a handoff to a human agent
pub async fn escalate(
    State(state): State<AppState>,
    Json(request): Json<EscalationRequest>,
) -> impl IntoResponse {
    let session = match state.store.get_session(&request.session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::<()>::err("Conversation non trouvée")),
            )
                .into_response();
        }
        Err(e) => {
            error!("Escalation lookup error: {}", e);
            return internal_error();
        }
    };

    // Structured handoff context for the human agent
    let context = state.context_builder.prepare(&request.session_id).await;

    let last_user_message = context["conversation_summary"]["latest_message"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let routing = RoutingContext {
        reason: request.reason.clone(),
        user_message: last_user_message,
        user_language: Some(session.language.clone()),
        priority: request.priority.clone(),
    };

    let assigned_agent = match state.router.find_best_agent(&routing).await {
        Ok(agent) => agent,
        Err(e) => {
            error!("Agent routing error: {}", e);
            None
        }
    };

    let priority = Priority::from_str(&request.priority)
        .unwrap_or(Priority::Medium)
        .as_str();

    match state
        .store
        .create_escalation(
            &request.session_id,
            &request.reason,
            priority,
            assigned_agent.clone(),
            context,
        )
        .await
    {
        Ok(escalation_id) => {
            crate::metrics::record_escalation(&session.tenant_id, &request.reason, priority);
            (
                StatusCode::OK,
                Json(ApiResponse::ok(EscalationResponse {
                    escalation_id,
                    assigned_agent,
                    estimated_response_time: "< 30 secondes".to_string(),
                    status: "escalated".to_string(),
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!("Escalation error: {}", e);
            internal_error()
        }
    }
}

// ═══════════════════════════════════════
// HISTORY
// ═══════════════════════════════════════

/// GET /api/v1/conversation/{id}/history
pub async fn conversation_history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_session(&conversation_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::<()>::err("Conversation non trouvée")),
            )
                .into_response();
        }
        Err(e) => {
            error!("History lookup error: {}", e);
            return internal_error();
        }
    }

    match state.store.history(&conversation_id, 50, false).await {
        Ok(history) => (
            StatusCode::OK,
            Json(ApiResponse::ok(json!({
                "session_id": conversation_id,
                "history": history,
            }))),
        )
            .into_response(),
        Err(e) => {
            error!("History fetch error: {}", e);
            internal_error()
        }
    }
}

// ═══════════════════════════════════════
// HEALTH & METRICS
// ═══════════════════════════════════════

/// GET /api/v1/health - public liveness route with component statuses
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();

    let db_healthy = state
        .pool
        .try_interact("health check", |conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
        .is_some();
    components.insert(
        "database".to_string(),
        if db_healthy { "healthy" } else { "unhealthy" }.to_string(),
    );
    components.insert(
        "embeddings".to_string(),
        state.embeddings.provider_id().to_string(),
    );
    components.insert(
        "banking_api".to_string(),
        if state.banking.is_some() {
            "configured"
        } else {
            "not_configured"
        }
        .to_string(),
    );
    components.insert("environment".to_string(), state.environment.clone());

    let status = if db_healthy { "healthy" } else { "unhealthy" };
    Json(HealthStatus {
        status: status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/v1/metrics - aggregated metrics plus Prometheus exposition
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match crate::metrics::system_metrics(&state.pool).await {
        Ok(metrics) => (StatusCode::OK, Json(ApiResponse::ok(metrics))).into_response(),
        Err(e) => {
            error!("Metrics error: {}", e);
            internal_error()
        }
    }
}

fn internal_error() -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::err("Erreur interne du serveur")),
    )
        .into_response()
}
