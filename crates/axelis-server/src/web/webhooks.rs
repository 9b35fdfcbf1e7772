// crates/axelis-server/src/web/webhooks.rs
// Push-notification fanout for conversation events
//
// The relay itself (Firebase, OneSignal, ...) is an external collaborator;
// delivery is fire-and-forget and never blocks the caller.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axelis_types::{ApiResponse, NotificationPayload, WebhookEvent};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::web::state::AppState;

/// POST /api/v1/webhooks/escalation-assigned
pub async fn escalation_assigned(
    State(state): State<AppState>,
    Json(event): Json<WebhookEvent>,
) -> impl IntoResponse {
    info!(
        session_id = %event.session_id,
        user_id = %event.user_id,
        "Escalation-assigned webhook received"
    );

    let payload = NotificationPayload {
        user_id: event.user_id.clone(),
        title: "Votre demande a été transmise".to_string(),
        message: "Un conseiller va vous répondre dans les plus brefs délais.".to_string(),
        data: json!({
            "session_id": event.session_id,
            "event_type": event.event_type,
        }),
    };

    dispatch_notification(&state, payload);
    (StatusCode::OK, Json(ApiResponse::ok(json!({"status": "accepted"}))))
}

/// POST /api/v1/webhooks/escalation-resolved
pub async fn escalation_resolved(
    State(state): State<AppState>,
    Json(event): Json<WebhookEvent>,
) -> impl IntoResponse {
    info!(session_id = %event.session_id, "Escalation-resolved webhook received");

    let payload = NotificationPayload {
        user_id: event.user_id.clone(),
        title: "Votre demande a été traitée".to_string(),
        message: "Votre conversation a été résolue. Merci de votre patience.".to_string(),
        data: json!({"session_id": event.session_id}),
    };

    dispatch_notification(&state, payload);
    (StatusCode::OK, Json(ApiResponse::ok(json!({"status": "accepted"}))))
}

/// Hand the payload to the configured push relay in the background.
fn dispatch_notification(state: &AppState, payload: NotificationPayload) {
    let Some(relay_url) = state.push_relay_url.clone() else {
        debug!("No push relay configured, notification dropped");
        return;
    };

    tokio::spawn(async move {
        let client = reqwest::Client::new();
        match client.post(&relay_url).json(&payload).send().await {
            Ok(response) => {
                info!(
                    user_id = %payload.user_id,
                    status = %response.status(),
                    "Push notification sent"
                );
            }
            Err(e) => {
                warn!(user_id = %payload.user_id, error = %e, "Failed to send push notification");
            }
        }
    });
}
