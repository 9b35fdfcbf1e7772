// crates/axelis-server/src/web/mod.rs
// HTTP surface for the assistant

pub mod api;
pub mod auth;
pub mod state;
pub mod webhooks;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::web::state::AppState;

/// Create the web server router.
///
/// The health route is public; everything else sits behind the API-key
/// middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/chat", post(api::chat))
        .route("/escalate", post(api::escalate))
        .route("/conversation/{id}/history", get(api::conversation_history))
        .route("/metrics", get(api::metrics))
        .route("/webhooks/escalation-assigned", post(webhooks::escalation_assigned))
        .route("/webhooks/escalation-resolved", post(webhooks::escalation_resolved))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    let api_v1 = Router::new()
        .route("/health", get(api::health))
        .merge(protected);

    Router::new()
        .nest("/api/v1", api_v1)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
