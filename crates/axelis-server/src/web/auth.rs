// crates/axelis-server/src/web/auth.rs
// API-key authentication for the HTTP surface
//
// Keys come from the `API_KEYS` table as `key:role` pairs. The `X-API-Key`
// header is the primary carrier; `Authorization: Bearer` is accepted as a
// fallback. The health route is mounted outside the protected router.

use std::collections::HashMap;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axelis_types::ApiResponse;
use tracing::{debug, info, warn};

use crate::web::state::AppState;

pub struct ApiKeyAuth {
    keys: HashMap<String, String>,
}

impl ApiKeyAuth {
    /// Parse the `key:role` table. Pairs without a role default to `basic`.
    pub fn from_table(table: &str) -> Self {
        let mut keys = HashMap::new();
        for pair in table.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            match pair.split_once(':') {
                Some((key, role)) => {
                    keys.insert(key.trim().to_string(), role.trim().to_string());
                }
                None => {
                    keys.insert(pair.to_string(), "basic".to_string());
                }
            }
        }
        info!("Loaded {} API keys", keys.len());
        Self { keys }
    }

    /// Verify a key, returning its role.
    pub fn verify(&self, api_key: &str) -> Option<&str> {
        let key_prefix: String = api_key.chars().take(8).collect();
        match self.keys.get(api_key) {
            Some(role) => {
                debug!(role, key_prefix = %key_prefix, "API key verified");
                Some(role)
            }
            None => {
                warn!(key_prefix = %key_prefix, "Invalid API key attempted");
                None
            }
        }
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

/// Extract the API key from the request headers.
fn extract_key(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key.to_string());
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

/// Middleware guarding the protected API routes.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(key) = extract_key(request.headers()) else {
        return unauthorized("API key required. Use the X-API-Key header.");
    };

    if state.auth.verify(&key).is_none() {
        return unauthorized("Invalid API key");
    }

    next.run(request).await
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(ApiResponse::<()>::err(message)),
    )
        .into_response()
}
