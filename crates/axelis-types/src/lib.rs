// crates/axelis-types/src/lib.rs

//! Shared data contracts between the Axelis server and its clients.
//!
//! These are the wire types of the public HTTP surface: chat turns,
//! escalation requests and the generic response envelope. No native-only
//! dependencies are allowed here so clients can reuse the crate as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Generic API response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// An incoming chat turn from the mobile or web channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user_id: String,
    pub tenant_id: String,
    pub message: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Detected server-side when absent.
    #[serde(default)]
    pub language: Option<String>,
}

fn default_channel() -> String {
    "mobile".to_string()
}

/// The assistant's answer to one chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
    pub agent_used: String,
    pub confidence: f64,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default)]
    pub escalation_needed: bool,
}

/// A request to hand a session off to a human agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub session_id: String,
    pub reason: String,
    #[serde(default = "default_priority")]
    pub priority: String,
}

fn default_priority() -> String {
    "medium".to_string()
}

/// Outcome of a forced escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationResponse {
    pub escalation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    pub estimated_response_time: String,
    pub status: String,
}

/// Liveness report with per-component statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub components: HashMap<String, String>,
    pub version: String,
}

/// Event pushed to the webhook fanout when something notable happens
/// on a conversation (escalation assigned, session resolved, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_type: String,
    pub session_id: String,
    pub user_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub data: Value,
    pub timestamp: String,
}

/// Payload handed to the push-notification relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}
