// db/types.rs
// Row types shared across the database layer

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A conversation (session) row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRow {
    pub id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub application_id: String,
    pub pack_level: String,
    pub channel: String,
    pub status: String,
    pub language: String,
    /// Opaque agent-memory map (JSON object)
    pub context: Value,
    /// Pack snapshot taken at creation (JSON object)
    pub metadata: Value,
    pub created_at: String,
    pub updated_at: String,
    pub closed_at: Option<String>,
}

/// A message row, ordered by timestamp within its conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub agent_used: Option<String>,
    pub tools_used: Vec<String>,
    pub tokens_consumed: i64,
    pub confidence_score: Option<f64>,
    pub processing_time: Option<f64>,
    pub metadata: Value,
    pub timestamp: String,
}

/// Fields of a message being appended.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub agent_used: Option<String>,
    pub tools_used: Vec<String>,
    pub tokens_consumed: i64,
    pub confidence_score: Option<f64>,
    pub processing_time: Option<f64>,
    pub metadata: Option<Value>,
}

/// An escalation row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRow {
    pub id: String,
    pub conversation_id: String,
    pub reason: String,
    pub escalation_type: String,
    pub priority: String,
    pub assigned_to: Option<String>,
    pub status: String,
    pub context: Value,
    pub escalated_at: String,
    pub resolved_at: Option<String>,
    pub resolution_notes: Option<String>,
}

/// A human agent row from the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanAgentRow {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub specialties: Vec<String>,
    pub languages: Vec<String>,
    pub status: String,
    pub current_load: i64,
    pub max_concurrent: i64,
    pub last_activity: Option<String>,
}

/// Aggregated message statistics for one conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationStats {
    pub total_messages: i64,
    pub user_messages: i64,
    pub assistant_messages: i64,
    pub avg_tokens_per_message: f64,
    pub total_tokens_consumed: i64,
    pub avg_confidence_score: f64,
    pub avg_response_time: f64,
    pub duration_minutes: f64,
}

/// Decode a JSON TEXT column, falling back to the given default on garbage.
pub(crate) fn parse_json_column(raw: Option<String>, default: Value) -> Value {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(default)
}

/// Decode a JSON string array column into a Vec<String>.
pub(crate) fn parse_string_array(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok())
        .unwrap_or_default()
}
