// crates/axelis-server/src/escalation/context.rs
// Structured handoff context for human agents
//
// Six sections: conversation summary, user profile, technical context,
// business context, recommended actions, escalation metadata. The scoring
// formulas are part of the contract — tests pin exact values.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::warn;

use crate::conversation::{ConversationContext, ConversationStore};
use crate::db::conversation as conv_db;
use crate::error::Result;
use crate::packs::PackManager;

/// Truncation applied to issue excerpts.
const ISSUE_EXCERPT_CHARS: usize = 200;

/// Maximum recommended actions handed to the agent.
const MAX_ACTIONS: usize = 10;

pub struct ContextBuilder {
    store: Arc<ConversationStore>,
    packs: Arc<PackManager>,
}

impl ContextBuilder {
    pub fn new(store: Arc<ConversationStore>, packs: Arc<PackManager>) -> Self {
        Self { store, packs }
    }

    /// Full handoff context for one conversation. Returns an empty object
    /// when the conversation cannot be loaded — an escalation with a thin
    /// context beats a failed escalation.
    pub async fn prepare(&self, conversation_id: &str) -> Value {
        match self.prepare_inner(conversation_id).await {
            Ok(context) => context,
            Err(e) => {
                warn!(conversation_id, error = %e, "Failed to prepare escalation context");
                json!({})
            }
        }
    }

    async fn prepare_inner(&self, conversation_id: &str) -> Result<Value> {
        let context = self.store.context(conversation_id).await?;

        let conversation_summary = build_conversation_summary(&context);
        let user_profile = self.build_user_profile(&context).await?;
        let technical_context = build_technical_context(&context);
        let business_context = self.build_business_context(&context);
        let recommended_actions = suggest_actions(&conversation_summary, &technical_context);
        let escalation_metadata = build_escalation_metadata(&context);

        Ok(json!({
            "conversation_summary": conversation_summary,
            "user_profile": user_profile,
            "technical_context": technical_context,
            "business_context": business_context,
            "recommended_actions": recommended_actions,
            "escalation_metadata": escalation_metadata,
        }))
    }

    async fn build_user_profile(&self, context: &ConversationContext) -> Result<Value> {
        let user_id = context.conversation.user_id.clone();
        let (total, escalated, last_conversation, avg_duration_secs) = self
            .store
            .pool()
            .run(move |conn| conv_db::user_profile_stats_sync(conn, &user_id))
            .await?;

        Ok(json!({
            "user_id": context.conversation.user_id,
            "tenant_id": context.conversation.tenant_id,
            "pack_level": context.conversation.pack_level,
            "historical_stats": {
                "total_conversations": total,
                "escalated_conversations": escalated,
                "last_conversation": last_conversation,
                "avg_conversation_duration_seconds": avg_duration_secs,
            },
            "is_frequent_user": total > 5,
            "escalation_history": escalated,
        }))
    }

    fn build_business_context(&self, context: &ConversationContext) -> Value {
        let tenant_id = &context.conversation.tenant_id;
        let application = &context.conversation.application_id;
        let capabilities = self.packs.capabilities_of(tenant_id, application);

        json!({
            "tenant_id": tenant_id,
            "pack_subscribed": capabilities.pack_name,
            "available_features": capabilities.features,
            "automation_level": capabilities.automation_level,
            "available_channels": capabilities.channels,
            "business_hours": business_hours(tenant_id),
            "escalation_sla": escalation_sla(&capabilities.pack_name),
        })
    }
}

fn truncate_excerpt(text: &str) -> String {
    if text.chars().count() > ISSUE_EXCERPT_CHARS {
        let cut: String = text.chars().take(ISSUE_EXCERPT_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

fn build_conversation_summary(context: &ConversationContext) -> Value {
    let user_messages: Vec<&str> = context
        .messages
        .iter()
        .filter(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .collect();
    let assistant_count = context
        .messages
        .iter()
        .filter(|m| m.role == "assistant")
        .count();

    let main_issue = user_messages.first().copied().unwrap_or_default();
    let latest = user_messages.last().copied().unwrap_or_default();

    json!({
        "main_issue": truncate_excerpt(main_issue),
        "latest_message": truncate_excerpt(latest),
        "total_messages": context.messages.len(),
        "user_messages_count": user_messages.len(),
        "assistant_messages_count": assistant_count,
        "conversation_duration": format_duration(context.statistics.duration_minutes),
        "channel": context.conversation.channel,
        "created_at": context.conversation.created_at,
        "last_activity": context.conversation.updated_at,
    })
}

fn build_technical_context(context: &ConversationContext) -> Value {
    let agent_actions = context.conversation.context["agent_actions"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    let failed_attempts = context.conversation.context["failed_attempts"]
        .as_u64()
        .unwrap_or(0);

    let mut agents_involved: Vec<String> = agent_actions
        .iter()
        .filter_map(|a| a["agent_name"].as_str().map(String::from))
        .collect();
    agents_involved.sort();
    agents_involved.dedup();

    let failed_actions: Vec<&Value> = agent_actions
        .iter()
        .filter(|a| !a["success"].as_bool().unwrap_or(true))
        .collect();

    let response_times: Vec<f64> = agent_actions
        .iter()
        .filter_map(|a| a["execution_time_ms"].as_f64())
        .collect();
    let avg_response_time = if response_times.is_empty() {
        0.0
    } else {
        response_times.iter().sum::<f64>() / response_times.len() as f64
    };

    let error_details: Vec<&str> = failed_actions
        .iter()
        .filter_map(|a| a["error_message"].as_str())
        .collect();
    let last_successful = agent_actions
        .iter()
        .rev()
        .find(|a| a["success"].as_bool().unwrap_or(false));

    json!({
        "agents_involved": agents_involved,
        "total_agent_actions": agent_actions.len(),
        "failed_actions": failed_actions.len(),
        "failed_attempts": failed_attempts,
        "average_response_time_ms": avg_response_time,
        "error_details": error_details,
        "last_successful_action": last_successful,
    })
}

fn suggest_actions(summary: &Value, technical: &Value) -> Vec<String> {
    let mut actions: Vec<String> = Vec::new();

    if technical["failed_attempts"].as_u64().unwrap_or(0) > 2 {
        actions.push("Vérifier les autorisations du compte utilisateur".into());
        actions.push("Valider les paramètres de la transaction".into());
    }

    if technical["error_details"]
        .as_array()
        .map(|e| !e.is_empty())
        .unwrap_or(false)
    {
        actions.push("Examiner les erreurs techniques détectées".into());
        actions.push("Vérifier la connectivité aux systèmes backend".into());
    }

    let main_issue = summary["main_issue"]
        .as_str()
        .unwrap_or_default()
        .to_lowercase();
    if main_issue.contains("transfert") {
        actions.push("Vérifier le statut du transfert dans le système".into());
        actions.push("Confirmer les détails du bénéficiaire".into());
    } else if main_issue.contains("solde") {
        actions.push("Consulter le solde en temps réel".into());
        actions.push("Vérifier les dernières transactions".into());
    } else if main_issue.contains("réclamation") || main_issue.contains("problème") {
        actions.push("Créer un ticket de réclamation formelle".into());
        actions.push("Escalader vers le service qualité si nécessaire".into());
    }

    actions.extend([
        "Confirmer l'identité du client".to_string(),
        "Expliquer les prochaines étapes clairement".to_string(),
        "Fournir un délai de résolution réaliste".to_string(),
    ]);

    actions.truncate(MAX_ACTIONS);
    actions
}

fn build_escalation_metadata(context: &ConversationContext) -> Value {
    let priority_score = calculate_priority_score(context);
    let complexity_score = calculate_complexity_score(context);

    json!({
        "escalation_timestamp": chrono::Utc::now().to_rfc3339(),
        "context_version": "1.0",
        "priority_score": priority_score,
        "complexity_score": complexity_score,
        "estimated_resolution_time": estimate_resolution_time(priority_score, complexity_score),
    })
}

/// Priority score in 1-10: base 5, plus failed attempts (capped at 3),
/// plus 2 for long conversations.
fn calculate_priority_score(context: &ConversationContext) -> u32 {
    let mut score = 5u32;
    let failed_attempts = context.conversation.context["failed_attempts"]
        .as_u64()
        .unwrap_or(0) as u32;
    score += failed_attempts.min(3);
    if context.messages.len() > 10 {
        score += 2;
    }
    score.min(10)
}

/// Complexity score in 1-10: base 5, plus extra agents (capped at 3),
/// plus failed actions (capped at 2).
fn calculate_complexity_score(context: &ConversationContext) -> u32 {
    let agent_actions = context.conversation.context["agent_actions"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let mut agents: Vec<&str> = agent_actions
        .iter()
        .filter_map(|a| a["agent_name"].as_str())
        .collect();
    agents.sort();
    agents.dedup();

    let failed = agent_actions
        .iter()
        .filter(|a| !a["success"].as_bool().unwrap_or(true))
        .count() as u32;

    let mut score = 5u32;
    score += (agents.len() as u32).saturating_sub(1).min(3);
    score += failed.min(2);
    score.min(10)
}

fn estimate_resolution_time(priority: u32, complexity: u32) -> &'static str {
    if priority >= 8 || complexity >= 8 {
        "30-60 minutes"
    } else if priority >= 6 || complexity >= 6 {
        "1-2 heures"
    } else {
        "15-30 minutes"
    }
}

fn format_duration(minutes: f64) -> String {
    let whole = minutes as i64;
    if whole < 1 {
        "< 1 minute".to_string()
    } else if whole < 60 {
        format!("{whole} minutes")
    } else {
        format!("{}h {}m", whole / 60, whole % 60)
    }
}

fn business_hours(tenant_id: &str) -> &'static str {
    match tenant_id {
        "t_ci" | "t_bf" | "t_ml" | "t_sn" => "8h00 - 17h00 (GMT)",
        _ => "8h00 - 17h00 (GMT)",
    }
}

fn escalation_sla(pack_name: &str) -> &'static str {
    match pack_name {
        "premium" => "30 minutes",
        "advanced" => "1 heure",
        _ => "2 heures",
    }
}
