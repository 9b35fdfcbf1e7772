// crates/axelis-server/src/pipeline.rs
// End-to-end chat turn: authorize -> session -> plan -> reason -> detect ->
// persist -> respond; metrics recorded off the response path.

use std::sync::Arc;
use std::time::Instant;

use axelis_types::{ChatMessage, ChatResponse};
use serde_json::json;
use tracing::debug;

use crate::APPLICATION_ID;
use crate::conversation::ConversationStore;
use crate::db::NewMessage;
use crate::error::{AxelisError, Result};
use crate::escalation::{EscalationDetector, EscalationInput};
use crate::llm::LlmClient;
use crate::nlp;
use crate::orchestrator::{CrewOrchestrator, CrewRequest};
use crate::packs::PackManager;

/// Turns of history rendered into agent memory.
const MEMORY_TURNS: usize = 10;

pub struct ChatPipeline {
    packs: Arc<PackManager>,
    store: Arc<ConversationStore>,
    orchestrator: Arc<CrewOrchestrator>,
    detector: Arc<EscalationDetector>,
    llm: Option<Arc<dyn LlmClient>>,
}

impl ChatPipeline {
    pub fn new(
        packs: Arc<PackManager>,
        store: Arc<ConversationStore>,
        orchestrator: Arc<CrewOrchestrator>,
        detector: Arc<EscalationDetector>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        Self {
            packs,
            store,
            orchestrator,
            detector,
            llm,
        }
    }

    /// Handle one chat turn. Reasoning failures degrade into the fallback
    /// answer; only persistence failures surface as errors.
    pub async fn handle_turn(&self, message: &ChatMessage) -> Result<ChatResponse> {
        let started = Instant::now();

        if message.message.trim().is_empty() {
            return Err(AxelisError::InvalidInput("message cannot be empty".into()));
        }

        // Authorize: resolve the tenant's pack. An unauthorized agent or
        // feature downgrades the plan instead of refusing the turn.
        let capabilities = self
            .packs
            .capabilities_of(&message.tenant_id, APPLICATION_ID);

        let language = message
            .language
            .clone()
            .unwrap_or_else(|| nlp::detect_language(&message.message));

        // Session: reuse or create, then append the user message.
        let session_id = self
            .store
            .get_or_create_session(
                &message.user_id,
                &message.tenant_id,
                APPLICATION_ID,
                &message.channel,
                &language,
            )
            .await?;

        self.store
            .append_message(&session_id, "user", &message.message, NewMessage::default())
            .await?;

        // Plan: optional intent enrichment plus prior failure count and
        // rendered history for the crew.
        let intent = nlp::classify_intent(
            self.llm.as_ref(),
            &message.message,
            &["consultation", "transfert", "reclamation", "information"],
        )
        .await;
        let context = self.store.context(&session_id).await?;
        let prior_failures = context.conversation.context["failed_attempts"]
            .as_u64()
            .unwrap_or(0) as u32;
        let history = render_history(&context.messages);

        // Reason: tier-aware crew execution over the authorized agents.
        let outcome = self
            .orchestrator
            .process_query(&CrewRequest {
                tenant_id: message.tenant_id.clone(),
                application: APPLICATION_ID.to_string(),
                user_id: message.user_id.clone(),
                query: message.message.clone(),
                pack_level: capabilities.pack_name.clone(),
                allowed_agents: capabilities.agents.clone(),
                history,
            })
            .await;

        let failed_attempts = prior_failures + outcome.failed_tiers;
        if outcome.failed_tiers > 0 {
            // Best-effort: the counter feeds future detection, losing one
            // update is acceptable
            if let Err(e) = self
                .store
                .update_context(&session_id, json!({"failed_attempts": failed_attempts}))
                .await
            {
                debug!(conversation_id = %session_id, error = %e, "failed_attempts update skipped");
            }
        }

        // Detect: deterministic rules over the turn's observable signals.
        let sentiment = nlp::analyze_sentiment(self.llm.as_ref(), &message.message).await;
        let assessment = self.detector.evaluate(&EscalationInput {
            user_message: message.message.clone(),
            failed_attempts,
            sentiment: sentiment.sentiment,
            complaint_priority: None,
            technical_error: outcome.failed_tiers > 0 && outcome.mode == "fallback",
        });

        // Persist the assistant message with its execution metadata.
        let agent_used = outcome
            .agents_used
            .first()
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        let processing_time = started.elapsed().as_secs_f64();

        self.store
            .append_message(
                &session_id,
                "assistant",
                &outcome.result,
                NewMessage {
                    agent_used: Some(agent_used.clone()),
                    tools_used: vec![],
                    tokens_consumed: outcome.tokens_consumed,
                    confidence_score: Some(outcome.confidence),
                    processing_time: Some(processing_time),
                    metadata: Some(json!({
                        "mode": outcome.mode,
                        "tasks_executed": outcome.tasks_executed,
                        "intent": intent.intent,
                    })),
                },
            )
            .await?;

        // Background: metric recording never blocks the user response.
        {
            let tenant = message.tenant_id.clone();
            let agent = agent_used.clone();
            let escalation_needed = assessment.should_escalate;
            let reasons = assessment.reasons_str();
            let priority = assessment.priority;
            tokio::spawn(async move {
                crate::metrics::record_response_time(&agent, &tenant, processing_time);
                if escalation_needed {
                    crate::metrics::record_escalation(&tenant, &reasons, priority.as_str());
                }
            });
        }

        Ok(ChatResponse {
            session_id,
            response: outcome.result,
            agent_used,
            confidence: outcome.confidence,
            suggested_actions: suggested_actions(assessment.should_escalate),
            escalation_needed: assessment.should_escalate,
        })
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }
}

/// Render recent turns for agent memory, oldest first.
fn render_history(messages: &[crate::db::MessageRow]) -> Option<String> {
    if messages.is_empty() {
        return None;
    }
    let rendered: Vec<String> = messages
        .iter()
        .rev()
        .take(MEMORY_TURNS)
        .rev()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect();
    Some(rendered.join("\n"))
}

fn suggested_actions(escalation_needed: bool) -> Vec<String> {
    if escalation_needed {
        vec![
            "Parler à un agent".to_string(),
            "Consulter la FAQ".to_string(),
        ]
    } else {
        vec![
            "Consulter la FAQ".to_string(),
            "Parler à un agent".to_string(),
        ]
    }
}
