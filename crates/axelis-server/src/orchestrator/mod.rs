// crates/axelis-server/src/orchestrator/mod.rs
// Crew orchestration with tiered fallback
//
// Three execution tiers, tried in order:
//   1. full crew: every authorized agent runs its task sequentially with
//      conversation memory, each output feeding the next;
//   2. minimal: one agent, no memory;
//   3. canned fallback: a fixed helpful reply with success = true.
// The product contract is that the user always receives a reply in bounded
// time, whatever the upstream LLM does.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::agents::{AgentDescriptor, AgentRegistry};
use crate::knowledge::KnowledgeStore;
use crate::llm::{LlmClient, Message};

/// Deadline for one reasoning tier.
const TIER_TIMEOUT_SECS: u64 = 60;

/// Queries shorter than this skip the LLM entirely.
const TRIVIAL_QUERY_CHARS: usize = 10;

/// Most agents a full crew will run in one turn.
const MAX_CREW_SIZE: usize = 3;

/// Agent name reported by the canned tier.
pub const FALLBACK_AGENT: &str = "fallback_assistant";

/// Confidence reported for LLM-backed answers.
pub const DEFAULT_CONFIDENCE: f64 = 0.85;

/// Confidence reported by the canned tier.
pub const FALLBACK_CONFIDENCE: f64 = 0.30;

/// One query handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct CrewRequest {
    pub tenant_id: String,
    pub application: String,
    pub user_id: String,
    pub query: String,
    pub pack_level: String,
    /// Agents the resolved pack authorizes, in pack order.
    pub allowed_agents: Vec<String>,
    /// Recent conversation turns rendered for agent memory.
    pub history: Option<String>,
}

/// Outcome of one orchestrated turn.
#[derive(Debug, Clone)]
pub struct CrewOutcome {
    pub success: bool,
    pub result: String,
    pub agents_used: Vec<String>,
    pub tasks_executed: usize,
    pub mode: String,
    pub tokens_consumed: i64,
    pub confidence: f64,
    /// Tiers that failed before the answer was produced; the pipeline
    /// accumulates this into the session's failed_attempts counter.
    pub failed_tiers: u32,
}

/// Crew orchestrator: assembles role-typed agents and executes them against
/// a query with automatic tier fallback.
pub struct CrewOrchestrator {
    registry: AgentRegistry,
    llm: Option<Arc<dyn LlmClient>>,
    knowledge: Option<Arc<KnowledgeStore>>,
    tier_timeout: Duration,
}

impl CrewOrchestrator {
    pub fn new(registry: AgentRegistry, llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            registry,
            llm,
            knowledge: None,
            tier_timeout: Duration::from_secs(TIER_TIMEOUT_SECS),
        }
    }

    /// Attach the retrieval store. Crews whose agents carry the
    /// `faq_search` tool get tenant-scoped knowledge snippets injected.
    pub fn with_knowledge(mut self, knowledge: Arc<KnowledgeStore>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    #[cfg(test)]
    pub fn with_tier_timeout(mut self, timeout: Duration) -> Self {
        self.tier_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Process one user query through the tier ladder.
    pub async fn process_query(&self, request: &CrewRequest) -> CrewOutcome {
        // Trivial-query shortcut: greetings and one-word messages get a
        // friendly acknowledgement without waking the language model.
        if request.query.chars().count() < TRIVIAL_QUERY_CHARS {
            return CrewOutcome {
                success: true,
                result: format!(
                    "Bonjour ! Votre message '{}' a été reçu. Comment puis-je vous aider ?",
                    request.query.trim()
                ),
                agents_used: vec!["basic_assistant".into()],
                tasks_executed: 1,
                mode: "simple_test".into(),
                tokens_consumed: 0,
                confidence: DEFAULT_CONFIDENCE,
                failed_tiers: 0,
            };
        }

        let crew = self.assemble_crew(request);
        let mut failed_tiers = 0;

        if let Some(llm) = self.llm.as_ref() {
            match self.full_crew_execution(llm, request, &crew).await {
                Ok(outcome) => return outcome.with_failed_tiers(failed_tiers),
                Err(e) => {
                    failed_tiers += 1;
                    crate::metrics::record_error("crew_execution", "orchestrator");
                    warn!(error = %e, tenant_id = %request.tenant_id, "Full crew execution failed, trying minimal mode");
                }
            }

            match self.minimal_execution(llm, request, &crew).await {
                Ok(outcome) => return outcome.with_failed_tiers(failed_tiers),
                Err(e) => {
                    failed_tiers += 1;
                    crate::metrics::record_error("minimal_execution", "orchestrator");
                    warn!(error = %e, tenant_id = %request.tenant_id, "Minimal execution failed, using fallback");
                }
            }
        }

        self.fallback_response(request, failed_tiers)
    }

    /// Authorized crew for this request, capped at [`MAX_CREW_SIZE`].
    fn assemble_crew(&self, request: &CrewRequest) -> Vec<(String, AgentDescriptor)> {
        let mut crew = self.registry.authorized(
            &request.allowed_agents,
            &request.pack_level,
            &request.tenant_id,
        );
        if crew.is_empty() {
            crew.push((
                "general_assistant".to_string(),
                AgentDescriptor::default_for("general_assistant", &request.tenant_id),
            ));
        }
        crew.truncate(MAX_CREW_SIZE);
        crew
    }

    /// Tier 1: every crew agent executes its task in sequence, memory on.
    /// Prior outputs feed later agents.
    async fn full_crew_execution(
        &self,
        llm: &Arc<dyn LlmClient>,
        request: &CrewRequest,
        crew: &[(String, AgentDescriptor)],
    ) -> anyhow::Result<CrewOutcome> {
        let mut agents_used = Vec::new();
        let mut tokens_consumed: i64 = 0;
        let mut previous_output: Option<String> = None;

        let knowledge_context = self.retrieve_context(request, crew).await;

        for (name, descriptor) in crew {
            let mut messages = vec![Message::system(self.agent_prompt(descriptor, request))];

            if descriptor.memory {
                if let Some(history) = &request.history {
                    messages.push(Message::system(format!(
                        "Historique de la conversation:\n{history}"
                    )));
                }
            }
            if descriptor.tools.iter().any(|t| t == "faq_search") {
                if let Some(snippets) = &knowledge_context {
                    messages.push(Message::system(format!(
                        "Extraits de la base de connaissances:\n{snippets}"
                    )));
                }
            }
            if let Some(previous) = &previous_output {
                messages.push(Message::system(format!(
                    "Analyse de l'agent précédent:\n{previous}"
                )));
            }
            messages.push(Message::user(request.query.clone()));

            let result = tokio::time::timeout(self.tier_timeout, llm.chat(messages))
                .await
                .map_err(|_| anyhow::anyhow!("tier timeout after {:?}", self.tier_timeout))??;

            tokens_consumed += result
                .usage
                .as_ref()
                .map(|u| u.total_tokens as i64)
                .unwrap_or(0);
            previous_output = Some(result.content);
            agents_used.push(name.clone());
        }

        let result = previous_output
            .ok_or_else(|| anyhow::anyhow!("crew produced no output"))?;
        let tasks_executed = agents_used.len();

        info!(
            tenant_id = %request.tenant_id,
            agents = ?agents_used,
            tasks_executed,
            "Crew execution completed"
        );

        Ok(CrewOutcome {
            success: true,
            result,
            agents_used,
            tasks_executed,
            mode: "full_crew".into(),
            tokens_consumed,
            confidence: DEFAULT_CONFIDENCE,
            failed_tiers: 0,
        })
    }

    /// Tier 2: single agent, no memory, one call.
    async fn minimal_execution(
        &self,
        llm: &Arc<dyn LlmClient>,
        request: &CrewRequest,
        crew: &[(String, AgentDescriptor)],
    ) -> anyhow::Result<CrewOutcome> {
        let (name, descriptor) = &crew[0];

        let messages = vec![
            Message::system(self.agent_prompt(descriptor, request)),
            Message::user(request.query.clone()),
        ];

        let result = tokio::time::timeout(self.tier_timeout, llm.chat(messages))
            .await
            .map_err(|_| anyhow::anyhow!("tier timeout after {:?}", self.tier_timeout))??;

        Ok(CrewOutcome {
            success: true,
            result: result.content,
            agents_used: vec![name.clone()],
            tasks_executed: 1,
            mode: "minimal".into(),
            tokens_consumed: result
                .usage
                .as_ref()
                .map(|u| u.total_tokens as i64)
                .unwrap_or(0),
            confidence: DEFAULT_CONFIDENCE,
            failed_tiers: 0,
        })
    }

    /// Tier 3: canned reply. Always succeeds.
    fn fallback_response(&self, request: &CrewRequest, failed_tiers: u32) -> CrewOutcome {
        CrewOutcome {
            success: true,
            result: format!(
                "Bonjour ! Concernant votre question sur {}, je vous confirme que nous avons \
                 bien reçu votre demande. Un conseiller peut vous aider davantage si nécessaire.",
                request.application
            ),
            agents_used: vec![FALLBACK_AGENT.into()],
            tasks_executed: 1,
            mode: "fallback".into(),
            tokens_consumed: 0,
            confidence: FALLBACK_CONFIDENCE,
            failed_tiers,
        }
    }

    /// Tenant-scoped knowledge snippets for crews carrying the `faq_search`
    /// tool. Retrieval failures degrade to no snippets, never to a failed
    /// tier.
    async fn retrieve_context(
        &self,
        request: &CrewRequest,
        crew: &[(String, AgentDescriptor)],
    ) -> Option<String> {
        let knowledge = self.knowledge.as_ref()?;
        if !crew
            .iter()
            .any(|(_, d)| d.tools.iter().any(|t| t == "faq_search"))
        {
            return None;
        }

        match knowledge
            .query(&request.application, &request.tenant_id, &request.query, 3, None)
            .await
        {
            Ok(hits) if !hits.is_empty() => Some(
                hits.iter()
                    .map(|h| format!("- ({:.2}) {}", h.relevance, h.content))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Knowledge retrieval failed, continuing without snippets");
                None
            }
        }
    }

    fn agent_prompt(&self, descriptor: &AgentDescriptor, request: &CrewRequest) -> String {
        let task_description = self
            .registry
            .task("respond_to_query")
            .map(|t| t.description.clone())
            .unwrap_or_else(|| "Réponds à la question de l'utilisateur.".into());
        let expected_output = self
            .registry
            .task("respond_to_query")
            .map(|t| t.expected_output.clone())
            .unwrap_or_else(|| "Réponse claire et utile à la question de l'utilisateur".into());

        let tools = if descriptor.tools.is_empty() {
            String::new()
        } else {
            format!("\nOutils disponibles: {}.", descriptor.tools.join(", "))
        };

        format!(
            "Rôle: {role}\nObjectif: {goal}\nContexte: {backstory}\n\
             Application: {application} — Filiale: {tenant}.{tools}\n\
             Tâche: {task_description}\nRésultat attendu: {expected_output}",
            role = descriptor.role,
            goal = descriptor.goal,
            backstory = descriptor.backstory,
            application = request.application,
            tenant = request.tenant_id,
        )
    }
}

impl CrewOutcome {
    fn with_failed_tiers(mut self, failed_tiers: u32) -> Self {
        self.failed_tiers = failed_tiers;
        self
    }
}
