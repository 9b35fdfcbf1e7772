// crates/axelis-server/src/escalation/router.rs
// Expertise-aware routing of escalations to human agents

use std::sync::Arc;

use tracing::{info, warn};

use crate::db::{DatabasePool, HumanAgentRow, human_agent as db};
use crate::error::Result;
use crate::nlp::DEFAULT_LANGUAGE;

/// Fixed expertise set the keyword classifier maps into.
pub const EXPERTISE_GENERAL: &str = "general";

/// Routing input for one escalation.
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    pub reason: String,
    pub user_message: String,
    pub user_language: Option<String>,
    pub priority: String,
}

/// Hybrid router: expertise match, then availability, then recency.
pub struct EscalationRouter {
    pool: Arc<DatabasePool>,
}

impl EscalationRouter {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }

    /// Pick and atomically claim the best human agent for this escalation.
    /// Returns `None` when no agent qualifies.
    pub async fn find_best_agent(&self, context: &RoutingContext) -> Result<Option<String>> {
        let expertise = extract_required_expertise(&context.reason, &context.user_message);
        let language = context
            .user_language
            .clone()
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let expertise_owned = expertise.to_string();
        let claimed = self
            .pool
            .run_with_retry(move |conn| {
                db::find_and_claim_agent_sync(conn, &expertise_owned, &language)
            })
            .await?;

        match claimed {
            Some(agent) => {
                info!(
                    agent_id = %agent.id,
                    expertise,
                    reason = %context.reason,
                    "Agent assigned for escalation"
                );
                Ok(Some(agent.id))
            }
            None => {
                warn!(expertise, "No available agent found for escalation");
                Ok(None)
            }
        }
    }

    /// Release one slot of an agent's capacity (clamped at zero).
    pub async fn release_agent(&self, agent_id: &str) -> Result<()> {
        let id = agent_id.to_string();
        self.pool
            .run(move |conn| db::release_agent_sync(conn, &id))
            .await?;
        info!(agent_id, "Agent released");
        Ok(())
    }

    /// One agent's registry row.
    pub async fn agent_status(&self, agent_id: &str) -> Result<Option<HumanAgentRow>> {
        let id = agent_id.to_string();
        self.pool.run(move |conn| db::get_agent_sync(conn, &id)).await
    }

    /// All available agents, least loaded first.
    pub async fn list_available(&self) -> Result<Vec<HumanAgentRow>> {
        self.pool.run(db::list_available_sync).await
    }

    /// Recompute load counters from open escalation assignments.
    pub async fn reconcile_loads(&self) -> Result<usize> {
        self.pool.run(db::reconcile_loads_sync).await
    }
}

/// Map `{reason, user_message}` to one expertise. First matching bucket
/// wins; `general` is the fallback.
pub fn extract_required_expertise(reason: &str, user_message: &str) -> &'static str {
    const EXPERTISE_KEYWORDS: &[(&str, &[&str])] = &[
        (
            "complaints",
            &["réclamation", "complaint", "insatisfait", "mécontent"],
        ),
        (
            "operations",
            &["transfert", "annulation", "transaction", "solde", "compte"],
        ),
        (
            "technical",
            &["bug", "erreur", "ne fonctionne pas", "problème technique", "app"],
        ),
        (
            "commercial",
            &["tarif", "prix", "nouveau service", "information produit"],
        ),
    ];

    let reason = reason.to_lowercase();
    let message = user_message.to_lowercase();

    for (expertise, keywords) in EXPERTISE_KEYWORDS {
        if keywords
            .iter()
            .any(|kw| reason.contains(kw) || message.contains(kw))
        {
            return expertise;
        }
    }
    EXPERTISE_GENERAL
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn router_with_agents() -> EscalationRouter {
        let pool = Arc::new(DatabasePool::open_in_memory(384).await.unwrap());
        pool.interact(|conn| {
            db::upsert_agent_sync(
                conn,
                "agent_ci_001",
                "Marie Kouame",
                None,
                &["complaints".into(), "operations".into()],
                &["fr".into(), "en".into()],
                "available",
                5,
            )?;
            db::upsert_agent_sync(
                conn,
                "agent_ci_002",
                "Ibrahim Diallo",
                None,
                &["technical".into()],
                &["fr".into()],
                "available",
                3,
            )?;
            Ok(())
        })
        .await
        .unwrap();
        EscalationRouter::new(pool)
    }

    #[test]
    fn test_extract_expertise_complaints() {
        assert_eq!(
            extract_required_expertise("réclamation client", "je suis insatisfait"),
            "complaints"
        );
    }

    #[test]
    fn test_extract_expertise_operations() {
        assert_eq!(
            extract_required_expertise("problème transfert", "mon transfert est en attente"),
            "operations"
        );
    }

    #[test]
    fn test_extract_expertise_technical() {
        assert_eq!(
            extract_required_expertise("bug application", "l'app ne fonctionne pas"),
            "technical"
        );
    }

    #[test]
    fn test_extract_expertise_general_fallback() {
        assert_eq!(
            extract_required_expertise("question générale", "bonjour"),
            EXPERTISE_GENERAL
        );
    }

    #[tokio::test]
    async fn test_find_best_agent_claims_slot() {
        let router = router_with_agents().await;
        let context = RoutingContext {
            reason: "réclamation urgente".into(),
            user_message: "je suis insatisfait".into(),
            user_language: Some("fr".into()),
            priority: "high".into(),
        };

        let agent_id = router.find_best_agent(&context).await.unwrap().unwrap();
        assert_eq!(agent_id, "agent_ci_001");

        let status = router.agent_status(&agent_id).await.unwrap().unwrap();
        assert_eq!(status.current_load, 1);
    }

    #[tokio::test]
    async fn test_release_returns_capacity() {
        let router = router_with_agents().await;
        let context = RoutingContext {
            reason: "bug".into(),
            user_message: "l'app plante".into(),
            ..Default::default()
        };

        let agent_id = router.find_best_agent(&context).await.unwrap().unwrap();
        router.release_agent(&agent_id).await.unwrap();

        let status = router.agent_status(&agent_id).await.unwrap().unwrap();
        assert_eq!(status.current_load, 0);
    }

    #[tokio::test]
    async fn test_no_agent_when_pool_empty() {
        let pool = Arc::new(DatabasePool::open_in_memory(384).await.unwrap());
        let router = EscalationRouter::new(pool);
        let found = router
            .find_best_agent(&RoutingContext::default())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_claims_respect_capacity() {
        let router = Arc::new(router_with_agents().await);

        // 10 concurrent claims against 5+3 slots: every claim that lands
        // must keep 0 <= load <= max_concurrent
        let mut handles = Vec::new();
        for _ in 0..10 {
            let router = router.clone();
            handles.push(tokio::spawn(async move {
                router
                    .find_best_agent(&RoutingContext {
                        reason: "transfert".into(),
                        user_message: "mon solde".into(),
                        ..Default::default()
                    })
                    .await
            }));
        }

        let mut assigned = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                assigned += 1;
            }
        }
        assert_eq!(assigned, 8, "exactly the total capacity can be claimed");

        for id in ["agent_ci_001", "agent_ci_002"] {
            let agent = router.agent_status(id).await.unwrap().unwrap();
            assert!(agent.current_load <= agent.max_concurrent);
            assert!(agent.current_load >= 0);
        }
    }

    #[tokio::test]
    async fn test_list_available_ordering() {
        let router = router_with_agents().await;
        router
            .find_best_agent(&RoutingContext {
                reason: "réclamation".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let available = router.list_available().await.unwrap();
        assert_eq!(available.len(), 2);
        // Least loaded first
        assert!(available[0].current_load <= available[1].current_load);
    }
}
