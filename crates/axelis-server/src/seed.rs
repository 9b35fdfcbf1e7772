// crates/axelis-server/src/seed.rs
// Demo data: human agents and starter FAQ knowledge

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::APPLICATION_ID;
use crate::db::{DatabasePool, human_agent as agent_db};
use crate::error::Result;
use crate::knowledge::{KnowledgeRecord, KnowledgeStore};

struct SeedAgent {
    id: &'static str,
    name: &'static str,
    email: &'static str,
    specialties: &'static [&'static str],
    languages: &'static [&'static str],
    max_concurrent: i64,
}

const SEED_AGENTS: &[SeedAgent] = &[
    SeedAgent {
        id: "agent_ci_001",
        name: "Marie Kouame",
        email: "marie.kouame@example.ci",
        specialties: &["complaints", "operations"],
        languages: &["fr", "en"],
        max_concurrent: 5,
    },
    SeedAgent {
        id: "agent_ci_002",
        name: "Ibrahim Diallo",
        email: "ibrahim.diallo@example.ci",
        specialties: &["technical", "operations"],
        languages: &["fr"],
        max_concurrent: 3,
    },
    SeedAgent {
        id: "agent_bf_001",
        name: "Aminata Traore",
        email: "aminata.traore@example.bf",
        specialties: &["complaints", "commercial"],
        languages: &["fr"],
        max_concurrent: 4,
    },
    SeedAgent {
        id: "agent_ml_001",
        name: "Moussa Keita",
        email: "moussa.keita@example.ml",
        specialties: &["operations", "technical"],
        languages: &["fr"],
        max_concurrent: 3,
    },
];

/// Register the demo human agents. Idempotent; live load counters survive.
pub async fn seed_human_agents(pool: &Arc<DatabasePool>) -> Result<usize> {
    let count = SEED_AGENTS.len();
    pool.run(|conn| -> Result<()> {
        for agent in SEED_AGENTS {
            let specialties: Vec<String> =
                agent.specialties.iter().map(|s| s.to_string()).collect();
            let languages: Vec<String> = agent.languages.iter().map(|s| s.to_string()).collect();
            agent_db::upsert_agent_sync(
                conn,
                agent.id,
                agent.name,
                Some(agent.email),
                &specialties,
                &languages,
                "available",
                agent.max_concurrent,
            )?;
        }
        Ok(())
    })
    .await?;

    info!(count, "Human agents seeded");
    Ok(count)
}

/// Ingest a starter FAQ set for the demo tenants.
pub async fn seed_knowledge(store: &KnowledgeStore) -> Result<usize> {
    let faqs: &[(&str, &str, &str)] = &[
        (
            "consultation",
            "faq_consultation.md",
            "Pour consulter votre solde, ouvrez l'application, connectez-vous et \
             sélectionnez 'Mon compte'. Le solde s'affiche immédiatement et reste \
             disponible hors connexion pendant une heure.",
        ),
        (
            "transferts",
            "faq_transferts.md",
            "Les transferts nationaux sont crédités en quelques minutes. Les frais \
             sont de 500 XOF plus 2% du montant, plafonnés selon la destination.",
        ),
        (
            "transferts",
            "faq_transferts.md",
            "Pour annuler un transfert non retiré, rendez-vous dans l'historique \
             des transactions et sélectionnez 'Annuler'. L'annulation est gratuite \
             dans les 30 minutes.",
        ),
        (
            "faq_general",
            "faq_general.md",
            "Notre service client est disponible de 8h00 à 17h00 (GMT), du lundi \
             au samedi. En dehors de ces horaires, l'assistant reste à votre \
             disposition.",
        ),
    ];

    let mut total = 0;
    for tenant_id in ["t_ci", "t_bf"] {
        let records: Vec<KnowledgeRecord> = faqs
            .iter()
            .enumerate()
            .map(|(i, (category, source, content))| KnowledgeRecord {
                source: source.to_string(),
                chunk_index: i,
                content: content.to_string(),
                metadata: json!({"category": category, "language": "fr"}),
            })
            .collect();
        total += store.upsert(APPLICATION_ID, tenant_id, records).await?;
    }

    info!(total, "Knowledge base seeded");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKeys, EmbeddingsConfig};
    use crate::embeddings::EmbeddingClient;

    #[tokio::test]
    async fn test_seed_agents_idempotent() {
        let pool = Arc::new(DatabasePool::open_in_memory(384).await.unwrap());
        assert_eq!(seed_human_agents(&pool).await.unwrap(), 4);
        assert_eq!(seed_human_agents(&pool).await.unwrap(), 4);

        let count: i64 = pool
            .interact(|conn| {
                conn.query_row("SELECT COUNT(*) FROM human_agents", [], |r| r.get(0))
                    .map_err(Into::into)
            })
            .await
            .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_seed_knowledge_idempotent() {
        let pool = Arc::new(DatabasePool::open_in_memory(384).await.unwrap());
        let embeddings = Arc::new(EmbeddingClient::from_config(
            &ApiKeys::default(),
            &EmbeddingsConfig::default(),
        ));
        let store = KnowledgeStore::new(pool, embeddings);

        seed_knowledge(&store).await.unwrap();
        seed_knowledge(&store).await.unwrap();

        let stats = store.stats(APPLICATION_ID, "t_ci").await.unwrap();
        assert_eq!(stats["count"], json!(4));
    }
}
