// crates/axelis-server/src/cli.rs
// Command-line interface and server bootstrap

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use axelis::agents::AgentRegistry;
use axelis::background::spawn_background_tasks;
use axelis::config::EnvConfig;
use axelis::conversation::ConversationStore;
use axelis::db::DatabasePool;
use axelis::embeddings::EmbeddingClient;
use axelis::escalation::{ContextBuilder, EscalationDetector, EscalationRouter};
use axelis::knowledge::KnowledgeStore;
use axelis::llm;
use axelis::packs::PackManager;
use axelis::pipeline::ChatPipeline;
use axelis::web::auth::ApiKeyAuth;
use axelis::web::state::AppState;
use axelis::{metrics, seed, web};

#[derive(Parser)]
#[command(name = "axelis", version, about = "Multi-tenant conversational assistant")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Seed demo human agents and FAQ knowledge
    Seed,
    /// Delete closed conversations older than the retention threshold
    Sweep {
        /// Retention in days
        #[arg(long, default_value_t = 90)]
        days: u32,
    },
}

/// Assemble the shared application state from configuration.
async fn build_state(config: &EnvConfig) -> Result<AppState> {
    let embeddings = Arc::new(EmbeddingClient::from_config(
        &config.api,
        &config.embeddings,
    ));

    let db_path = config.data_dir.join("axelis.db");
    let pool = Arc::new(
        DatabasePool::open(&db_path, embeddings.dimensions())
            .await
            .context("Failed to open database")?,
    );

    // Startup is fatal when no packs can be loaded at all
    let packs = Arc::new(PackManager::load(&config.config_dir)?);

    let store = Arc::new(ConversationStore::new(pool.clone(), packs.clone()));
    let knowledge = Arc::new(KnowledgeStore::new(pool.clone(), embeddings.clone()));
    let llm_client = llm::create_client(config);
    let registry = AgentRegistry::load(&config.config_dir);
    let orchestrator = Arc::new(
        axelis::orchestrator::CrewOrchestrator::new(registry, llm_client.clone())
            .with_knowledge(knowledge.clone()),
    );
    let detector = Arc::new(EscalationDetector::new());
    let router = Arc::new(EscalationRouter::new(pool.clone()));
    let context_builder = Arc::new(ContextBuilder::new(store.clone(), packs.clone()));
    let pipeline = Arc::new(ChatPipeline::new(
        packs.clone(),
        store.clone(),
        orchestrator,
        detector.clone(),
        llm_client,
    ));
    let auth = Arc::new(ApiKeyAuth::from_table(&config.api_keys_table));

    let banking = match (&config.banking_api_url, &config.api.banking) {
        (Some(url), Some(key)) => Some(Arc::new(axelis::tools::BankingApiClient::new(
            url.clone(),
            key.clone(),
        ))),
        _ => None,
    };

    Ok(AppState {
        pool,
        packs,
        store,
        knowledge,
        embeddings,
        pipeline,
        detector,
        router,
        context_builder,
        auth,
        banking,
        push_relay_url: config.push_relay_url.clone(),
        environment: config.environment.clone(),
    })
}

/// Run the HTTP server until shutdown.
pub async fn run_server() -> Result<()> {
    let config = EnvConfig::from_env();
    metrics::init_metrics();

    let state = build_state(&config).await?;
    spawn_background_tasks(state.pool.clone(), state.router.clone());

    let router = web::create_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(addr = %addr, environment = %config.environment, "Axelis server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Seed demo agents and knowledge.
pub async fn run_seed() -> Result<()> {
    let config = EnvConfig::from_env();
    let state = build_state(&config).await?;

    let agents = seed::seed_human_agents(&state.pool).await?;
    let records = seed::seed_knowledge(&state.knowledge).await?;
    println!("Seeded {agents} human agents and {records} knowledge records");
    Ok(())
}

/// Sweep closed conversations past retention.
pub async fn run_sweep(days: u32) -> Result<()> {
    let config = EnvConfig::from_env();
    let state = build_state(&config).await?;

    let deleted = state.store.sweep(days).await?;
    println!("Deleted {deleted} closed conversations older than {days} days");
    Ok(())
}
