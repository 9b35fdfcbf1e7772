// crates/axelis-server/src/web/state.rs
// Web server state management

use std::sync::Arc;

use crate::conversation::ConversationStore;
use crate::db::DatabasePool;
use crate::embeddings::EmbeddingClient;
use crate::escalation::{ContextBuilder, EscalationDetector, EscalationRouter};
use crate::knowledge::KnowledgeStore;
use crate::packs::PackManager;
use crate::pipeline::ChatPipeline;
use crate::tools::BankingApiClient;
use crate::web::auth::ApiKeyAuth;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<DatabasePool>,
    pub packs: Arc<PackManager>,
    pub store: Arc<ConversationStore>,
    pub knowledge: Arc<KnowledgeStore>,
    pub embeddings: Arc<EmbeddingClient>,
    pub pipeline: Arc<ChatPipeline>,
    pub detector: Arc<EscalationDetector>,
    pub router: Arc<EscalationRouter>,
    pub context_builder: Arc<ContextBuilder>,
    pub auth: Arc<ApiKeyAuth>,
    /// Client of the external banking platform, when credentials are
    /// configured
    pub banking: Option<Arc<BankingApiClient>>,
    /// Push-notification relay target for webhook fanout
    pub push_relay_url: Option<String>,
    /// Deployment tag surfaced by the health route
    pub environment: String,
}
