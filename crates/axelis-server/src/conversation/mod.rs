// crates/axelis-server/src/conversation/mod.rs
// Durable dialogue state: sessions, messages, escalations, cached context

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use tracing::{debug, info};

use crate::db::{
    ConversationRow, ConversationStats, DatabasePool, EscalationRow, MessageRow, NewMessage,
    conversation as db, escalation as esc_db,
};
use crate::error::{AxelisError, Result};
use crate::packs::PackManager;

/// TTL of the per-session context cache.
const CONTEXT_CACHE_TTL_SECS: u64 = 300;

/// Messages included in an assembled context.
const CONTEXT_MESSAGE_LIMIT: usize = 20;

/// Aggregate view of one conversation handed to the orchestrator and the
/// escalation context builder.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub conversation: ConversationRow,
    pub messages: Vec<MessageRow>,
    pub active_escalations: Vec<EscalationRow>,
    pub statistics: ConversationStats,
}

/// Conversation store backed by the pooled database, with a TTL-bounded
/// in-process cache for context assembly.
///
/// The cache is keyed by conversation id and invalidated by every mutating
/// operation on that conversation. `try_get_with` gives per-key fill
/// exclusion: a stampede of misses produces one database read.
pub struct ConversationStore {
    pool: Arc<DatabasePool>,
    packs: Arc<PackManager>,
    context_cache: Cache<String, Arc<ConversationContext>>,
}

impl ConversationStore {
    pub fn new(pool: Arc<DatabasePool>, packs: Arc<PackManager>) -> Self {
        Self {
            pool,
            packs,
            context_cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(CONTEXT_CACHE_TTL_SECS))
                .build(),
        }
    }

    pub fn pool(&self) -> &Arc<DatabasePool> {
        &self.pool
    }

    /// Reuse the most recent active session for `(user, tenant, app)` inside
    /// the idle window, or create a new one carrying a pack snapshot as
    /// metadata. Safe against concurrent first messages.
    pub async fn get_or_create_session(
        &self,
        user_id: &str,
        tenant_id: &str,
        application_id: &str,
        channel: &str,
        language: &str,
    ) -> Result<String> {
        let capabilities = self.packs.capabilities_of(tenant_id, application_id);
        let pack_level = capabilities.pack_name.clone();
        let metadata = capabilities.snapshot();

        let user = user_id.to_string();
        let tenant = tenant_id.to_string();
        let app = application_id.to_string();
        let chan = channel.to_string();
        let lang = language.to_string();

        let (session_id, created) = self
            .pool
            .run_with_retry(move |conn| {
                db::get_or_create_conversation_sync(
                    conn, &user, &tenant, &app, &chan, &lang, &pack_level, &metadata,
                )
            })
            .await?;

        if created {
            crate::metrics::record_conversation(tenant_id, application_id, channel);
        }
        Ok(session_id)
    }

    /// Append a message and bump the session's activity timestamp.
    pub async fn append_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        fields: NewMessage,
    ) -> Result<String> {
        let session = session_id.to_string();
        let role_owned = role.to_string();
        let content_owned = content.to_string();

        let message_id = self
            .pool
            .run_with_retry(move |conn| {
                db::add_message_sync(conn, &session, &role_owned, &content_owned, &fields)
            })
            .await?;

        debug!(conversation_id = %session_id, role, message_id = %message_id, "Message added");
        self.context_cache.invalidate(session_id).await;
        Ok(message_id)
    }

    /// Message history, ascending by timestamp.
    pub async fn history(
        &self,
        session_id: &str,
        limit: usize,
        include_system: bool,
    ) -> Result<Vec<MessageRow>> {
        let session = session_id.to_string();
        self.pool
            .run(move |conn| db::get_history_sync(conn, &session, limit, include_system))
            .await
    }

    /// Fetch one conversation row (uncached).
    pub async fn get_session(&self, session_id: &str) -> Result<Option<ConversationRow>> {
        let session = session_id.to_string();
        self.pool
            .run(move |conn| db::get_conversation_sync(conn, &session))
            .await
    }

    /// Assembled context: conversation row, recent messages, active
    /// escalations and derived statistics. Cached for five minutes.
    pub async fn context(&self, session_id: &str) -> Result<Arc<ConversationContext>> {
        let pool = self.pool.clone();
        let key = session_id.to_string();

        self.context_cache
            .try_get_with(key.clone(), async move {
                let session = key.clone();
                pool.run(move |conn| -> Result<ConversationContext> {
                    let conversation = db::get_conversation_sync(conn, &session)?
                        .ok_or_else(|| AxelisError::NotFound(format!("conversation {session}")))?;
                    let messages =
                        db::get_history_sync(conn, &session, CONTEXT_MESSAGE_LIMIT, false)?;
                    let active_escalations = esc_db::get_active_escalations_sync(conn, &session)?;
                    let statistics = db::get_stats_sync(conn, &session)?;
                    Ok(ConversationContext {
                        conversation,
                        messages,
                        active_escalations,
                        statistics,
                    })
                })
                .await
                .map(Arc::new)
            })
            .await
            .map_err(|e: Arc<AxelisError>| {
                // The cache shares one error across concurrent waiters
                AxelisError::Other(e.to_string())
            })
    }

    /// Create an escalation and transition the session to `escalated`.
    pub async fn create_escalation(
        &self,
        session_id: &str,
        reason: &str,
        priority: &str,
        assigned_to: Option<String>,
        context: Value,
    ) -> Result<String> {
        let session = session_id.to_string();
        let reason_owned = reason.to_string();
        let priority_owned = priority.to_string();

        let escalation_id = self
            .pool
            .run_with_retry(move |conn| {
                esc_db::create_escalation_sync(
                    conn,
                    &session,
                    &reason_owned,
                    "human_agent",
                    &priority_owned,
                    assigned_to.as_deref(),
                    &context,
                )
            })
            .await?;

        self.context_cache.invalidate(session_id).await;
        Ok(escalation_id)
    }

    /// Close a session. Idempotent.
    pub async fn close_session(&self, session_id: &str, reason: &str) -> Result<bool> {
        let session = session_id.to_string();
        let closed = self
            .pool
            .run(move |conn| db::close_conversation_sync(conn, &session))
            .await?;

        if closed {
            info!(conversation_id = %session_id, reason, "Conversation closed");
        }
        self.context_cache.invalidate(session_id).await;
        Ok(closed)
    }

    /// Shallow-merge a patch into the session's context JSON.
    pub async fn update_context(&self, session_id: &str, patch: Value) -> Result<bool> {
        let session = session_id.to_string();
        let updated = self
            .pool
            .run_with_retry(move |conn| db::update_context_sync(conn, &session, &patch))
            .await?;

        self.context_cache.invalidate(session_id).await;
        Ok(updated)
    }

    /// Delete closed sessions older than the retention threshold.
    pub async fn sweep(&self, retention_days: u32) -> Result<usize> {
        let deleted = self
            .pool
            .run(move |conn| db::cleanup_old_sync(conn, retention_days))
            .await?;

        self.context_cache.invalidate_all();
        info!(deleted, retention_days, "Swept old conversations");
        Ok(deleted)
    }

    /// A user's conversations, newest first.
    pub async fn user_conversations(
        &self,
        user_id: &str,
        tenant_id: &str,
        application_id: &str,
        limit: usize,
        status: Option<String>,
    ) -> Result<Vec<Value>> {
        let user = user_id.to_string();
        let tenant = tenant_id.to_string();
        let app = application_id.to_string();
        self.pool
            .run(move |conn| {
                db::get_user_conversations_sync(conn, &user, &tenant, &app, limit, status.as_deref())
            })
            .await
    }

    /// Aggregate conversation statistics for the metrics surface.
    pub async fn activity_stats(
        &self,
        tenant_id: Option<String>,
        application_id: Option<String>,
        hours: u32,
    ) -> Result<Value> {
        self.pool
            .run(move |conn| {
                db::activity_stats_sync(
                    conn,
                    tenant_id.as_deref(),
                    application_id.as_deref(),
                    hours,
                )
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> ConversationStore {
        let pool = Arc::new(DatabasePool::open_in_memory(384).await.unwrap());
        let dir = tempfile::tempdir().unwrap();
        let packs = Arc::new(PackManager::load(dir.path()).unwrap());
        ConversationStore::new(pool, packs)
    }

    #[tokio::test]
    async fn test_session_metadata_carries_pack_snapshot() {
        let store = store().await;
        let session = store
            .get_or_create_session("u1", "t_ci", "mobile_money", "mobile", "fr")
            .await
            .unwrap();

        let row = store.get_session(&session).await.unwrap().unwrap();
        assert_eq!(row.pack_level, "basic");
        assert_eq!(row.metadata["pack_level"], json!("basic"));
        assert!(row.metadata["features_available"].is_array());
    }

    #[tokio::test]
    async fn test_concurrent_first_messages_create_one_session() {
        let store = Arc::new(store().await);

        let mut handles = Vec::new();
        for _ in 0..3 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .get_or_create_session("u1", "t_ci", "mobile_money", "mobile", "fr")
                    .await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1, "exactly one session must be born");
    }

    #[tokio::test]
    async fn test_context_reflects_escalation_atomically() {
        let store = store().await;
        let session = store
            .get_or_create_session("u1", "t_ci", "mobile_money", "mobile", "fr")
            .await
            .unwrap();
        store
            .append_message(&session, "user", "mon transfert est bloqué", NewMessage::default())
            .await
            .unwrap();

        // Warm the cache, then mutate
        let before = store.context(&session).await.unwrap();
        assert_eq!(before.conversation.status, "active");
        assert!(before.active_escalations.is_empty());

        store
            .create_escalation(&session, "urgent_keywords(bloqué)", "urgent", None, json!({}))
            .await
            .unwrap();

        let after = store.context(&session).await.unwrap();
        assert_eq!(after.conversation.status, "escalated");
        assert_eq!(after.active_escalations.len(), 1);
    }

    #[tokio::test]
    async fn test_context_unknown_session() {
        let store = store().await;
        assert!(store.context("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_close_and_sweep() {
        let store = store().await;
        let session = store
            .get_or_create_session("u1", "t_ci", "mobile_money", "mobile", "fr")
            .await
            .unwrap();

        assert!(store.close_session(&session, "completed").await.unwrap());
        assert!(!store.close_session(&session, "completed").await.unwrap());

        // Not old enough to sweep yet
        assert_eq!(store.sweep(90).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_context_visible_through_cache() {
        let store = store().await;
        let session = store
            .get_or_create_session("u1", "t_ci", "mobile_money", "mobile", "fr")
            .await
            .unwrap();

        let _ = store.context(&session).await.unwrap();
        store
            .update_context(&session, json!({"failed_attempts": 2}))
            .await
            .unwrap();

        let ctx = store.context(&session).await.unwrap();
        assert_eq!(ctx.conversation.context["failed_attempts"], json!(2));
    }
}
