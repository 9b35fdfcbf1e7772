// crates/axelis-server/src/background/mod.rs
// Periodic maintenance tasks
//
// Each loop is fire-and-forget: failures are logged and the next tick
// retries. Nothing here sits on a request path.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::db::{DatabasePool, conversation as conv_db};
use crate::escalation::EscalationRouter;

/// Refresh cadence of the active-conversations gauge.
const GAUGE_REFRESH_SECS: u64 = 60;

/// Cadence of the agent-load reconciliation job.
const RECONCILE_SECS: u64 = 300;

/// Spawn all periodic maintenance loops.
pub fn spawn_background_tasks(pool: Arc<DatabasePool>, router: Arc<EscalationRouter>) {
    tokio::spawn(active_conversations_loop(pool));
    tokio::spawn(reconcile_loads_loop(router));
    info!("Background tasks started");
}

/// Keep the per-tenant active-conversations gauge current.
async fn active_conversations_loop(pool: Arc<DatabasePool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(GAUGE_REFRESH_SECS));
    loop {
        interval.tick().await;
        if let Some(counts) = pool
            .try_interact("active conversations gauge", |conn| {
                Ok(conv_db::active_by_tenant_sync(conn)?)
            })
            .await
        {
            for (tenant_id, count) in counts {
                crate::metrics::set_active_conversations(&tenant_id, count);
            }
        }
    }
}

/// Periodically restore the agent-load invariant from open assignments.
async fn reconcile_loads_loop(router: Arc<EscalationRouter>) {
    let mut interval = tokio::time::interval(Duration::from_secs(RECONCILE_SECS));
    loop {
        interval.tick().await;
        match router.reconcile_loads().await {
            Ok(updated) => debug!(updated, "Agent loads reconciled"),
            Err(e) => debug!("Agent load reconciliation skipped: {}", e),
        }
    }
}
