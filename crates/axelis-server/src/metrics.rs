// crates/axelis-server/src/metrics.rs
// Prometheus metrics for the assistant

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

use crate::db::{DatabasePool, escalation as esc_db};
use crate::error::Result;

/// Global Prometheus handle for metrics rendering
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Process start, for the uptime report
static STARTED_AT: OnceLock<Instant> = OnceLock::new();

/// Initialize the Prometheus metrics exporter. Safe to call once per
/// process; tests and repeated boots are tolerated.
pub fn init_metrics() {
    let _ = STARTED_AT.set(Instant::now());
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_ok() {
                info!("Prometheus metrics initialized");
            }
        }
        Err(e) => {
            tracing::warn!("Prometheus recorder already installed or failed: {}", e);
        }
    }
}

/// Render the Prometheus exposition text.
pub fn render() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Record one handled conversation turn (counter)
pub fn record_conversation(tenant_id: &str, application: &str, channel: &str) {
    counter!(
        "axelis_conversations_total",
        "tenant_id" => tenant_id.to_string(),
        "application" => application.to_string(),
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// Record an escalation to a human agent (counter)
pub fn record_escalation(tenant_id: &str, reason: &str, priority: &str) {
    counter!(
        "axelis_escalations_total",
        "tenant_id" => tenant_id.to_string(),
        "reason" => reason.to_string(),
        "priority" => priority.to_string()
    )
    .increment(1);
}

/// Record a reasoning agent's response time (histogram)
pub fn record_response_time(agent_name: &str, tenant_id: &str, seconds: f64) {
    histogram!(
        "axelis_response_time_seconds",
        "agent_name" => agent_name.to_string(),
        "tenant_id" => tenant_id.to_string()
    )
    .record(seconds);
}

/// Record LLM token usage (counter)
pub fn record_tokens(model: &str, input_tokens: u64, output_tokens: u64) {
    counter!("axelis_llm_tokens_total", "model" => model.to_string(), "type" => "input")
        .increment(input_tokens);
    counter!("axelis_llm_tokens_total", "model" => model.to_string(), "type" => "output")
        .increment(output_tokens);
}

/// Record a system error (counter)
pub fn record_error(error_type: &str, component: &str) {
    counter!(
        "axelis_errors_total",
        "error_type" => error_type.to_string(),
        "component" => component.to_string()
    )
    .increment(1);
}

/// Update the active-conversations gauge for one tenant
pub fn set_active_conversations(tenant_id: &str, count: i64) {
    gauge!("axelis_active_conversations", "tenant_id" => tenant_id.to_string())
        .set(count as f64);
}

/// Aggregated system metrics for the `/metrics` API endpoint: DB-derived
/// 24-hour aggregates plus the raw Prometheus exposition.
pub async fn system_metrics(pool: &Arc<DatabasePool>) -> Result<Value> {
    let conversations = pool
        .run(|conn| crate::db::conversation::activity_stats_sync(conn, None, None, 24))
        .await?;

    let escalations: Vec<(String, i64)> = pool
        .run(|conn| esc_db::escalation_counts_sync(conn, 24))
        .await?;
    let escalation_total: i64 = escalations.iter().map(|(_, n)| n).sum();

    let performance = pool
        .run(|conn| {
            conn.query_row(
                "SELECT
                    AVG(tokens_consumed) FILTER (WHERE tokens_consumed > 0),
                    COUNT(*),
                    COUNT(DISTINCT conversation_id)
                 FROM messages
                 WHERE timestamp > datetime('now', '-24 hours')",
                [],
                |row| {
                    Ok(json!({
                        "avg_tokens_per_message": row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                        "total_messages_24h": row.get::<_, i64>(1)?,
                        "unique_conversations_24h": row.get::<_, i64>(2)?,
                    }))
                },
            )
        })
        .await?;

    let uptime = STARTED_AT
        .get()
        .map(|s| s.elapsed().as_secs_f64())
        .unwrap_or(0.0);

    Ok(json!({
        "system": {
            "uptime_seconds": uptime,
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "conversations": conversations,
        "escalations": {
            "by_reason": escalations
                .into_iter()
                .map(|(reason, count)| json!({"reason": reason, "count": count}))
                .collect::<Vec<_>>(),
            "total_24h": escalation_total,
        },
        "performance": performance,
        "prometheus_metrics": render(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_metrics_shape() {
        let pool = Arc::new(DatabasePool::open_in_memory(384).await.unwrap());
        let metrics = system_metrics(&pool).await.unwrap();

        assert_eq!(metrics["system"]["status"], json!("healthy"));
        assert_eq!(metrics["escalations"]["total_24h"], json!(0));
        assert_eq!(metrics["performance"]["total_messages_24h"], json!(0));
        assert!(metrics["conversations"]["total_conversations"].is_number());
    }

    #[test]
    fn test_record_helpers_do_not_panic_without_recorder() {
        // Helpers must be safe before init_metrics() runs (no-op recorder)
        record_conversation("t_ci", "mobile_money", "mobile");
        record_escalation("t_ci", "urgent_keywords", "urgent");
        record_response_time("general_assistant", "t_ci", 0.4);
        record_tokens("gpt-4o-mini", 100, 50);
        record_error("timeout", "orchestrator");
        set_active_conversations("t_ci", 3);
    }
}
