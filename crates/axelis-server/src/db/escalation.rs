// db/escalation.rs
// Escalation operations (sync versions for pool.interact)

use rusqlite::{Connection, Row, params};
use serde_json::{Value, json};
use uuid::Uuid;

use super::immediate_tx;
use super::types::{EscalationRow, parse_json_column};
use crate::error::{AxelisError, Result};

fn parse_escalation_row(row: &Row) -> rusqlite::Result<EscalationRow> {
    Ok(EscalationRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        reason: row.get(2)?,
        escalation_type: row.get(3)?,
        priority: row.get(4)?,
        assigned_to: row.get(5)?,
        status: row.get(6)?,
        context: parse_json_column(row.get(7)?, json!({})),
        escalated_at: row.get(8)?,
        resolved_at: row.get(9)?,
        resolution_notes: row.get(10)?,
    })
}

const ESCALATION_COLUMNS: &str = "id, conversation_id, reason, escalation_type, priority, \
     assigned_to, status, context, escalated_at, resolved_at, resolution_notes";

/// Insert an escalation and flip the owning conversation to `escalated`,
/// in one transaction.
pub fn create_escalation_sync(
    conn: &Connection,
    conversation_id: &str,
    reason: &str,
    escalation_type: &str,
    priority: &str,
    assigned_to: Option<&str>,
    context: &Value,
) -> Result<String> {
    immediate_tx(conn, |conn| {
        let escalation_id = Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO escalations (
                id, conversation_id, reason, escalation_type,
                priority, assigned_to, status, context, escalated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, datetime('now'))",
            params![
                escalation_id,
                conversation_id,
                reason,
                escalation_type,
                priority,
                assigned_to,
                context.to_string(),
            ],
        )?;

        let updated = conn.execute(
            "UPDATE conversations
             SET status = 'escalated', updated_at = datetime('now')
             WHERE id = ?1",
            params![conversation_id],
        )?;
        if updated == 0 {
            return Err(AxelisError::NotFound(format!(
                "conversation {conversation_id}"
            )));
        }

        tracing::info!(
            escalation_id = %escalation_id,
            conversation_id = %conversation_id,
            reason,
            priority,
            "Escalation created"
        );
        Ok(escalation_id)
    })
}

/// Open escalations for one conversation, newest first.
pub fn get_active_escalations_sync(
    conn: &Connection,
    conversation_id: &str,
) -> rusqlite::Result<Vec<EscalationRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ESCALATION_COLUMNS} FROM escalations
         WHERE conversation_id = ?1 AND status IN ('pending', 'in_progress')
         ORDER BY escalated_at DESC
         LIMIT 5"
    ))?;
    let rows = stmt.query_map(params![conversation_id], parse_escalation_row)?;
    rows.collect()
}

/// Escalation counts by reason over the last `hours` (metrics surface).
pub fn escalation_counts_sync(
    conn: &Connection,
    hours: u32,
) -> rusqlite::Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT reason, COUNT(*) FROM escalations
         WHERE escalated_at > datetime('now', ?1)
         GROUP BY reason
         ORDER BY COUNT(*) DESC",
    )?;
    let rows = stmt.query_map(params![format!("-{} hours", hours)], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::conversation::get_or_create_conversation_sync;
    use crate::db::pool::ensure_sqlite_vec_registered;
    use crate::db::schema::run_all_migrations;

    fn test_conn() -> Connection {
        ensure_sqlite_vec_registered();
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn, 384).unwrap();
        conn
    }

    fn conversation(conn: &Connection) -> String {
        get_or_create_conversation_sync(
            conn,
            "u1",
            "t_ci",
            "mobile_money",
            "mobile",
            "fr",
            "basic",
            &json!({}),
        )
        .unwrap()
        .0
    }

    #[test]
    fn test_create_escalation_flips_conversation_status() {
        let conn = test_conn();
        let conv = conversation(&conn);

        let escalation_id = create_escalation_sync(
            &conn,
            &conv,
            "urgent_keywords(urgent)",
            "human_agent",
            "urgent",
            Some("agent_ci_001"),
            &json!({"user_language": "fr"}),
        )
        .unwrap();
        assert!(!escalation_id.is_empty());

        let status: String = conn
            .query_row(
                "SELECT status FROM conversations WHERE id = ?1",
                params![conv],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(status, "escalated");

        let active = get_active_escalations_sync(&conn, &conv).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].priority, "urgent");
        assert_eq!(active[0].assigned_to.as_deref(), Some("agent_ci_001"));
        assert_eq!(active[0].status, "pending");
    }

    #[test]
    fn test_create_escalation_unknown_conversation() {
        let conn = test_conn();
        let result = create_escalation_sync(
            &conn,
            "missing",
            "reason",
            "human_agent",
            "medium",
            None,
            &json!({}),
        );
        assert!(result.is_err());

        // Nothing committed: the escalation insert was rolled back
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM escalations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_escalation_counts_by_reason() {
        let conn = test_conn();
        let conv = conversation(&conn);
        for _ in 0..2 {
            create_escalation_sync(
                &conn,
                &conv,
                "negative_sentiment",
                "human_agent",
                "high",
                None,
                &json!({}),
            )
            .unwrap();
        }

        let counts = escalation_counts_sync(&conn, 24).unwrap();
        assert_eq!(counts, vec![("negative_sentiment".to_string(), 2)]);
    }
}
