// db/conversation.rs
// Conversation and message operations (sync versions for pool.interact)

use rusqlite::{Connection, Row, params};
use serde_json::{Value, json};
use uuid::Uuid;

use super::immediate_tx;
use super::types::{ConversationRow, ConversationStats, MessageRow, NewMessage, parse_json_column, parse_string_array};
use crate::error::{AxelisError, Result};

/// Reuse window: a new message joins the most recent active session if that
/// session saw activity strictly less than 30 minutes ago. Exactly at the
/// boundary a new session is created.
pub const IDLE_WINDOW_MINUTES: i64 = 30;

fn parse_conversation_row(row: &Row) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        tenant_id: row.get(2)?,
        application_id: row.get(3)?,
        pack_level: row.get(4)?,
        channel: row.get(5)?,
        status: row.get(6)?,
        language: row.get(7)?,
        context: parse_json_column(row.get(8)?, json!({})),
        metadata: parse_json_column(row.get(9)?, json!({})),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        closed_at: row.get(12)?,
    })
}

const CONVERSATION_COLUMNS: &str = "id, user_id, tenant_id, application_id, pack_level, channel, \
     status, language, context, metadata, created_at, updated_at, closed_at";

fn parse_message_row(row: &Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        agent_used: row.get(4)?,
        tools_used: parse_string_array(row.get(5)?),
        tokens_consumed: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        confidence_score: row.get(7)?,
        processing_time: row.get(8)?,
        metadata: parse_json_column(row.get(9)?, json!({})),
        timestamp: row.get(10)?,
    })
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, agent_used, tools_used, \
     tokens_consumed, confidence_score, processing_time, metadata, timestamp";

/// Look up a recent active session for `(user, tenant, app)` or create one.
///
/// Runs inside a BEGIN IMMEDIATE transaction so concurrent first messages
/// serialize: the second caller observes the row the first one inserted and
/// reuses it. Returns `(conversation_id, created)`.
pub fn get_or_create_conversation_sync(
    conn: &Connection,
    user_id: &str,
    tenant_id: &str,
    application_id: &str,
    channel: &str,
    language: &str,
    pack_level: &str,
    metadata: &Value,
) -> Result<(String, bool)> {
    immediate_tx(conn, |conn| {
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM conversations
                 WHERE user_id = ?1 AND tenant_id = ?2 AND application_id = ?3
                   AND status = 'active'
                   AND updated_at > datetime('now', ?4)
                 ORDER BY updated_at DESC, rowid DESC
                 LIMIT 1",
                params![
                    user_id,
                    tenant_id,
                    application_id,
                    format!("-{} minutes", IDLE_WINDOW_MINUTES)
                ],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        if let Some(id) = existing {
            tracing::debug!(conversation_id = %id, user_id, tenant_id, "Reusing active conversation");
            return Ok((id, false));
        }

        let id = Uuid::new_v4().to_string();
        let initial_context = json!({
            "user_preferences": {},
            "channel": channel,
            "language": language,
            "failed_attempts": 0,
        });

        conn.execute(
            "INSERT INTO conversations (
                id, user_id, tenant_id, application_id, pack_level,
                channel, status, language, context, metadata, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, ?8, ?9, datetime('now'), datetime('now'))",
            params![
                id,
                user_id,
                tenant_id,
                application_id,
                pack_level,
                channel,
                language,
                initial_context.to_string(),
                metadata.to_string(),
            ],
        )?;

        tracing::info!(conversation_id = %id, user_id, tenant_id, pack_level, "Created new conversation");
        Ok((id, true))
    })
}

/// Append a message and bump the conversation's `updated_at` atomically.
pub fn add_message_sync(
    conn: &Connection,
    conversation_id: &str,
    role: &str,
    content: &str,
    fields: &NewMessage,
) -> Result<String> {
    immediate_tx(conn, |conn| {
        let message_id = Uuid::new_v4().to_string();
        let tools = serde_json::to_string(&fields.tools_used)?;
        let metadata = fields
            .metadata
            .clone()
            .unwrap_or_else(|| json!({}))
            .to_string();

        conn.execute(
            "INSERT INTO messages (
                id, conversation_id, role, content, agent_used,
                tools_used, tokens_consumed, confidence_score,
                processing_time, metadata, timestamp
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))",
            params![
                message_id,
                conversation_id,
                role,
                content,
                fields.agent_used,
                tools,
                fields.tokens_consumed,
                fields.confidence_score,
                fields.processing_time,
                metadata,
            ],
        )?;

        let updated = conn.execute(
            "UPDATE conversations SET updated_at = datetime('now') WHERE id = ?1",
            params![conversation_id],
        )?;
        if updated == 0 {
            return Err(AxelisError::NotFound(format!(
                "conversation {conversation_id}"
            )));
        }

        Ok(message_id)
    })
}

/// Message history ordered ascending by timestamp (rowid as tiebreak).
pub fn get_history_sync(
    conn: &Connection,
    conversation_id: &str,
    limit: usize,
    include_system: bool,
) -> rusqlite::Result<Vec<MessageRow>> {
    let filter = if include_system {
        ""
    } else {
        " AND role != 'system'"
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE conversation_id = ?1{filter}
         ORDER BY timestamp ASC, rowid ASC
         LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![conversation_id, limit as i64], parse_message_row)?;
    rows.collect()
}

/// Fetch a single conversation row.
pub fn get_conversation_sync(
    conn: &Connection,
    conversation_id: &str,
) -> rusqlite::Result<Option<ConversationRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![conversation_id], parse_conversation_row)?;
    rows.next().transpose()
}

/// Aggregated statistics view over a conversation's messages.
pub fn get_stats_sync(
    conn: &Connection,
    conversation_id: &str,
) -> rusqlite::Result<ConversationStats> {
    conn.query_row(
        "SELECT
            COUNT(*),
            COUNT(*) FILTER (WHERE role = 'user'),
            COUNT(*) FILTER (WHERE role = 'assistant'),
            AVG(tokens_consumed) FILTER (WHERE tokens_consumed > 0),
            SUM(tokens_consumed) FILTER (WHERE tokens_consumed > 0),
            AVG(confidence_score) FILTER (WHERE confidence_score IS NOT NULL),
            AVG(processing_time) FILTER (WHERE processing_time IS NOT NULL),
            (julianday(MAX(timestamp)) - julianday(MIN(timestamp))) * 24 * 60
         FROM messages
         WHERE conversation_id = ?1",
        params![conversation_id],
        |row| {
            Ok(ConversationStats {
                total_messages: row.get(0)?,
                user_messages: row.get(1)?,
                assistant_messages: row.get(2)?,
                avg_tokens_per_message: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                total_tokens_consumed: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                avg_confidence_score: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                avg_response_time: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                duration_minutes: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
            })
        },
    )
}

/// Close a conversation. Idempotent: closing a closed conversation is a no-op.
pub fn close_conversation_sync(conn: &Connection, conversation_id: &str) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE conversations
         SET status = 'closed', closed_at = datetime('now'), updated_at = datetime('now')
         WHERE id = ?1 AND status != 'closed'",
        params![conversation_id],
    )?;
    Ok(updated > 0)
}

/// Shallow-merge a patch into the conversation's context JSON.
pub fn update_context_sync(
    conn: &Connection,
    conversation_id: &str,
    patch: &Value,
) -> Result<bool> {
    immediate_tx(conn, |conn| {
        let current: Option<String> = conn
            .query_row(
                "SELECT context FROM conversations WHERE id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some(raw) = current else {
            return Ok(false);
        };

        let mut context = parse_json_column(Some(raw), json!({}));
        if let (Some(obj), Some(updates)) = (context.as_object_mut(), patch.as_object()) {
            for (key, value) in updates {
                obj.insert(key.clone(), value.clone());
            }
        }

        conn.execute(
            "UPDATE conversations SET context = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![context.to_string(), conversation_id],
        )?;
        Ok(true)
    })
}

/// Delete closed conversations older than the retention threshold.
pub fn cleanup_old_sync(conn: &Connection, retention_days: u32) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM conversations
         WHERE status = 'closed' AND closed_at < datetime('now', ?1)",
        params![format!("-{} days", retention_days)],
    )
}

/// A user's conversations, newest first, with message counts.
pub fn get_user_conversations_sync(
    conn: &Connection,
    user_id: &str,
    tenant_id: &str,
    application_id: &str,
    limit: usize,
    status: Option<&str>,
) -> rusqlite::Result<Vec<Value>> {
    let filter = if status.is_some() {
        " AND status = ?4"
    } else {
        ""
    };
    let sql = format!(
        "SELECT id, status, channel, language, pack_level,
                created_at, updated_at, closed_at,
                (SELECT COUNT(*) FROM messages WHERE conversation_id = conversations.id)
         FROM conversations
         WHERE user_id = ?1 AND tenant_id = ?2 AND application_id = ?3{filter}
         ORDER BY updated_at DESC
         LIMIT {limit}"
    );
    let mut stmt = conn.prepare(&sql)?;

    let map_row = |row: &Row| -> rusqlite::Result<Value> {
        Ok(json!({
            "id": row.get::<_, String>(0)?,
            "status": row.get::<_, String>(1)?,
            "channel": row.get::<_, String>(2)?,
            "language": row.get::<_, String>(3)?,
            "pack_level": row.get::<_, String>(4)?,
            "created_at": row.get::<_, String>(5)?,
            "updated_at": row.get::<_, String>(6)?,
            "closed_at": row.get::<_, Option<String>>(7)?,
            "message_count": row.get::<_, i64>(8)?,
        }))
    };

    let rows = match status {
        Some(s) => stmt.query_map(params![user_id, tenant_id, application_id, s], map_row)?,
        None => stmt.query_map(params![user_id, tenant_id, application_id], map_row)?,
    };
    rows.collect()
}

/// Historical stats for one user over the last 30 days (context builder).
pub fn user_profile_stats_sync(
    conn: &Connection,
    user_id: &str,
) -> rusqlite::Result<(i64, i64, Option<String>, f64)> {
    conn.query_row(
        "SELECT
            COUNT(*),
            COUNT(*) FILTER (WHERE status = 'escalated'),
            MAX(created_at),
            AVG((julianday(updated_at) - julianday(created_at)) * 86400)
         FROM conversations
         WHERE user_id = ?1 AND created_at > datetime('now', '-30 days')",
        params![user_id],
        |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
            ))
        },
    )
}

/// Conversation totals for the metrics surface.
pub fn activity_stats_sync(
    conn: &Connection,
    tenant_id: Option<&str>,
    application_id: Option<&str>,
    hours: u32,
) -> rusqlite::Result<Value> {
    let mut filter = String::new();
    let mut bind: Vec<String> = vec![format!("-{} hours", hours)];
    if let Some(t) = tenant_id {
        filter.push_str(&format!(" AND tenant_id = ?{}", bind.len() + 1));
        bind.push(t.to_string());
    }
    if let Some(a) = application_id {
        filter.push_str(&format!(" AND application_id = ?{}", bind.len() + 1));
        bind.push(a.to_string());
    }

    let sql = format!(
        "SELECT
            COUNT(*),
            COUNT(*) FILTER (WHERE status = 'active'),
            COUNT(*) FILTER (WHERE status = 'closed'),
            COUNT(*) FILTER (WHERE status = 'escalated'),
            AVG((julianday(COALESCE(closed_at, datetime('now'))) - julianday(created_at)) * 24 * 60),
            COUNT(DISTINCT user_id),
            COUNT(DISTINCT tenant_id)
         FROM conversations
         WHERE created_at > datetime('now', ?1){filter}"
    );

    conn.query_row(
        &sql,
        rusqlite::params_from_iter(bind.iter()),
        |row| {
            Ok(json!({
                "period_hours": hours,
                "total_conversations": row.get::<_, i64>(0)?,
                "active_conversations": row.get::<_, i64>(1)?,
                "closed_conversations": row.get::<_, i64>(2)?,
                "escalated_conversations": row.get::<_, i64>(3)?,
                "avg_duration_minutes": row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                "unique_users": row.get::<_, i64>(5)?,
                "unique_tenants": row.get::<_, i64>(6)?,
            }))
        },
    )
}

/// Active conversation counts per tenant (30-minute activity window),
/// feeding the active-conversations gauge.
pub fn active_by_tenant_sync(conn: &Connection) -> rusqlite::Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT tenant_id, COUNT(*) FROM conversations
         WHERE status = 'active' AND updated_at > datetime('now', '-30 minutes')
         GROUP BY tenant_id",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::ensure_sqlite_vec_registered;
    use crate::db::schema::run_all_migrations;

    fn test_conn() -> Connection {
        ensure_sqlite_vec_registered();
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn, 384).unwrap();
        conn
    }

    fn new_conversation(conn: &Connection) -> String {
        let (id, created) = get_or_create_conversation_sync(
            conn,
            "u1",
            "t_ci",
            "mobile_money",
            "mobile",
            "fr",
            "basic",
            &json!({"pack_level": "basic"}),
        )
        .unwrap();
        assert!(created);
        id
    }

    #[test]
    fn test_get_or_create_reuses_active_conversation() {
        let conn = test_conn();
        let first = new_conversation(&conn);

        let (second, created) = get_or_create_conversation_sync(
            &conn,
            "u1",
            "t_ci",
            "mobile_money",
            "mobile",
            "fr",
            "basic",
            &json!({}),
        )
        .unwrap();
        assert!(!created);
        assert_eq!(first, second);
    }

    #[test]
    fn test_get_or_create_new_session_for_other_user() {
        let conn = test_conn();
        let first = new_conversation(&conn);

        let (second, created) = get_or_create_conversation_sync(
            &conn,
            "u2",
            "t_ci",
            "mobile_money",
            "mobile",
            "fr",
            "basic",
            &json!({}),
        )
        .unwrap();
        assert!(created);
        assert_ne!(first, second);
    }

    #[test]
    fn test_idle_window_expiry_creates_new_session() {
        let conn = test_conn();
        let first = new_conversation(&conn);

        // Age the session exactly to the boundary: the strict `>` comparison
        // must treat it as expired.
        conn.execute(
            "UPDATE conversations SET updated_at = datetime('now', '-30 minutes') WHERE id = ?1",
            params![first],
        )
        .unwrap();

        let (second, created) = get_or_create_conversation_sync(
            &conn,
            "u1",
            "t_ci",
            "mobile_money",
            "mobile",
            "fr",
            "basic",
            &json!({}),
        )
        .unwrap();
        assert!(created);
        assert_ne!(first, second);
    }

    #[test]
    fn test_add_message_and_history_order() {
        let conn = test_conn();
        let conv = new_conversation(&conn);

        add_message_sync(&conn, &conv, "user", "Bonjour", &NewMessage::default()).unwrap();
        add_message_sync(
            &conn,
            &conv,
            "assistant",
            "Bonjour !",
            &NewMessage {
                agent_used: Some("general_assistant".into()),
                tokens_consumed: 42,
                confidence_score: Some(0.85),
                ..Default::default()
            },
        )
        .unwrap();
        add_message_sync(&conn, &conv, "system", "note", &NewMessage::default()).unwrap();

        let history = get_history_sync(&conn, &conv, 50, false).unwrap();
        assert_eq!(history.len(), 2, "system messages excluded by default");
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].role, "assistant");
        assert_eq!(history[1].agent_used.as_deref(), Some("general_assistant"));
        assert!(history[0].timestamp <= history[1].timestamp);

        let full = get_history_sync(&conn, &conv, 50, true).unwrap();
        assert_eq!(full.len(), 3);
    }

    #[test]
    fn test_add_message_unknown_conversation_fails() {
        let conn = test_conn();
        let err = add_message_sync(&conn, "missing", "user", "hi", &NewMessage::default());
        assert!(err.is_err());
    }

    #[test]
    fn test_stats_aggregation() {
        let conn = test_conn();
        let conv = new_conversation(&conn);

        add_message_sync(&conn, &conv, "user", "q", &NewMessage::default()).unwrap();
        add_message_sync(
            &conn,
            &conv,
            "assistant",
            "a",
            &NewMessage {
                tokens_consumed: 100,
                confidence_score: Some(0.8),
                processing_time: Some(1.5),
                ..Default::default()
            },
        )
        .unwrap();

        let stats = get_stats_sync(&conn, &conv).unwrap();
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.user_messages, 1);
        assert_eq!(stats.assistant_messages, 1);
        assert_eq!(stats.total_tokens_consumed, 100);
        assert!((stats.avg_tokens_per_message - 100.0).abs() < f64::EPSILON);
        assert!((stats.avg_confidence_score - 0.8).abs() < 1e-9);
        assert!((stats.avg_response_time - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_close_conversation_idempotent() {
        let conn = test_conn();
        let conv = new_conversation(&conn);

        assert!(close_conversation_sync(&conn, &conv).unwrap());
        assert!(!close_conversation_sync(&conn, &conv).unwrap());

        let row = get_conversation_sync(&conn, &conv).unwrap().unwrap();
        assert_eq!(row.status, "closed");
        assert!(row.closed_at.is_some());
    }

    #[test]
    fn test_update_context_shallow_merge() {
        let conn = test_conn();
        let conv = new_conversation(&conn);

        assert!(update_context_sync(&conn, &conv, &json!({"failed_attempts": 2})).unwrap());
        assert!(update_context_sync(&conn, &conv, &json!({"intent": "balance"})).unwrap());

        let row = get_conversation_sync(&conn, &conv).unwrap().unwrap();
        assert_eq!(row.context["failed_attempts"], json!(2));
        assert_eq!(row.context["intent"], json!("balance"));
        // Keys from creation survive the merges
        assert_eq!(row.context["language"], json!("fr"));

        assert!(!update_context_sync(&conn, "missing", &json!({})).unwrap());
    }

    #[test]
    fn test_cleanup_old_conversations() {
        let conn = test_conn();
        let conv = new_conversation(&conn);
        close_conversation_sync(&conn, &conv).unwrap();
        conn.execute(
            "UPDATE conversations SET closed_at = datetime('now', '-120 days') WHERE id = ?1",
            params![conv],
        )
        .unwrap();

        let deleted = cleanup_old_sync(&conn, 90).unwrap();
        assert_eq!(deleted, 1);
        assert!(get_conversation_sync(&conn, &conv).unwrap().is_none());
    }

    #[test]
    fn test_user_conversations_listing() {
        let conn = test_conn();
        let conv = new_conversation(&conn);
        add_message_sync(&conn, &conv, "user", "hi", &NewMessage::default()).unwrap();

        let list =
            get_user_conversations_sync(&conn, "u1", "t_ci", "mobile_money", 10, None).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["message_count"], json!(1));

        let closed =
            get_user_conversations_sync(&conn, "u1", "t_ci", "mobile_money", 10, Some("closed"))
                .unwrap();
        assert!(closed.is_empty());
    }
}
