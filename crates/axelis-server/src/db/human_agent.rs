// db/human_agent.rs
// Human-agent registry operations (sync versions for pool.interact)

use rusqlite::{Connection, Row, params};

use super::immediate_tx;
use super::types::{HumanAgentRow, parse_string_array};
use crate::error::Result;

fn parse_agent_row(row: &Row) -> rusqlite::Result<HumanAgentRow> {
    Ok(HumanAgentRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        specialties: parse_string_array(row.get(3)?),
        languages: parse_string_array(row.get(4)?),
        status: row.get(5)?,
        current_load: row.get(6)?,
        max_concurrent: row.get(7)?,
        last_activity: row.get(8)?,
    })
}

const AGENT_COLUMNS: &str =
    "id, name, email, specialties, languages, status, current_load, max_concurrent, last_activity";

/// Register or refresh a human agent. `current_load` is preserved on update.
pub fn upsert_agent_sync(
    conn: &Connection,
    id: &str,
    name: &str,
    email: Option<&str>,
    specialties: &[String],
    languages: &[String],
    status: &str,
    max_concurrent: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO human_agents (
            id, name, email, specialties, languages,
            status, current_load, max_concurrent, last_activity
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            email = excluded.email,
            specialties = excluded.specialties,
            languages = excluded.languages,
            status = excluded.status,
            max_concurrent = excluded.max_concurrent",
        params![
            id,
            name,
            email,
            serde_json::to_string(specialties)?,
            serde_json::to_string(languages)?,
            status,
            max_concurrent,
        ],
    )?;
    Ok(())
}

/// Ranked candidates for an escalation, top 5.
///
/// Only available agents with spare capacity; must speak the user language
/// or the default `fr` as a last resort. Ranked by exact-specialty match,
/// availability score, then recency of activity.
fn ranked_candidates_sync(
    conn: &Connection,
    required_expertise: &str,
    user_language: &str,
) -> rusqlite::Result<Vec<(HumanAgentRow, bool)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {AGENT_COLUMNS},
            EXISTS(SELECT 1 FROM json_each(specialties) WHERE json_each.value = ?2) AS has_expertise,
            CASE WHEN current_load = 0 THEN 1.0
                 ELSE CAST(max_concurrent - current_load AS REAL) / max_concurrent
            END AS availability_score
         FROM human_agents
         WHERE status = 'available'
           AND current_load < max_concurrent
           AND (EXISTS(SELECT 1 FROM json_each(languages) WHERE json_each.value = ?1)
                OR EXISTS(SELECT 1 FROM json_each(languages) WHERE json_each.value = 'fr'))
         ORDER BY has_expertise DESC, availability_score DESC, last_activity DESC
         LIMIT 5"
    ))?;
    let rows = stmt.query_map(params![user_language, required_expertise], |row| {
        let agent = parse_agent_row(row)?;
        let has_expertise: bool = row.get::<_, i64>(9)? != 0;
        Ok((agent, has_expertise))
    })?;
    rows.collect()
}

/// Pick the best available agent and claim one slot of its capacity.
///
/// Selection and the load increment happen in the same BEGIN IMMEDIATE
/// transaction, so two concurrent escalations cannot both take an agent's
/// last slot. Returns `None` when nobody qualifies.
pub fn find_and_claim_agent_sync(
    conn: &Connection,
    required_expertise: &str,
    user_language: &str,
) -> Result<Option<HumanAgentRow>> {
    immediate_tx(conn, |conn| {
        let candidates = ranked_candidates_sync(conn, required_expertise, user_language)?;
        if candidates.is_empty() {
            return Ok(None);
        }

        // First candidate with the exact specialty, else the best-ranked.
        let chosen = candidates
            .iter()
            .find(|(agent, has_expertise)| *has_expertise && agent.languages.iter().any(|l| l == user_language))
            .or_else(|| candidates.iter().find(|(_, has_expertise)| *has_expertise))
            .map(|(agent, _)| agent)
            .unwrap_or(&candidates[0].0)
            .clone();

        conn.execute(
            "UPDATE human_agents
             SET current_load = current_load + 1, last_activity = datetime('now')
             WHERE id = ?1",
            params![chosen.id],
        )?;

        Ok(Some(chosen))
    })
}

/// Release one slot of an agent's capacity, clamping at zero.
pub fn release_agent_sync(conn: &Connection, agent_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE human_agents
         SET current_load = MAX(0, current_load - 1), last_activity = datetime('now')
         WHERE id = ?1",
        params![agent_id],
    )?;
    Ok(())
}

/// Fetch one agent's registry row.
pub fn get_agent_sync(
    conn: &Connection,
    agent_id: &str,
) -> rusqlite::Result<Option<HumanAgentRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {AGENT_COLUMNS} FROM human_agents WHERE id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![agent_id], parse_agent_row)?;
    rows.next().transpose()
}

/// All currently available agents, least loaded first.
pub fn list_available_sync(conn: &Connection) -> rusqlite::Result<Vec<HumanAgentRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {AGENT_COLUMNS} FROM human_agents
         WHERE status = 'available'
         ORDER BY current_load ASC, name ASC"
    ))?;
    let rows = stmt.query_map([], parse_agent_row)?;
    rows.collect()
}

/// Recompute every agent's `current_load` from its open escalation
/// assignments. Crash recovery: counters drift when the process dies between
/// a claim and its escalation insert; this restores the invariant.
pub fn reconcile_loads_sync(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE human_agents
         SET current_load = (
            SELECT COUNT(*) FROM escalations
            WHERE escalations.assigned_to = human_agents.id
              AND escalations.status IN ('pending', 'in_progress')
         )",
        [],
    )
}
