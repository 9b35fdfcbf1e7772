// crates/axelis-server/src/db/mod.rs
// Database layer: pooled SQLite access plus per-table sync helpers.
//
// Pattern: each table module exposes sync `*_sync` functions taking a
// `&rusqlite::Connection`; callers go through `DatabasePool::interact` /
// `DatabasePool::run` so the closure executes on a blocking thread and
// never stalls the async runtime.

pub mod conversation;
pub mod escalation;
pub mod human_agent;
pub mod knowledge;
pub mod pool;
pub mod schema;
pub mod types;

pub use pool::DatabasePool;
pub use types::{
    ConversationRow, ConversationStats, EscalationRow, HumanAgentRow, MessageRow, NewMessage,
};

use crate::error::Result;
use rusqlite::Connection;

/// Run `f` inside a `BEGIN IMMEDIATE` transaction.
///
/// IMMEDIATE takes the write lock up front, so two concurrent callers
/// serialize at BEGIN instead of failing later at the first write. This is
/// what makes `get_or_create_conversation` and the agent claim race-safe.
pub fn immediate_tx<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}
