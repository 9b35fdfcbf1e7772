// db/schema.rs
// Database schema and migrations

use anyhow::Result;
use rusqlite::Connection;

/// Base tables. Indexes are created by separate statements below —
/// SQLite does not accept inline INDEX clauses inside CREATE TABLE.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    application_id TEXT NOT NULL,
    pack_level TEXT NOT NULL,
    channel TEXT NOT NULL DEFAULT 'mobile',
    status TEXT NOT NULL DEFAULT 'active'
        CHECK (status IN ('active', 'escalated', 'closed')),
    language TEXT NOT NULL DEFAULT 'fr',
    context TEXT NOT NULL DEFAULT '{}',
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    closed_at TEXT
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
    content TEXT NOT NULL,
    agent_used TEXT,
    tools_used TEXT NOT NULL DEFAULT '[]',
    tokens_consumed INTEGER NOT NULL DEFAULT 0,
    confidence_score REAL,
    processing_time REAL,
    metadata TEXT NOT NULL DEFAULT '{}',
    timestamp TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS escalations (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    reason TEXT NOT NULL,
    escalation_type TEXT NOT NULL DEFAULT 'human_agent',
    priority TEXT NOT NULL DEFAULT 'medium'
        CHECK (priority IN ('low', 'medium', 'high', 'urgent')),
    assigned_to TEXT,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'in_progress', 'resolved', 'cancelled')),
    context TEXT NOT NULL DEFAULT '{}',
    escalated_at TEXT NOT NULL DEFAULT (datetime('now')),
    resolved_at TEXT,
    resolution_notes TEXT
);

CREATE TABLE IF NOT EXISTS human_agents (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT,
    specialties TEXT NOT NULL DEFAULT '[]',
    languages TEXT NOT NULL DEFAULT '["fr"]',
    status TEXT NOT NULL DEFAULT 'offline'
        CHECK (status IN ('available', 'busy', 'offline')),
    current_load INTEGER NOT NULL DEFAULT 0,
    max_concurrent INTEGER NOT NULL DEFAULT 1,
    last_activity TEXT
);

CREATE TABLE IF NOT EXISTS knowledge_collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    application_id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS knowledge_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection_id INTEGER NOT NULL REFERENCES knowledge_collections(id) ON DELETE CASCADE,
    record_id TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    ingested_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (collection_id, record_id)
);
"#;

/// Indexes, split out as separate statements.
const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_conversations_user_tenant
    ON conversations (user_id, tenant_id, application_id);
CREATE INDEX IF NOT EXISTS idx_conversations_status ON conversations (status);
CREATE INDEX IF NOT EXISTS idx_conversations_created ON conversations (created_at);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages (conversation_id);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages (timestamp);
CREATE INDEX IF NOT EXISTS idx_messages_role ON messages (role);
CREATE INDEX IF NOT EXISTS idx_escalations_conversation ON escalations (conversation_id);
CREATE INDEX IF NOT EXISTS idx_escalations_status ON escalations (status);
CREATE INDEX IF NOT EXISTS idx_escalations_priority ON escalations (priority);
CREATE INDEX IF NOT EXISTS idx_escalations_assigned ON escalations (assigned_to);
CREATE INDEX IF NOT EXISTS idx_human_agents_status ON human_agents (status);
CREATE INDEX IF NOT EXISTS idx_knowledge_records_collection
    ON knowledge_records (collection_id);
"#;

/// Run all schema setup and migrations.
///
/// Called during pool initialization. Idempotent - existing tables and
/// columns are left alone, and the vector table is only rebuilt when the
/// embedding dimension changed.
pub fn run_all_migrations(conn: &Connection, embedding_dim: usize) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    conn.execute_batch(INDEXES)?;
    migrate_vec_knowledge(conn, embedding_dim)?;
    Ok(())
}

/// Create or rebuild the knowledge vector table.
///
/// Virtual tables can't be altered, so a dimension change (e.g. a different
/// embedding provider after a restart) drops and recreates the table; the
/// vectors are regenerated on the next ingestion pass.
fn migrate_vec_knowledge(conn: &Connection, embedding_dim: usize) -> Result<()> {
    let exists: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='vec_knowledge'",
            [],
            |_| Ok(true),
        )
        .unwrap_or(false);

    if exists {
        let current_dim: Result<i64, _> = conn.query_row(
            "SELECT vector_column_size FROM vec_knowledge_info
             WHERE vector_column_name = 'embedding'",
            [],
            |row| row.get(0),
        );

        match current_dim {
            Ok(dim) if dim as usize == embedding_dim => return Ok(()),
            Ok(dim) => {
                tracing::info!(
                    "Rebuilding vec_knowledge: dimension changed {} -> {}",
                    dim,
                    embedding_dim
                );
                conn.execute("DROP TABLE IF EXISTS vec_knowledge", [])?;
            }
            Err(_) => {
                // Info table unreadable; rebuild to be safe
                conn.execute("DROP TABLE IF EXISTS vec_knowledge", [])?;
            }
        }
    }

    conn.execute(
        &format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_knowledge USING vec0(
                embedding float[{embedding_dim}],
                +record_rowid INTEGER,
                +collection_id INTEGER
            )"
        ),
        [],
    )?;

    Ok(())
}
