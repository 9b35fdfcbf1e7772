// db/knowledge.rs
// Knowledge collection storage (sync versions for pool.interact)
//
// One logical collection per (application, tenant) pair. Every query path
// is keyed by a collection id resolved from that pair, so records of one
// tenant can never surface in another tenant's results.

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};

use super::immediate_tx;
use crate::error::Result;

/// Derived, stable collection name for a tenant's knowledge base.
pub fn collection_name(application_id: &str, tenant_id: &str) -> String {
    format!("{application_id}_{tenant_id}")
}

/// Resolve the collection for `(application, tenant)`, creating it on first
/// use. Returns the collection rowid.
pub fn ensure_collection_sync(
    conn: &Connection,
    application_id: &str,
    tenant_id: &str,
) -> rusqlite::Result<i64> {
    let name = collection_name(application_id, tenant_id);

    if let Some(id) = conn
        .query_row(
            "SELECT id FROM knowledge_collections WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?
    {
        return Ok(id);
    }

    let metadata = json!({
        "application": application_id,
        "tenant_id": tenant_id,
    });
    conn.execute(
        "INSERT INTO knowledge_collections (name, application_id, tenant_id, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))
         ON CONFLICT(name) DO NOTHING",
        params![name, application_id, tenant_id, metadata.to_string()],
    )?;

    conn.query_row(
        "SELECT id FROM knowledge_collections WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
}

/// Insert or replace one record and its embedding. Idempotent by record id:
/// re-ingesting the same id replaces content, metadata and vector in place.
pub fn upsert_record_sync(
    conn: &Connection,
    collection_id: i64,
    record_id: &str,
    content: &str,
    metadata: &Value,
    embedding: &[f32],
) -> Result<()> {
    immediate_tx(conn, |conn| {
        conn.execute(
            "INSERT INTO knowledge_records (collection_id, record_id, content, metadata, ingested_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))
             ON CONFLICT(collection_id, record_id) DO UPDATE SET
                content = excluded.content,
                metadata = excluded.metadata,
                ingested_at = excluded.ingested_at",
            params![collection_id, record_id, content, metadata.to_string()],
        )?;

        let rowid: i64 = conn.query_row(
            "SELECT id FROM knowledge_records WHERE collection_id = ?1 AND record_id = ?2",
            params![collection_id, record_id],
            |row| row.get(0),
        )?;

        // The vec row shares the record's rowid so replacement is a plain
        // delete-by-rowid (vec0 tables cannot be updated in place).
        let embedding_bytes: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
        conn.execute(
            "DELETE FROM vec_knowledge WHERE rowid = ?1",
            params![rowid],
        )?;
        conn.execute(
            "INSERT INTO vec_knowledge (rowid, embedding, record_rowid, collection_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![rowid, embedding_bytes, rowid, collection_id],
        )?;

        Ok(())
    })
}

/// Nearest records to the query embedding within one collection.
/// Returns `(content, metadata, cosine_distance)` ordered by distance.
pub fn query_records_sync(
    conn: &Connection,
    collection_id: i64,
    query_embedding: &[f32],
    k: usize,
) -> rusqlite::Result<Vec<(String, Value, f64)>> {
    let embedding_bytes: Vec<u8> = query_embedding
        .iter()
        .flat_map(|f| f.to_le_bytes())
        .collect();

    let mut stmt = conn.prepare(
        "SELECT r.content, r.metadata, vec_distance_cosine(v.embedding, ?2) AS distance
         FROM vec_knowledge v
         JOIN knowledge_records r ON r.id = v.record_rowid
         WHERE v.collection_id = ?1
         ORDER BY distance ASC
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(
        params![collection_id, embedding_bytes, k as i64],
        |row| {
            let metadata_raw: Option<String> = row.get(1)?;
            let metadata = metadata_raw
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_else(|| json!({}));
            Ok((row.get(0)?, metadata, row.get(2)?))
        },
    )?;
    rows.collect()
}

/// Record count for one collection.
pub fn count_records_sync(conn: &Connection, collection_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM knowledge_records WHERE collection_id = ?1",
        params![collection_id],
        |row| row.get(0),
    )
}

/// Collection metadata (for the stats view).
pub fn collection_metadata_sync(
    conn: &Connection,
    collection_id: i64,
) -> rusqlite::Result<Value> {
    let raw: Option<String> = conn.query_row(
        "SELECT metadata FROM knowledge_collections WHERE id = ?1",
        params![collection_id],
        |row| row.get(0),
    )?;
    Ok(raw
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_else(|| json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::ensure_sqlite_vec_registered;
    use crate::db::schema::run_all_migrations;

    fn test_conn() -> Connection {
        ensure_sqlite_vec_registered();
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn, 4).unwrap();
        conn
    }

    #[test]
    fn test_collection_name_derivation() {
        assert_eq!(collection_name("mobile_money", "t_ci"), "mobile_money_t_ci");
    }

    #[test]
    fn test_ensure_collection_is_stable() {
        let conn = test_conn();
        let a = ensure_collection_sync(&conn, "mobile_money", "t_ci").unwrap();
        let b = ensure_collection_sync(&conn, "mobile_money", "t_ci").unwrap();
        assert_eq!(a, b);

        let other = ensure_collection_sync(&conn, "mobile_money", "t_bf").unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let conn = test_conn();
        let coll = ensure_collection_sync(&conn, "mobile_money", "t_ci").unwrap();

        let vector = [1.0, 0.0, 0.0, 0.0];
        upsert_record_sync(&conn, coll, "faq:0:abc", "v1", &json!({}), &vector).unwrap();
        upsert_record_sync(&conn, coll, "faq:0:abc", "v2", &json!({}), &vector).unwrap();

        assert_eq!(count_records_sync(&conn, coll).unwrap(), 1);

        let hits = query_records_sync(&conn, coll, &vector, 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "v2");

        // Exactly one vector row survives the replacement
        let vec_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM vec_knowledge WHERE collection_id = ?1",
                params![coll],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(vec_count, 1);
    }

    #[test]
    fn test_queries_never_cross_collections() {
        let conn = test_conn();
        let ci = ensure_collection_sync(&conn, "mobile_money", "t_ci").unwrap();
        let bf = ensure_collection_sync(&conn, "mobile_money", "t_bf").unwrap();

        let vector = [0.0, 1.0, 0.0, 0.0];
        upsert_record_sync(&conn, ci, "r1", "ci doc", &json!({"tenant_id": "t_ci"}), &vector)
            .unwrap();
        upsert_record_sync(&conn, bf, "r1", "bf doc", &json!({"tenant_id": "t_bf"}), &vector)
            .unwrap();

        let hits = query_records_sync(&conn, ci, &vector, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "ci doc");
        assert_eq!(hits[0].1["tenant_id"], json!("t_ci"));
    }

    #[test]
    fn test_query_orders_by_distance() {
        let conn = test_conn();
        let coll = ensure_collection_sync(&conn, "mobile_money", "t_ci").unwrap();

        upsert_record_sync(&conn, coll, "a", "close", &json!({}), &[1.0, 0.0, 0.0, 0.0]).unwrap();
        upsert_record_sync(&conn, coll, "b", "far", &json!({}), &[0.0, 1.0, 0.0, 0.0]).unwrap();

        let hits = query_records_sync(&conn, coll, &[1.0, 0.1, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].0, "close");
        assert!(hits[0].2 < hits[1].2);
    }
}
