// crates/axelis-server/src/knowledge/mod.rs
// Per-tenant knowledge retrieval store
//
// Wraps the collection tables with embedding generation and deterministic
// record identifiers. The ingestion pipeline itself (document segmentation,
// metadata extraction) runs out-of-band; it hands finished records to
// `upsert`.

use std::sync::Arc;

use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::db::{DatabasePool, knowledge as db};
use crate::embeddings::EmbeddingClient;
use crate::error::{AxelisError, Result};

/// One record handed to the store by the ingestion collaborator.
#[derive(Debug, Clone)]
pub struct KnowledgeRecord {
    /// Originating document (file name, URL, ...)
    pub source: String,
    /// Position of this chunk within the source
    pub chunk_index: usize,
    pub content: String,
    /// Category, language, content-type, extracted entities, ...
    pub metadata: Value,
}

impl KnowledgeRecord {
    /// Deterministic identifier: `source:chunk:content-hash`. Re-ingesting
    /// the same source yields identical ids, so upserts are idempotent.
    pub fn record_id(&self) -> String {
        let digest = Sha256::digest(self.content.as_bytes());
        let hash_prefix: String = digest
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect();
        format!("{}:{}:{}", self.source, self.chunk_index, hash_prefix)
    }
}

/// One search hit.
#[derive(Debug, Clone)]
pub struct KnowledgeHit {
    pub content: String,
    pub metadata: Value,
    /// `1 - normalized_distance`, in `[0, 1]`
    pub relevance: f64,
}

/// Tenant-isolated retrieval store over sqlite-vec collections.
pub struct KnowledgeStore {
    pool: Arc<DatabasePool>,
    embeddings: Arc<EmbeddingClient>,
}

impl KnowledgeStore {
    pub fn new(pool: Arc<DatabasePool>, embeddings: Arc<EmbeddingClient>) -> Self {
        Self { pool, embeddings }
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingClient> {
        &self.embeddings
    }

    /// Upsert a batch of records into the tenant's collection. Each record's
    /// metadata is stamped with the owning application and tenant before the
    /// write.
    pub async fn upsert(
        &self,
        application: &str,
        tenant_id: &str,
        records: Vec<KnowledgeRecord>,
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        let vectors = self
            .embeddings
            .embed_documents(&texts)
            .await
            .map_err(|e| AxelisError::Embedding(e.to_string()))?;
        if vectors.len() != records.len() {
            return Err(AxelisError::Embedding(format!(
                "expected {} embeddings, got {}",
                records.len(),
                vectors.len()
            )));
        }

        let count = records.len();
        let application_owned = application.to_string();
        let tenant_owned = tenant_id.to_string();

        self.pool
            .run_with_retry(move |conn| -> Result<()> {
                let application = application_owned.clone();
                let tenant = tenant_owned.clone();
                let collection_id = db::ensure_collection_sync(conn, &application, &tenant)?;
                for (record, vector) in records.iter().zip(vectors.iter()) {
                    let mut metadata = record.metadata.clone();
                    if let Some(obj) = metadata.as_object_mut() {
                        obj.insert("application".into(), json!(application));
                        obj.insert("tenant_id".into(), json!(tenant));
                        obj.insert(
                            "ingested_at".into(),
                            json!(chrono::Utc::now().to_rfc3339()),
                        );
                        obj.insert("source".into(), json!(record.source));
                        obj.insert("chunk_index".into(), json!(record.chunk_index));
                    }
                    db::upsert_record_sync(
                        conn,
                        collection_id,
                        &record.record_id(),
                        &record.content,
                        &metadata,
                        vector,
                    )?;
                }
                Ok(())
            })
            .await?;

        info!(application, tenant_id, count, "Knowledge records upserted");
        Ok(count)
    }

    /// Semantic query within one tenant's collection. `category` applies an
    /// in-memory post-filter on record metadata.
    pub async fn query(
        &self,
        application: &str,
        tenant_id: &str,
        text: &str,
        k: usize,
        category: Option<&str>,
    ) -> Result<Vec<KnowledgeHit>> {
        let query_vector = self
            .embeddings
            .embed_query(text)
            .await
            .map_err(|e| AxelisError::Embedding(e.to_string()))?;

        let application = application.to_string();
        let tenant = tenant_id.to_string();
        let raw = self
            .pool
            .run(move |conn| -> Result<Vec<(String, Value, f64)>> {
                let collection_id = db::ensure_collection_sync(conn, &application, &tenant)?;
                Ok(db::query_records_sync(conn, collection_id, &query_vector, k)?)
            })
            .await?;

        let hits = raw
            .into_iter()
            .map(|(content, metadata, distance)| KnowledgeHit {
                content,
                metadata,
                // Cosine distance lives in [0, 2]; halve it so relevance
                // lands in [0, 1].
                relevance: (1.0 - distance / 2.0).clamp(0.0, 1.0),
            })
            .filter(|hit| match category {
                Some(cat) => hit.metadata.get("category").and_then(|c| c.as_str()) == Some(cat),
                None => true,
            })
            .collect();

        Ok(hits)
    }

    /// Collection statistics: `{name, count, metadata}`.
    pub async fn stats(&self, application: &str, tenant_id: &str) -> Result<Value> {
        let name = db::collection_name(application, tenant_id);
        let application = application.to_string();
        let tenant = tenant_id.to_string();

        let (count, metadata) = self
            .pool
            .run(move |conn| -> Result<(i64, Value)> {
                let collection_id = db::ensure_collection_sync(conn, &application, &tenant)?;
                let count = db::count_records_sync(conn, collection_id)?;
                let metadata = db::collection_metadata_sync(conn, collection_id)?;
                Ok((count, metadata))
            })
            .await?;

        Ok(json!({
            "name": name,
            "count": count,
            "metadata": metadata,
        }))
    }
}
