// db/pool.rs
// Async connection pool using deadpool-sqlite
//
// Use `pool.run()` for request handlers (converts errors to `AxelisError`)
// and `pool.interact()` for migrations, background tasks and internal
// helpers that want `anyhow::Result`. Closures run on a blocking thread
// pool, so they never block the async runtime. In-memory pools use a
// shared-cache URI so every pooled connection sees the same database —
// required for tests.

use crate::error::AxelisError;
use anyhow::{Context, Result};
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::{Path, PathBuf};
use std::sync::Once;

/// Registers sqlite-vec extension globally (once per process).
/// Must be called before any SQLite connections are opened.
static SQLITE_VEC_INIT: Once = Once::new();

#[allow(clippy::missing_transmute_annotations)]
pub(crate) fn ensure_sqlite_vec_registered() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: sqlite3_vec_init has the signature expected by
        // sqlite3_auto_extension; the fn pointer stays valid for the whole
        // process since it points to a statically-linked symbol.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec extension registered globally");
    });
}

/// Check if a rusqlite error is SQLITE_BUSY or SQLITE_LOCKED.
///
/// SQLITE_BUSY ("database is locked") occurs with file-based databases under
/// write contention. SQLITE_LOCKED occurs with shared-cache in-memory
/// databases when another connection holds a write lock on the same table.
fn is_rusqlite_contention(err: &rusqlite::Error) -> bool {
    use rusqlite::ffi;
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ffi::ErrorCode::DatabaseBusy | ffi::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

/// Check if an AxelisError wraps a SQLite contention error.
fn is_axelis_contention(err: &AxelisError) -> bool {
    match err {
        AxelisError::Db(rusqlite_err) => is_rusqlite_contention(rusqlite_err),
        _ => false,
    }
}

/// Check if an anyhow::Error chain contains a SQLite contention error.
fn is_sqlite_contention(err: &anyhow::Error) -> bool {
    if let Some(rusqlite_err) = err.downcast_ref::<rusqlite::Error>() {
        return is_rusqlite_contention(rusqlite_err);
    }
    if let Some(axelis_err) = err.downcast_ref::<AxelisError>() {
        return is_axelis_contention(axelis_err);
    }
    false
}

/// Retry delays for SQLite contention backoff (100ms, 500ms, 2s).
const RETRY_DELAYS: [std::time::Duration; 3] = [
    std::time::Duration::from_millis(100),
    std::time::Duration::from_millis(500),
    std::time::Duration::from_millis(2000),
];

/// Generic retry-with-backoff for async operations that may encounter
/// SQLite contention.
async fn retry_with_backoff<F, Fut, R, E>(
    mut op: F,
    is_retryable: impl Fn(&E) -> bool,
) -> Result<R, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
    E: std::fmt::Display,
{
    for (attempt, delay) in RETRY_DELAYS.iter().enumerate() {
        match op().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if is_retryable(&e) {
                    tracing::warn!(
                        "SQLite contention on attempt {}/{}, retrying in {:?}",
                        attempt + 1,
                        RETRY_DELAYS.len(),
                        delay
                    );
                    tokio::time::sleep(*delay).await;
                } else {
                    return Err(e);
                }
            }
        }
    }

    // Final attempt (no retry after this)
    op().await
}

/// Database pool wrapper with sqlite-vec support and per-connection setup.
pub struct DatabasePool {
    pool: Pool,
    path: Option<PathBuf>,
    /// URI for in-memory databases (used to share state in tests)
    memory_uri: Option<String>,
    embedding_dim: usize,
}

/// Whether to use a file path or shared in-memory URI.
enum DbStorage {
    File(PathBuf),
    InMemory,
}

impl DatabasePool {
    /// Open a pooled database at the given path.
    ///
    /// `embedding_dim` fixes the dimension of the `vec_knowledge` virtual
    /// table; a dimension change drops and recreates it on open.
    pub async fn open(path: &Path, embedding_dim: usize) -> Result<Self> {
        Self::open_internal(DbStorage::File(path.to_path_buf()), embedding_dim).await
    }

    /// Open a pooled in-memory database (shared cache, for tests).
    pub async fn open_in_memory(embedding_dim: usize) -> Result<Self> {
        Self::open_internal(DbStorage::InMemory, embedding_dim).await
    }

    async fn open_internal(storage: DbStorage, embedding_dim: usize) -> Result<Self> {
        ensure_sqlite_vec_registered();

        let (conn_str, path, memory_uri, hook) = match storage {
            DbStorage::File(p) => {
                if let Some(parent) = p.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let s = p.to_string_lossy().to_string();
                (s, Some(p), None, make_file_post_create_hook())
            }
            DbStorage::InMemory => {
                let uri = format!(
                    "file:memdb_{:?}?mode=memory&cache=shared",
                    uuid::Uuid::new_v4()
                );
                (uri.clone(), None, Some(uri), make_memory_post_create_hook())
            }
        };

        let cfg = Config::new(&conn_str);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .context("Failed to create pool builder")?
            .max_size(10)
            .post_create(hook)
            .build()
            .context("Failed to build connection pool")?;

        let db_pool = Self {
            pool,
            path,
            memory_uri,
            embedding_dim,
        };

        db_pool.run_migrations().await?;

        Ok(db_pool)
    }

    /// Get the memory URI (for sharing state in tests)
    pub fn memory_uri(&self) -> Option<&str> {
        self.memory_uri.as_deref()
    }

    /// Get the database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Embedding dimension the vec_knowledge table was created with.
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Run a closure with a connection from the pool.
    pub async fn interact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;

        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| anyhow::anyhow!("interact failed: {e}"))?
    }

    /// Run a closure on a pooled connection, logging errors at debug but not
    /// propagating. Use for low-priority best-effort operations (metric
    /// refreshes, telemetry).
    pub async fn try_interact<F, R>(&self, label: &str, f: F) -> Option<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let label = label.to_string();
        match self.interact(move |conn| f(conn)).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!("{}: {}", label, e);
                None
            }
        }
    }

    /// Run a closure and convert errors to `AxelisError`.
    ///
    /// This is the preferred method for request handlers.
    pub async fn run<F, R, E>(&self, f: F) -> Result<R, AxelisError>
    where
        F: FnOnce(&Connection) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<AxelisError> + Send + 'static,
    {
        self.pool
            .get()
            .await
            .map_err(|e| AxelisError::Other(format!("Failed to get connection: {}", e)))?
            .interact(move |conn| f(conn).map_err(Into::into))
            .await
            .map_err(|e| AxelisError::Other(format!("Database error: {}", e)))?
    }

    /// Like [`run`](Self::run) but with retry on SQLite contention errors.
    ///
    /// Use this for critical writes that must not be lost (message appends,
    /// session creation, escalation claims). The closure must be `Clone`.
    pub async fn run_with_retry<F, R, E>(&self, f: F) -> Result<R, AxelisError>
    where
        F: FnOnce(&Connection) -> Result<R, E> + Send + Clone + 'static,
        R: Send + 'static,
        E: Into<AxelisError> + Send + 'static,
    {
        retry_with_backoff(
            || {
                let f_clone = f.clone();
                self.run(f_clone)
            },
            is_axelis_contention,
        )
        .await
    }

    /// Run a closure with retry on SQLite contention, returning `anyhow::Result`.
    pub async fn interact_with_retry<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + Clone + 'static,
        R: Send + 'static,
    {
        retry_with_backoff(
            || {
                let f_clone = f.clone();
                self.interact(f_clone)
            },
            |e: &anyhow::Error| is_sqlite_contention(e),
        )
        .await
    }

    /// Run schema migrations. Called during pool creation.
    async fn run_migrations(&self) -> Result<()> {
        let dim = self.embedding_dim;
        self.interact(move |conn| {
            super::schema::run_all_migrations(conn, dim)?;
            if let Err(e) = conn.execute_batch("PRAGMA optimize") {
                tracing::debug!("PRAGMA optimize skipped: {}", e);
            }
            Ok(())
        })
        .await
    }

    /// Get pool status for monitoring.
    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }
}

/// Pool status for monitoring.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub size: usize,
    pub available: usize,
    pub waiting: usize,
}

/// Create a post_create hook for file-based databases.
fn make_file_post_create_hook() -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        Box::pin(async move {
            conn.interact(|conn| {
                setup_connection(conn)?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
            })?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

/// Create a post_create hook for in-memory databases.
///
/// Enables foreign keys and busy_timeout (WAL mode is not applicable).
fn make_memory_post_create_hook() -> Hook {
    Hook::async_fn(|conn, _metrics| {
        Box::pin(async move {
            conn.interact(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys=ON; \
                     PRAGMA busy_timeout=5000;",
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
            })?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

/// Configure a connection after it's created.
fn setup_connection(conn: &Connection) -> rusqlite::Result<()> {
    // WAL for concurrent readers during writes, foreign key enforcement,
    // 5s busy timeout, NORMAL synchronous (safe with WAL).
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; \
         PRAGMA foreign_keys=ON; \
         PRAGMA busy_timeout=5000; \
         PRAGMA synchronous=NORMAL; \
         PRAGMA journal_size_limit=32768;",
    )?;
    Ok(())
}
