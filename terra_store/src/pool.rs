use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use terra_shared::config::DB_MAX_CONNECTIONS;

/// A task's `.nev` database: a pooled connection handle plus the path it was
/// opened from. Up to [`DB_MAX_CONNECTIONS`] connections amortize the
/// per-connection handshake cost (spec §4.2); SQLite's own locking
/// coordinates the single writer per stage (spec §5).
#[derive(Clone)]
pub struct TaskStore {
    pub pool: SqlitePool,
}

impl TaskStore {
    /// Opens (creating if absent) the task database at `path`. Applies the
    /// same WAL/busy-timeout tuning the teacher repo applies to its own
    /// SQLite pool (`backend/src/main.rs::apply_sqlite_pragmas`).
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(DB_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        apply_pragmas(&pool).await;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect("sqlite::memory:")
            .await?;
        apply_pragmas(&pool).await;
        Ok(Self { pool })
    }
}

async fn apply_pragmas(pool: &SqlitePool) {
    let pragmas = [
        "PRAGMA journal_mode=WAL;".to_string(),
        "PRAGMA synchronous=NORMAL;".to_string(),
        "PRAGMA busy_timeout=5000;".to_string(),
        "PRAGMA foreign_keys=ON;".to_string(),
    ];
    for stmt in pragmas {
        if let Err(err) = sqlx::query(&stmt).execute(pool).await {
            eprintln!("terra_store: WARNING: failed to apply `{stmt}`: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_memory_applies_pragmas_without_error() {
        let store = TaskStore::open_memory().await.expect("open");
        let row: (String,) = sqlx::query_as("PRAGMA journal_mode;")
            .fetch_one(&store.pool)
            .await
            .expect("pragma read");
        // in-memory databases never enter WAL mode, but the statement must
        // still execute cleanly.
        assert!(!row.0.is_empty());
    }
}
