use anyhow::Result;
use sqlx::SqlitePool;

/// Creates a per-zoom tile table (and its `_rs` results mirror) if absent.
/// Schema is lazy per spec §4.2 "All tables ... are created lazily on first
/// use". Both the logical table and its `_rs` mirror share the same column
/// set — the original kept them identical by literally copying the schema
/// (`create table ... as select * from X where 1=2`); we declare it once
/// and reuse it for both, which is the idiomatic equivalent.
pub async fn ensure_tile_table(pool: &SqlitePool, table: &str) -> Result<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            x               INTEGER NOT NULL,
            y               INTEGER NOT NULL,
            band            TEXT,
            geometry        TEXT NOT NULL,
            payload         BLOB,
            dtype           TEXT,
            shape_rows      INTEGER,
            shape_cols      INTEGER,
            shape_channels  INTEGER,
            width           INTEGER NOT NULL,
            height          INTEGER NOT NULL,
            status          INTEGER NOT NULL DEFAULT 0,
            stitch_status   INTEGER NOT NULL DEFAULT 0,
            error           TEXT,
            cost            REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (x, y, band)
        );
        "#
    );
    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

pub async fn ensure_rs_table(pool: &SqlitePool, table: &str) -> Result<()> {
    ensure_tile_table(pool, &format!("{table}_rs")).await
}

/// Indexes created once the downloader finishes, to speed the stitcher
/// (spec §4.2).
pub async fn create_post_download_indexes(pool: &SqlitePool, rs_table: &str) -> Result<()> {
    let stmts = [
        format!(r#"CREATE INDEX IF NOT EXISTS "{rs_table}_xyz_idx" ON "{rs_table}" (x, y);"#),
        format!(r#"CREATE INDEX IF NOT EXISTS "{rs_table}_status_idx" ON "{rs_table}" (status);"#),
        format!(
            r#"CREATE INDEX IF NOT EXISTS "{rs_table}_stitch_idx" ON "{rs_table}" (stitch_status);"#
        ),
    ];
    for stmt in stmts {
        sqlx::query(&stmt).execute(pool).await?;
    }
    Ok(())
}

pub async fn ensure_task_info(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_info (
            id        INTEGER PRIMARY KEY CHECK (id = 0),
            channels  INTEGER NOT NULL,
            is_raster INTEGER NOT NULL,
            bands     TEXT,
            dtype     TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn ensure_download_info(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS download_info (
            table_name TEXT PRIMARY KEY,
            total      INTEGER NOT NULL DEFAULT 0,
            success    INTEGER NOT NULL DEFAULT 0,
            fail       INTEGER NOT NULL DEFAULT 0,
            start_time TEXT,
            end_time   TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn ensure_stitch_info(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stitch_info (
            table_name TEXT PRIMARY KEY,
            total      INTEGER NOT NULL DEFAULT 0,
            success    INTEGER NOT NULL DEFAULT 0,
            fail       INTEGER NOT NULL DEFAULT 0,
            start_time TEXT,
            end_time   TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn ensure_crop_info(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crop_info (
            table_name TEXT NOT NULL,
            band       TEXT,
            x          INTEGER NOT NULL,
            y          INTEGER NOT NULL,
            x_end      INTEGER NOT NULL,
            y_end      INTEGER NOT NULL,
            cropped    INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (table_name, band, x, y)
        );
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crop_bounds_info (
            table_name TEXT NOT NULL,
            band       TEXT,
            ymin       INTEGER,
            ymax       INTEGER,
            xmin       INTEGER,
            xmax       INTEGER,
            PRIMARY KEY (table_name, band)
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn ensure_all_progress_tables(pool: &SqlitePool) -> Result<()> {
    ensure_task_info(pool).await?;
    ensure_download_info(pool).await?;
    ensure_stitch_info(pool).await?;
    ensure_crop_info(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::TaskStore;

    #[tokio::test]
    async fn tile_and_rs_tables_share_columns() {
        let store = TaskStore::open_memory().await.unwrap();
        ensure_tile_table(&store.pool, "tiles_12").await.unwrap();
        ensure_rs_table(&store.pool, "tiles_12").await.unwrap();
        let cols: Vec<(i64, String)> = sqlx::query_as("SELECT cid, name FROM pragma_table_info('tiles_12_rs')")
            .fetch_all(&store.pool)
            .await
            .unwrap();
        assert!(cols.iter().any(|(_, name)| name == "status"));
        assert!(cols.iter().any(|(_, name)| name == "stitch_status"));
    }
}
