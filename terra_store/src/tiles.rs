use anyhow::Result;
use sqlx::{Row, SqlitePool};
use terra_shared::model::{Band, DType, TileId, TileRecord, TileStatus};

/// One row queued for insertion by the enumerator (spec §4.4 "Emitted tiles
/// are buffered in memory").
#[derive(Debug, Clone)]
pub struct NewTile {
    pub id: TileId,
    pub band: Band,
    pub geometry_wkt: String,
    pub width: u32,
    pub height: u32,
}

/// Batch-inserts enumerated tiles into `table` (spec §4.4: "every 50,000
/// tiles the buffer is flushed ... as a batch insert"). `INSERT OR IGNORE`
/// makes replay idempotent: re-running enumeration after a crash just
/// no-ops on rows already present (spec §4.2).
pub async fn insert_tiles_batch(pool: &SqlitePool, table: &str, rows: &[NewTile]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    for row in rows {
        let sql = format!(
            r#"INSERT OR IGNORE INTO "{table}" (x, y, band, geometry, width, height) VALUES (?, ?, ?, ?, ?, ?)"#
        );
        sqlx::query(&sql)
            .bind(row.id.x as i64)
            .bind(row.id.y as i64)
            .bind(&row.band)
            .bind(&row.geometry_wkt)
            .bind(row.width as i64)
            .bind(row.height as i64)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// A tile pending download: absent from `_rs`, or present but failed
/// (spec §4.5 "generator streams rows whose ... is absent ... or present
/// with status=failed").
#[derive(Debug, Clone)]
pub struct PendingTile {
    pub id: TileId,
    pub band: Band,
    pub width: u32,
    pub height: u32,
    pub geometry_wkt: String,
}

pub async fn stream_pending_tiles(pool: &SqlitePool, table: &str) -> Result<Vec<PendingTile>> {
    let rs_table = format!("{table}_rs");
    let sql = format!(
        r#"
        SELECT t.x, t.y, t.band, t.width, t.height, t.geometry
        FROM "{table}" t
        LEFT JOIN "{rs_table}" r ON r.x = t.x AND r.y = t.y AND
            (r.band IS t.band)
        WHERE r.x IS NULL OR r.status = -1
        "#
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    // `z` isn't a column — the physical table name already pins the zoom
    // (and shard); callers that need it fill it in from that context.
    Ok(rows
        .into_iter()
        .map(|row| PendingTile {
            id: TileId::new(row.get::<i64, _>("x") as u32, row.get::<i64, _>("y") as u32, 0),
            band: row.get("band"),
            width: row.get::<i64, _>("width") as u32,
            height: row.get::<i64, _>("height") as u32,
            geometry_wkt: row.get("geometry"),
        })
        .collect())
}

/// One completed (successful or failed) download attempt, ready for the
/// writer thread's batched insert (spec §4.5 step 5/6).
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub id: TileId,
    pub band: Band,
    pub geometry_wkt: String,
    pub width: u32,
    pub height: u32,
    pub status: TileStatus,
    pub payload: Vec<u8>,
    pub dtype: Option<DType>,
    pub shape: Option<(u32, u32, u8)>,
    pub error: Option<String>,
    pub cost_secs: f64,
}

/// Writes up to [`terra_shared::config::DOWNLOAD_WRITE_BATCH`] outcomes as a
/// single multi-row insert into `{table}_rs` (spec §4.5 step 6).
pub async fn insert_outcomes_batch(pool: &SqlitePool, table: &str, outcomes: &[DownloadOutcome]) -> Result<()> {
    if outcomes.is_empty() {
        return Ok(());
    }
    let rs_table = format!("{table}_rs");
    let mut tx = pool.begin().await?;
    for o in outcomes {
        let sql = format!(
            r#"
            INSERT INTO "{rs_table}"
                (x, y, band, geometry, payload, dtype, shape_rows, shape_cols, shape_channels,
                 width, height, status, stitch_status, error, cost)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#
        );
        let (rows, cols, channels) = o.shape.unwrap_or((0, 0, 0));
        sqlx::query(&sql)
            .bind(o.id.x as i64)
            .bind(o.id.y as i64)
            .bind(&o.band)
            .bind(&o.geometry_wkt)
            .bind(&o.payload)
            .bind(o.dtype.map(|d| d.as_str()))
            .bind(rows as i64)
            .bind(cols as i64)
            .bind(channels as i64)
            .bind(o.width as i64)
            .bind(o.height as i64)
            .bind(o.status.as_i32())
            .bind(&o.error)
            .bind(o.cost_secs)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// De-dup pass (spec §4.5 "At-most-once effective payload per tile", §3
/// invariant): per `(x, y, band)`, delete every `status=-1` row if any row
/// has `status=1`, and keep only the max-rowid successful attempt.
pub async fn dedup_rs_table(pool: &SqlitePool, table: &str) -> Result<()> {
    let rs_table = format!("{table}_rs");
    sqlx::query(&format!(
        r#"
        DELETE FROM "{rs_table}"
        WHERE status = -1
          AND EXISTS (
            SELECT 1 FROM "{rs_table}" s
            WHERE s.x = "{rs_table}".x AND s.y = "{rs_table}".y AND (s.band IS "{rs_table}".band)
              AND s.status = 1
          )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        DELETE FROM "{rs_table}"
        WHERE status = 1
          AND rowid NOT IN (
            SELECT MAX(rowid) FROM "{rs_table}"
            WHERE status = 1
            GROUP BY x, y, band
          )
        "#
    ))
    .execute(pool)
    .await?;
    Ok(())
}

/// `(min_x, max_x, min_y, max_y)` over a physical table's successful tiles
/// (spec §4.6 step 1).
pub async fn tile_coord_bounds(pool: &SqlitePool, rs_table: &str) -> Result<Option<(i64, i64, i64, i64)>> {
    let row = sqlx::query(&format!(
        r#"SELECT MIN(x) min_x, MAX(x) max_x, MIN(y) min_y, MAX(y) max_y FROM "{rs_table}" WHERE status = 1"#
    ))
    .fetch_one(pool)
    .await?;
    let min_x: Option<i64> = row.get("min_x");
    match min_x {
        None => Ok(None),
        Some(min_x) => Ok(Some((
            min_x,
            row.get("max_x"),
            row.get("min_y"),
            row.get("max_y"),
        ))),
    }
}

pub async fn fetch_successful_tiles(pool: &SqlitePool, rs_table: &str, band: &Band) -> Result<Vec<TileRecord>> {
    let sql = format!(
        r#"
        SELECT x, y, band, geometry, payload, dtype, shape_rows, shape_cols, shape_channels,
               width, height, status, stitch_status, error, cost
        FROM "{rs_table}"
        WHERE status = 1 AND stitch_status = 0 AND (band IS ?)
        "#
    );
    let rows = sqlx::query(&sql).bind(band).fetch_all(pool).await?;
    Ok(rows.into_iter().map(row_to_record).collect())
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> TileRecord {
    let shape = match (
        row.get::<Option<i64>, _>("shape_rows"),
        row.get::<Option<i64>, _>("shape_cols"),
        row.get::<Option<i64>, _>("shape_channels"),
    ) {
        (Some(r), Some(c), Some(ch)) => Some((r as u32, c as u32, ch as u8)),
        _ => None,
    };
    TileRecord {
        // see note in `stream_pending_tiles` re: z
        id: TileId::new(row.get::<i64, _>("x") as u32, row.get::<i64, _>("y") as u32, 0),
        band: row.get("band"),
        geometry_wkt: row.get("geometry"),
        payload: row.get("payload"),
        dtype: row.get::<Option<String>, _>("dtype").and_then(|s| DType::parse(&s)),
        shape,
        width: row.get::<i64, _>("width") as u32,
        height: row.get::<i64, _>("height") as u32,
        status: TileStatus::from_i32(row.get("status")),
        stitch_status: terra_shared::model::StitchStatus::Null,
        error: row.get("error"),
        cost_secs: row.get("cost"),
    }
}

/// Marks a tile consumed by the stitcher (spec §3 invariant
/// `stitched_tiles <= download_success`).
pub async fn mark_stitched(pool: &SqlitePool, rs_table: &str, tile: TileId, band: &Band) -> Result<()> {
    let sql = format!(r#"UPDATE "{rs_table}" SET stitch_status = 1 WHERE x = ? AND y = ? AND (band IS ?)"#);
    sqlx::query(&sql)
        .bind(tile.x as i64)
        .bind(tile.y as i64)
        .bind(band)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::TaskStore;
    use crate::schema::{ensure_rs_table, ensure_tile_table};

    #[tokio::test]
    async fn dedup_keeps_only_the_latest_success() {
        let store = TaskStore::open_memory().await.unwrap();
        ensure_tile_table(&store.pool, "tiles_12").await.unwrap();
        ensure_rs_table(&store.pool, "tiles_12").await.unwrap();

        for status in [-1, -1, 1, 1] {
            let outcome = DownloadOutcome {
                id: TileId::new(1, 1, 12),
                band: None,
                geometry_wkt: "POLYGON EMPTY".into(),
                width: 256,
                height: 256,
                status: TileStatus::from_i32(status),
                payload: vec![0u8; 4],
                dtype: Some(DType::U8),
                shape: Some((1, 1, 4)),
                error: None,
                cost_secs: 0.1,
            };
            insert_outcomes_batch(&store.pool, "tiles_12", &[outcome]).await.unwrap();
        }
        dedup_rs_table(&store.pool, "tiles_12").await.unwrap();

        let remaining: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "tiles_12_rs""#)
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
