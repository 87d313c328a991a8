use anyhow::Result;
use sqlx::{Row, SqlitePool};
use terra_shared::model::{Band, DType};

pub async fn set_task_info(pool: &SqlitePool, channels: u8, is_raster: bool, bands: &Option<String>, dtype: DType) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO task_info (id, channels, is_raster, bands, dtype) VALUES (0, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET channels=excluded.channels, is_raster=excluded.is_raster,
            bands=excluded.bands, dtype=excluded.dtype
        "#,
    )
    .bind(channels as i64)
    .bind(is_raster as i64)
    .bind(bands)
    .bind(dtype.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

pub struct TaskInfo {
    pub channels: u8,
    pub is_raster: bool,
    pub dtype: DType,
}

pub async fn get_task_info(pool: &SqlitePool) -> Result<Option<TaskInfo>> {
    let row = sqlx::query("SELECT channels, is_raster, dtype FROM task_info WHERE id = 0")
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| TaskInfo {
        channels: r.get::<i64, _>("channels") as u8,
        is_raster: r.get::<i64, _>("is_raster") != 0,
        dtype: DType::parse(&r.get::<String, _>("dtype")).unwrap_or(DType::U8),
    }))
}

pub async fn init_download_info(pool: &SqlitePool, table: &str, total: u64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO download_info (table_name, total, success, fail, start_time)
        VALUES (?, ?, 0, 0, datetime('now'))
        ON CONFLICT(table_name) DO UPDATE SET total = excluded.total
        "#,
    )
    .bind(table)
    .bind(total as i64)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn bump_download_counters(pool: &SqlitePool, table: &str, success: u64, fail: u64) -> Result<()> {
    sqlx::query(
        r#"UPDATE download_info SET success = success + ?, fail = fail + ? WHERE table_name = ?"#,
    )
    .bind(success as i64)
    .bind(fail as i64)
    .bind(table)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn finish_download_info(pool: &SqlitePool, table: &str) -> Result<()> {
    sqlx::query(r#"UPDATE download_info SET end_time = datetime('now') WHERE table_name = ?"#)
        .bind(table)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub total: u64,
    pub success: u64,
    pub fail: u64,
}

pub async fn read_download_counters(pool: &SqlitePool, table: &str) -> Result<Counters> {
    read_counters(pool, "download_info", table).await
}

pub async fn init_stitch_info(pool: &SqlitePool, table: &str, total: u64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO stitch_info (table_name, total, success, fail, start_time)
        VALUES (?, ?, 0, 0, datetime('now'))
        ON CONFLICT(table_name) DO UPDATE SET total = excluded.total
        "#,
    )
    .bind(table)
    .bind(total as i64)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn bump_stitch_success(pool: &SqlitePool, table: &str, n: u64) -> Result<()> {
    sqlx::query(r#"UPDATE stitch_info SET success = success + ? WHERE table_name = ?"#)
        .bind(n as i64)
        .bind(table)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn finish_stitch_info(pool: &SqlitePool, table: &str) -> Result<()> {
    sqlx::query(r#"UPDATE stitch_info SET end_time = datetime('now') WHERE table_name = ?"#)
        .bind(table)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn read_stitch_counters(pool: &SqlitePool, table: &str) -> Result<Counters> {
    read_counters(pool, "stitch_info", table).await
}

async fn read_counters(pool: &SqlitePool, info_table: &str, table: &str) -> Result<Counters> {
    let row = sqlx::query(&format!(
        "SELECT total, success, fail FROM {info_table} WHERE table_name = ?"
    ))
    .bind(table)
    .fetch_optional(pool)
    .await?;
    Ok(row
        .map(|r| Counters {
            total: r.get::<i64, _>("total") as u64,
            success: r.get::<i64, _>("success") as u64,
            fail: r.get::<i64, _>("fail") as u64,
        })
        .unwrap_or_default())
}

/// One block of the final canvas (spec §3 "Crop-info table").
#[derive(Debug, Clone, Copy)]
pub struct CropBlock {
    pub x: u32,
    pub y: u32,
    pub x_end: u32,
    pub y_end: u32,
}

pub async fn upsert_crop_blocks(pool: &SqlitePool, table: &str, band: &Band, blocks: &[CropBlock]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for b in blocks {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO crop_info (table_name, band, x, y, x_end, y_end, cropped)
            VALUES (?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(table)
        .bind(band)
        .bind(b.x as i64)
        .bind(b.y as i64)
        .bind(b.x_end as i64)
        .bind(b.y_end as i64)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn mark_block_cropped(pool: &SqlitePool, table: &str, band: &Band, x: u32, y: u32) -> Result<()> {
    sqlx::query(r#"UPDATE crop_info SET cropped = 1 WHERE table_name = ? AND (band IS ?) AND x = ? AND y = ?"#)
        .bind(table)
        .bind(band)
        .bind(x as i64)
        .bind(y as i64)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn uncropped_blocks(pool: &SqlitePool, table: &str, band: &Band) -> Result<Vec<CropBlock>> {
    let rows = sqlx::query(
        r#"SELECT x, y, x_end, y_end FROM crop_info WHERE table_name = ? AND (band IS ?) AND cropped = 0"#,
    )
    .bind(table)
    .bind(band)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| CropBlock {
            x: r.get::<i64, _>("x") as u32,
            y: r.get::<i64, _>("y") as u32,
            x_end: r.get::<i64, _>("x_end") as u32,
            y_end: r.get::<i64, _>("y_end") as u32,
        })
        .collect())
}

/// Running `(ymin, ymax, xmin, xmax)` extremum of in-polygon pixels
/// (spec §3, §4.7).
#[derive(Debug, Clone, Copy)]
pub struct CropBounds {
    pub ymin: i64,
    pub ymax: i64,
    pub xmin: i64,
    pub xmax: i64,
}

pub async fn merge_crop_bounds(pool: &SqlitePool, table: &str, band: &Band, incoming: CropBounds) -> Result<()> {
    let existing: Option<(i64, i64, i64, i64)> = sqlx::query_as(
        "SELECT ymin, ymax, xmin, xmax FROM crop_bounds_info WHERE table_name = ? AND (band IS ?)",
    )
    .bind(table)
    .bind(band)
    .fetch_optional(pool)
    .await?;

    let merged = match existing {
        None => incoming,
        Some((ymin, ymax, xmin, xmax)) => CropBounds {
            ymin: ymin.min(incoming.ymin),
            ymax: ymax.max(incoming.ymax),
            xmin: xmin.min(incoming.xmin),
            xmax: xmax.max(incoming.xmax),
        },
    };

    sqlx::query(
        r#"
        INSERT INTO crop_bounds_info (table_name, band, ymin, ymax, xmin, xmax) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(table_name, band) DO UPDATE SET ymin=excluded.ymin, ymax=excluded.ymax,
            xmin=excluded.xmin, xmax=excluded.xmax
        "#,
    )
    .bind(table)
    .bind(band)
    .bind(merged.ymin)
    .bind(merged.ymax)
    .bind(merged.xmin)
    .bind(merged.xmax)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn read_crop_bounds(pool: &SqlitePool, table: &str, band: &Band) -> Result<Option<CropBounds>> {
    let row: Option<(i64, i64, i64, i64)> = sqlx::query_as(
        "SELECT ymin, ymax, xmin, xmax FROM crop_bounds_info WHERE table_name = ? AND (band IS ?)",
    )
    .bind(table)
    .bind(band)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(ymin, ymax, xmin, xmax)| CropBounds { ymin, ymax, xmin, xmax }))
}
