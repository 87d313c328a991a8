//! Per-table stitch orchestration (spec §4.6).

use crate::canvas::Canvas;
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use terra_shared::config::STITCH_WORKERS;
use terra_shared::model::{Band, Source, TileId};
use terra_shared::pixels::{crop_centered, flip_vertical};
use terra_store::progress_tables::{bump_stitch_success, finish_stitch_info, get_task_info, init_stitch_info};
use terra_store::tiles::{fetch_successful_tiles, mark_stitched, tile_coord_bounds};

/// Where a stitched canvas for `(table, band)` lives before masking/crop
/// (spec §6 "`<output>/<taskname>/GeoTif/temp_*`").
pub fn temp_canvas_path(geotif_dir: &Path, table: &str, band: &Band) -> PathBuf {
    let band_tag = band.as_deref().unwrap_or("default");
    geotif_dir.join(format!("temp_{table}_{band_tag}.bin"))
}

/// Stitches every successful tile in `{table}_rs` for one band into its
/// canvas file (spec §4.6 steps 1-4). A no-op if the table has no
/// successful rows yet.
pub async fn stitch_table(pool: &SqlitePool, table: &str, source: Source, band: &Band, geotif_dir: &Path) -> Result<Option<PathBuf>> {
    let rs_table = format!("{table}_rs");
    let bounds = tile_coord_bounds(pool, &rs_table).await?;
    let Some((min_x, max_x, min_y, max_y)) = bounds else {
        return Ok(None);
    };

    let task_info = get_task_info(pool).await?.context("task_info missing before stitch stage")?;
    let tiles = fetch_successful_tiles(pool, &rs_table, band).await?;
    let Some(sample) = tiles.first() else {
        return Ok(None);
    };
    let (tile_w, tile_h) = (sample.width, sample.height);

    let map_width = (max_x - min_x + 1) as u32 * tile_w;
    let map_height = (max_y - min_y + 1) as u32 * tile_h;

    let path = temp_canvas_path(geotif_dir, table, band);
    let mut canvas = Canvas::open(&path, min_x, min_y, tile_w, tile_h, map_width, map_height, task_info.channels, task_info.dtype)?;

    init_stitch_info(pool, &rs_table, tiles.len() as u64).await?;

    let (tx, mut rx) = tokio::sync::mpsc::channel::<(TileId, Band)>(STITCH_WORKERS * 4);
    let pool_for_writer = pool.clone();
    let rs_table_for_writer = rs_table.clone();
    let writer = tokio::spawn(async move {
        let mut since_bump = 0u64;
        while let Some((id, band)) = rx.recv().await {
            mark_stitched(&pool_for_writer, &rs_table_for_writer, id, &band).await?;
            since_bump += 1;
            if since_bump >= 64 {
                bump_stitch_success(&pool_for_writer, &rs_table_for_writer, since_bump).await?;
                since_bump = 0;
            }
        }
        if since_bump > 0 {
            bump_stitch_success(&pool_for_writer, &rs_table_for_writer, since_bump).await?;
        }
        Ok::<(), anyhow::Error>(())
    });

    for tile in tiles {
        let (mut pixels, shape) = match (&tile.payload, tile.shape, tile.dtype) {
            (payload, Some(shape), Some(_)) if !payload.is_empty() => (payload.clone(), shape),
            _ => continue,
        };
        let (rows, cols, channels) = shape;
        if source.vertically_flipped() {
            flip_vertical(&mut pixels, cols, rows, channels);
        }
        let (trimmed, w, h) = crop_centered(&pixels, cols, rows, channels, tile_w, tile_h);
        canvas.place(tile.id.x as i64, tile.id.y as i64, w, h, &trimmed);
        canvas.maybe_flush()?;
        tx.send((tile.id, band.clone())).await.ok();
    }
    drop(tx);
    canvas.flush()?;
    writer.await??;
    finish_stitch_info(pool, &rs_table).await?;

    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_shared::model::{DType, TileStatus};
    use terra_store::pool::TaskStore;
    use terra_store::progress_tables::set_task_info;
    use terra_store::schema::{ensure_all_progress_tables, ensure_rs_table, ensure_tile_table};
    use terra_store::tiles::{insert_outcomes_batch, DownloadOutcome};

    #[tokio::test]
    async fn stitches_two_adjacent_tiles_into_one_canvas() {
        let store = TaskStore::open_memory().await.unwrap();
        ensure_tile_table(&store.pool, "tiles_10").await.unwrap();
        ensure_rs_table(&store.pool, "tiles_10").await.unwrap();
        ensure_all_progress_tables(&store.pool).await.unwrap();
        set_task_info(&store.pool, 1, false, &None, DType::U8).await.unwrap();

        for x in [5u32, 6] {
            let outcome = DownloadOutcome {
                id: TileId::new(x, 7, 10),
                band: None,
                geometry_wkt: "POLYGON EMPTY".into(),
                width: 2,
                height: 2,
                status: TileStatus::Success,
                payload: vec![x as u8; 4],
                dtype: Some(DType::U8),
                shape: Some((2, 2, 1)),
                error: None,
                cost_secs: 0.0,
            };
            insert_outcomes_batch(&store.pool, "tiles_10", &[outcome]).await.unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let path = stitch_table(&store.pool, "tiles_10", Source::Terrain, &None, dir.path())
            .await
            .unwrap()
            .expect("canvas written");

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 4 * 2); // 2x4 canvas, one channel
        assert!(bytes.iter().any(|&b| b == 5));
        assert!(bytes.iter().any(|&b| b == 6));
    }

    #[tokio::test]
    async fn empty_table_returns_none() {
        let store = TaskStore::open_memory().await.unwrap();
        ensure_tile_table(&store.pool, "tiles_11").await.unwrap();
        ensure_rs_table(&store.pool, "tiles_11").await.unwrap();
        ensure_all_progress_tables(&store.pool).await.unwrap();
        set_task_info(&store.pool, 1, false, &None, DType::U8).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let result = stitch_table(&store.pool, "tiles_11", Source::Terrain, &None, dir.path())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
