use crate::cancellation::CancellationFlag;
use crate::fetch::{fetch_and_decode, FetchOutcome};
use crate::normalize::center_crop;
use crate::provider::build_tile_url;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use sqlx::SqlitePool;
use std::time::Instant;
use terra_net::ProxyPool;
use terra_shared::config::{DOWNLOAD_QUEUE_CAPACITY, DOWNLOAD_WORKERS, DOWNLOAD_WRITE_BATCH};
use terra_shared::model::{Band, Source, TileId, TileStatus};
use terra_store::tiles::{bump_download_counters, insert_outcomes_batch, stream_pending_tiles, DownloadOutcome, PendingTile};

/// Static per-task fetch parameters threaded through every worker (spec §9
/// "explicit configuration context passed by value").
#[derive(Clone)]
pub struct DownloadContext {
    pub source: Source,
    pub endpoint_base: String,
    pub project_id: String,
    pub start_date: String,
    pub end_date: String,
    pub scale_meters: u32,
}

/// Extracts the zoom a physical table belongs to, e.g. `tiles_14` or
/// `tiles_14_part_2` both yield `14`. Tile identity itself carries no `z`
/// column (see `terra_store::tiles::stream_pending_tiles`) — physical
/// tables are the only place it's recoverable from.
fn zoom_of_table(table: &str) -> u8 {
    table
        .strip_prefix("tiles_")
        .and_then(|rest| rest.split('_').next())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Runs the worker pool + writer thread for one physical table (spec §4.5).
/// Each row returned by `stream_pending_tiles` already names its own band
/// (enumeration inserts one row per tile per band), so every pending row is
/// fetched exactly once. Returns once every pending tile has been attempted
/// once, the writer has drained, and the de-dup pass has run, or once
/// `cancel` is asserted.
pub async fn run_download_stage(
    pool: &SqlitePool,
    table: &str,
    proxies: &ProxyPool,
    ctx: &DownloadContext,
    cancel: &CancellationFlag,
) -> Result<()> {
    let zoom = zoom_of_table(table);
    let pending = stream_pending_tiles(pool, table).await?;

    let (tx, rx) = tokio::sync::mpsc::channel::<DownloadOutcome>(DOWNLOAD_QUEUE_CAPACITY);
    let writer_pool = pool.clone();
    let writer_table = table.to_string();
    let writer = tokio::spawn(async move { writer_loop(writer_pool, writer_table, rx).await });

    let cancel_for_workers = cancel.clone();
    stream::iter(pending)
        .for_each_concurrent(DOWNLOAD_WORKERS, move |pending_tile| {
            let tx = tx.clone();
            let ctx = ctx.clone();
            let cancel = cancel_for_workers.clone();
            async move {
                if cancel.should_stop() {
                    return;
                }
                let band = pending_tile.band.clone();
                let outcome = fetch_one(proxies, &ctx, zoom, &pending_tile, &band).await;
                let _ = tx.send(outcome).await;
            }
        })
        .await;

    writer.await??;
    terra_store::tiles::dedup_rs_table(pool, table).await?;
    Ok(())
}

async fn fetch_one(proxies: &ProxyPool, ctx: &DownloadContext, zoom: u8, pending: &PendingTile, band: &Band) -> DownloadOutcome {
    let started = Instant::now();
    let id = TileId::new(pending.id.x, pending.id.y, zoom);
    let client: Client = proxies.next().clone();
    let url = build_tile_url(
        &ctx.endpoint_base,
        ctx.source,
        &ctx.project_id,
        &ctx.start_date,
        &ctx.end_date,
        ctx.scale_meters,
        band,
        &pending.geometry_wkt,
    );

    let base = DownloadOutcome {
        id,
        band: band.clone(),
        geometry_wkt: pending.geometry_wkt.clone(),
        width: pending.width,
        height: pending.height,
        status: TileStatus::Failed,
        payload: Vec::new(),
        dtype: None,
        shape: None,
        error: None,
        cost_secs: 0.0,
    };

    let result = match fetch_and_decode(&client, &url, ctx.source, band).await {
        Ok(FetchOutcome::Tile(tile)) => {
            // spec §4.5 step 2: crop the buffered fetch back to the halo'd
            // unbuffered size before persisting.
            let (pixels, w, h) = center_crop(
                &tile.pixels,
                tile.width,
                tile.height,
                tile.channels,
                pending.width + 2,
                pending.height + 2,
            );
            Ok((pixels, w, h, tile.channels, tile.dtype))
        }
        Ok(FetchOutcome::AreaTooLarge) => Err("requested area too large for this tile".to_string()),
        Err(err) => Err(err.to_string()),
    };

    match result {
        Ok((pixels, w, h, channels, dtype)) => DownloadOutcome {
            status: TileStatus::Success,
            payload: pixels,
            dtype: Some(dtype),
            shape: Some((h, w, channels)),
            error: None,
            cost_secs: started.elapsed().as_secs_f64(),
            ..base
        },
        Err(error) => DownloadOutcome {
            status: TileStatus::Failed,
            error: Some(error),
            cost_secs: started.elapsed().as_secs_f64(),
            ..base
        },
    }
}

/// Single writer task (spec §4.5 step 6): batches up to
/// [`DOWNLOAD_WRITE_BATCH`] outcomes per insert and bumps the
/// `download_info` counters, draining the channel until every worker's
/// sender is dropped.
async fn writer_loop(pool: SqlitePool, table: String, mut rx: tokio::sync::mpsc::Receiver<DownloadOutcome>) -> Result<()> {
    let mut buf = Vec::with_capacity(DOWNLOAD_WRITE_BATCH);
    loop {
        let received = rx.recv().await;
        match received {
            None => break,
            Some(outcome) => buf.push(outcome),
        }
        while buf.len() < DOWNLOAD_WRITE_BATCH {
            match rx.try_recv() {
                Ok(outcome) => buf.push(outcome),
                Err(_) => break,
            }
        }
        if buf.len() >= DOWNLOAD_WRITE_BATCH {
            flush(&pool, &table, &mut buf).await?;
        }
    }
    if !buf.is_empty() {
        flush(&pool, &table, &mut buf).await?;
    }
    Ok(())
}

async fn flush(pool: &SqlitePool, table: &str, buf: &mut Vec<DownloadOutcome>) -> Result<()> {
    insert_outcomes_batch(pool, table, buf).await?;
    let success = buf.iter().filter(|o| o.status == TileStatus::Success).count() as u64;
    let fail = buf.len() as u64 - success;
    bump_download_counters(pool, table, success, fail).await?;
    buf.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_parses_from_plain_and_sharded_table_names() {
        assert_eq!(zoom_of_table("tiles_14"), 14);
        assert_eq!(zoom_of_table("tiles_14_part_2"), 14);
        assert_eq!(zoom_of_table("tiles_9"), 9);
    }
}
