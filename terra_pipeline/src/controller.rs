//! Drives enumerate → download → stitch+crop → output serially for one task
//! (spec §4.9, component C9). Stages run in-process rather than as isolated
//! OS processes (spec §5 "process-isolated between stages") — this
//! workspace's stage boundary is the crate boundary, not a process
//! boundary; a panic inside one still can't corrupt another stage's state
//! since each talks to the database only through its own connections and
//! its own mmap file.

use crate::milestone::MilestoneState;
use anyhow::{bail, Context, Result};
use geo::MultiPolygon;
use sqlx::SqlitePool;
use std::path::PathBuf;
use terra_download::{probe_download_zoom, provider::is_raster, run_download_stage, CancellationFlag, DownloadContext};
use terra_enumerate::{enumerate_tiles, parse_polygon_wkt, EnumerationSink};
use terra_maskcrop::{run_mask_crop, GeoTransform};
use terra_net::ProxyPool;
use terra_output::{write_empty_readme, write_geotiff, write_polygon_shapefile, write_prj_file, write_readme, write_world_file, ReadmeInfo};
use terra_shared::config::{DEFAULT_BLOCK_SIZE, DEFAULT_SPLIT_THRESHOLD, IMAGERY_ENDPOINT_BASE, MAX_DOWNLOAD_RETRIES};
use terra_shared::geometry::{bounding_rect_of, ring_wkt, tile_bounds};
use terra_shared::model::{Band, DType, Source, TileId};
use terra_shared::progress::{ProgressEvent, ProgressInfo};
use terra_shared::{TaskConfig, TerraError};
use terra_store::progress_tables::{create_post_download_indexes, finish_download_info, get_task_info, init_download_info, read_download_counters, set_task_info, Counters};
use terra_store::reshard::{physical_tables_for_zoom, reshard_if_needed};
use terra_store::schema::{ensure_all_progress_tables, ensure_tile_table};
use terra_store::tiles::{fetch_successful_tiles, insert_tiles_batch, stream_pending_tiles, tile_coord_bounds, NewTile};
use terra_store::TaskStore;
use tokio::sync::mpsc::UnboundedSender;

pub struct PipelineController {
    pub config: TaskConfig,
    cancel: CancellationFlag,
}

impl PipelineController {
    pub fn new(config: TaskConfig) -> Self {
        Self { config, cancel: CancellationFlag::new() }
    }

    /// A shareable handle for asserting cancellation from outside the
    /// running task (spec §4.5 "Cancellation", §5 "the user may pause"),
    /// e.g. from a signal handler. Calling `.cancel()` on it stops the
    /// download stage from issuing new work the next time a worker checks.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    fn milestone_path(&self) -> PathBuf {
        self.config.task_dir().join("milestones.xml")
    }

    /// Runs every stage for this task, resuming from whatever the milestone
    /// sidecar says is already done. Mirrors spec §4.9's single controller
    /// entry point.
    pub async fn run(&self) -> Result<()> {
        self.run_with_progress(None).await
    }

    /// Same as [`Self::run`], but also pushes a `(progress_info,
    /// process_done, taskname)` tuple after every meaningful state change
    /// (spec §6 "Progress channel"), mirroring the writer-task mpsc pattern
    /// used inside the download and stitch stages themselves.
    pub async fn run_with_progress(&self, progress_tx: Option<UnboundedSender<ProgressEvent>>) -> Result<()> {
        std::fs::create_dir_all(self.config.task_dir())?;
        let store = TaskStore::open(&self.config.db_path()).await?;
        ensure_all_progress_tables(&store.pool).await?;

        let polygon = parse_polygon_wkt(&self.config.polygon_wkt)?;
        let source = Source::from_selector(&self.config.source).context("unknown data source selector")?;
        let bands = self.config.bands();
        let proxy_list: Vec<_> = self.config.proxies.values().cloned().collect();
        let proxies = ProxyPool::new(&proxy_list)?;
        let milestone_path = self.milestone_path();
        let mut milestone = MilestoneState::load_or_default(&milestone_path)?;

        let result = self
            .run_inner(&store.pool, &polygon, source, &bands, &proxies, &mut milestone, &milestone_path, &progress_tx)
            .await;
        self.cancel.mark_completed();

        match result {
            Ok(()) => {
                self.emit(&milestone, &progress_tx, true);
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                milestone.exception = Some(TerraError::classify(&message).map(str::to_string).unwrap_or(message));
                milestone.persist(&milestone_path)?;
                self.emit(&milestone, &progress_tx, true);
                Err(err)
            }
        }
    }

    fn emit(&self, milestone: &MilestoneState, progress_tx: &Option<UnboundedSender<ProgressEvent>>, process_done: bool) {
        let Some(tx) = progress_tx else { return };
        let exception = milestone.exception.clone();
        let info = ProgressInfo {
            download_total: milestone.download_total,
            download_success: milestone.download_success,
            download_fail: milestone.download_fail,
            stitch_total: milestone.stitch_total,
            stitched_tiles: milestone.stitched_tiles,
            crop_total: milestone.crop_total,
            croped_blocks: milestone.croped_blocks,
            enumerate_exception: if !milestone.is_calculate_tiles_done { exception.clone() } else { None },
            download_exception: if milestone.is_calculate_tiles_done && !milestone.is_tile_download_done { exception.clone() } else { None },
            stitch_exception: if milestone.is_tile_download_done && !milestone.is_tile_stitch_done { exception.clone() } else { None },
            crop_exception: if milestone.is_tile_stitch_done { exception } else { None },
            is_calculate_tiles_done: milestone.is_calculate_tiles_done,
            is_tile_download_done: milestone.is_tile_download_done,
            is_tile_stitch_done: milestone.is_tile_stitch_done,
        };
        let _ = tx.send(ProgressEvent { progress_info: info, process_done, taskname: self.config.taskname.clone() });
    }

    async fn run_inner(
        &self,
        pool: &SqlitePool,
        polygon: &MultiPolygon<f64>,
        source: Source,
        bands: &[Band],
        proxies: &ProxyPool,
        milestone: &mut MilestoneState,
        milestone_path: &PathBuf,
        progress_tx: &Option<UnboundedSender<ProgressEvent>>,
    ) -> Result<()> {
        if !milestone.is_calculate_tiles_done {
            self.run_enumerate(pool, polygon, source, bands, proxies, milestone).await?;
            milestone.is_calculate_tiles_done = true;
            milestone.persist(milestone_path)?;
            self.emit(milestone, progress_tx, false);
        }

        let tables = physical_tables_for_zoom(pool, milestone.target_zoom).await?;

        if !milestone.is_tile_download_done {
            let ctx = DownloadContext {
                source,
                endpoint_base: IMAGERY_ENDPOINT_BASE.to_string(),
                project_id: self.config.credential.project_id.clone(),
                start_date: self.config.start_date.clone(),
                end_date: self.config.end_date.clone(),
                scale_meters: self.config.scale_meters,
            };
            self.run_download(pool, &tables, proxies, &ctx, milestone, progress_tx).await?;
            milestone.is_tile_download_done = true;
            milestone.persist(milestone_path)?;
            self.emit(milestone, progress_tx, false);
        }

        if !milestone.is_tile_stitch_done {
            self.run_stitch_and_crop(pool, &tables, source, bands, polygon).await?;
            milestone.is_tile_stitch_done = true;
            milestone.persist(milestone_path)?;
            self.emit(milestone, progress_tx, false);
        }

        if self.config.is_export_shp {
            self.write_shapefile(polygon)?;
        }
        Ok(())
    }

    async fn run_enumerate(
        &self,
        pool: &SqlitePool,
        polygon: &MultiPolygon<f64>,
        source: Source,
        bands: &[Band],
        proxies: &ProxyPool,
        milestone: &mut MilestoneState,
    ) -> Result<()> {
        let rect = bounding_rect_of(polygon).context("polygon has no bounding rect")?;
        let centroid_lon = (rect.min().x + rect.max().x) / 2.0;
        let centroid_lat = (rect.min().y + rect.max().y) / 2.0;

        let probe = probe_download_zoom(
            proxies.next(),
            source,
            IMAGERY_ENDPOINT_BASE,
            &self.config.credential.project_id,
            &self.config.start_date,
            &self.config.end_date,
            self.config.scale_meters,
            &bands[0],
            centroid_lon,
            centroid_lat,
        )
        .await?;

        set_task_info(pool, probe.channels, is_raster(source), &self.config.band, probe.dtype).await?;

        let table = TileId::table_name(probe.zoom);
        ensure_tile_table(pool, &table).await?;

        let mut sink = StoreSink { pool, table: table.clone(), bands: bands.to_vec(), width: probe.width, height: probe.height, buffer: Vec::new() };
        enumerate_tiles(polygon, &[probe.zoom], &mut sink)?;
        sink.drain()?;

        reshard_if_needed(pool, &table, DEFAULT_SPLIT_THRESHOLD).await?;
        milestone.target_zoom = probe.zoom;
        Ok(())
    }

    async fn run_download(
        &self,
        pool: &SqlitePool,
        tables: &[String],
        proxies: &ProxyPool,
        ctx: &DownloadContext,
        milestone: &mut MilestoneState,
        progress_tx: &Option<UnboundedSender<ProgressEvent>>,
    ) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            let mut stage_error = None;
            for table in tables {
                let pending = stream_pending_tiles(pool, table).await?.len() as u64;
                init_download_info(pool, table, pending).await?;
                if let Err(err) = run_download_stage(pool, table, proxies, ctx, &self.cancel).await {
                    stage_error = Some(err);
                    break;
                }
                finish_download_info(pool, table).await?;
                create_post_download_indexes(pool, &format!("{table}_rs")).await?;

                let c = read_download_counters(pool, table).await?;
                milestone.download_total += c.total;
                milestone.download_success += c.success;
                milestone.download_fail += c.fail;
                self.emit(milestone, progress_tx, false);
            }
            match stage_error {
                None => break,
                Some(err) => {
                    attempts += 1;
                    if attempts >= MAX_DOWNLOAD_RETRIES {
                        return Err(err);
                    }
                    milestone.download_total = 0;
                    milestone.download_success = 0;
                    milestone.download_fail = 0;
                }
            }
        }

        let mut counters = Counters::default();
        for table in tables {
            let c = read_download_counters(pool, table).await?;
            counters.total += c.total;
            counters.success += c.success;
            counters.fail += c.fail;
        }
        milestone.download_total = counters.total;
        milestone.download_success = counters.success;
        milestone.download_fail = counters.fail;
        Ok(())
    }

    async fn run_stitch_and_crop(&self, pool: &SqlitePool, tables: &[String], source: Source, bands: &[Band], polygon: &MultiPolygon<f64>) -> Result<()> {
        let geotif_dir = self.config.geotif_dir();
        std::fs::create_dir_all(&geotif_dir)?;
        let task_info = get_task_info(pool).await?.context("task_info missing before stitch stage")?;

        for table in tables {
            for band in bands {
                let Some(canvas_path) = terra_stitch::stitch_table(pool, table, source, band, &geotif_dir).await? else {
                    continue;
                };

                let rs_table = format!("{table}_rs");
                let Some((min_x, max_x, min_y, max_y)) = tile_coord_bounds(pool, &rs_table).await? else {
                    continue;
                };
                let zoom = zoom_of_table(table);
                let corner_bounds = tile_bounds(TileId::new(min_x as u32, min_y as u32, zoom));
                let sample = fetch_successful_tiles(pool, &rs_table, band).await?;
                let (tile_w, tile_h) = sample.first().map(|t| (t.width, t.height)).unwrap_or((256, 256));

                let pixel_size_x = (corner_bounds.east - corner_bounds.west) / tile_w as f64;
                let pixel_size_y = (corner_bounds.north - corner_bounds.south) / tile_h as f64;
                let transform = GeoTransform::from_corner(corner_bounds.west, corner_bounds.north, pixel_size_x, pixel_size_y);

                let map_width = (max_x - min_x + 1) as u32 * tile_w;
                let map_height = (max_y - min_y + 1) as u32 * tile_h;

                let outcome = run_mask_crop(
                    pool,
                    table,
                    band,
                    &canvas_path,
                    map_width,
                    map_height,
                    task_info.channels,
                    task_info.dtype,
                    polygon,
                    &transform,
                    DEFAULT_BLOCK_SIZE,
                )
                .await?;

                self.write_output_files(table, band, task_info.channels, task_info.dtype, &outcome)?;
                let _ = std::fs::remove_file(&canvas_path);
            }
        }
        Ok(())
    }

    fn write_output_files(&self, table: &str, band: &Band, channels: u8, dtype: DType, outcome: &terra_maskcrop::CropOutcome) -> Result<()> {
        let geotif_dir = self.config.geotif_dir();
        let suffix = shard_suffix(table);
        let mut stem = self.config.taskname.clone();
        stem.push('_');
        stem.push_str(&self.config.source);
        if let Some(s) = &suffix {
            stem.push('_');
            stem.push_str(s);
        }
        if let Some(b) = band {
            stem.push('_');
            stem.push_str(b);
        }

        let tif_path = geotif_dir.join(format!("{stem}.tif"));
        let tfw_path = geotif_dir.join(format!("{stem}.tfw"));
        let prj_path = geotif_dir.join(format!("{stem}.prj"));
        let readme_path = geotif_dir.join("readme.txt");

        let (out_channels, out_dtype) = if outcome.is_empty_image { (3, DType::U8) } else { (channels, dtype) };
        write_geotiff(&tif_path, &outcome.pixels, outcome.width, outcome.height, out_channels, out_dtype)?;

        let pixel_width = (outcome.bottom_right.0 - outcome.top_left.0) / outcome.width.max(1) as f64;
        let pixel_height = (outcome.top_left.1 - outcome.bottom_right.1) / outcome.height.max(1) as f64;
        write_world_file(&tfw_path, pixel_width, pixel_height, outcome.top_left.0, outcome.top_left.1)?;
        write_prj_file(&prj_path)?;

        if outcome.is_empty_image {
            write_empty_readme(&readme_path)?;
        } else {
            write_readme(
                &readme_path,
                &ReadmeInfo {
                    source: &self.config.source,
                    scale_meters: self.config.scale_meters,
                    region_name: &self.config.taskname,
                    start_date: &self.config.start_date,
                    end_date: &self.config.end_date,
                    info_url: IMAGERY_ENDPOINT_BASE,
                    top_left: outcome.top_left,
                    bottom_right: outcome.bottom_right,
                },
            )?;
        }
        Ok(())
    }

    fn write_shapefile(&self, polygon: &MultiPolygon<f64>) -> Result<()> {
        let geotif_dir = self.config.geotif_dir();
        let stem = geotif_dir.join(&self.config.taskname);
        let rings: Vec<Vec<(f64, f64)>> = polygon
            .0
            .iter()
            .map(|poly| poly.exterior().0.iter().map(|c| (c.x, c.y)).collect())
            .collect();
        if rings.is_empty() {
            bail!("polygon has no rings to export");
        }
        write_polygon_shapefile(&stem, &rings)
    }
}

fn zoom_of_table(table: &str) -> u8 {
    table.strip_prefix("tiles_").and_then(|rest| rest.split('_').next()).and_then(|s| s.parse().ok()).unwrap_or(0)
}

fn shard_suffix(table: &str) -> Option<String> {
    table.split("_part_").nth(1).map(|s| s.to_string())
}

/// Buffers enumerated tiles and writes every band's row for each one into
/// the task store (spec §4.4 "flushed into the task database").
struct StoreSink<'a> {
    pool: &'a SqlitePool,
    table: String,
    bands: Vec<Band>,
    width: u32,
    height: u32,
    buffer: Vec<NewTile>,
}

impl<'a> StoreSink<'a> {
    fn drain(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.buffer);
        block_on(insert_tiles_batch(self.pool, &self.table, &rows))
    }
}

impl<'a> EnumerationSink for StoreSink<'a> {
    fn flush(&mut self, tiles: &[TileId]) -> Result<()> {
        for &tile in tiles {
            let geometry_wkt = ring_wkt(&terra_shared::geometry::buffered_tile_polygon(tile));
            for band in &self.bands {
                self.buffer.push(NewTile { id: tile, band: band.clone(), geometry_wkt: geometry_wkt.clone(), width: self.width, height: self.height });
            }
        }
        if self.buffer.len() >= terra_shared::config::ENUMERATE_FLUSH_BATCH {
            self.drain()?;
        }
        Ok(())
    }
}

/// `EnumerationSink::flush` is synchronous (spec §4.4 keeps the descent
/// algorithm pure); the store write is async. Blocking on the current
/// Tokio runtime here mirrors how the teacher's own sync FFI boundaries
/// bridge into async code.
fn block_on<F: std::future::Future<Output = Result<()>>>(fut: F) -> Result<()> {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_suffix_extracts_the_part_index() {
        assert_eq!(shard_suffix("tiles_14"), None);
        assert_eq!(shard_suffix("tiles_14_part_3"), Some("3".to_string()));
    }

    #[test]
    fn zoom_of_table_parses_plain_and_sharded_names() {
        assert_eq!(zoom_of_table("tiles_12"), 12);
        assert_eq!(zoom_of_table("tiles_12_part_1"), 12);
    }
}
