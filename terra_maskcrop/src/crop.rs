//! Mask/crop controller: tiles the canvas into blocks, masks each one, and
//! produces the final cropped image (spec §4.7 "Tiling", "Final crop").

use crate::block::blocks_for_canvas;
use crate::cpu_engine::process_block_cpu;
use crate::geotransform::GeoTransform;
use anyhow::Result;
use geo::MultiPolygon;
use memmap2::MmapMut;
use sqlx::SqlitePool;
use std::fs::OpenOptions;
use std::path::Path;
use terra_shared::model::{Band, DType};
use terra_store::progress_tables::{
    mark_block_cropped, merge_crop_bounds, read_crop_bounds, uncropped_blocks, upsert_crop_blocks, CropBounds,
};

/// A placeholder returned when the polygon does not overlap the stitched
/// canvas at all (spec §4.7 "Final crop": "a single empty (512, 512, 3)
/// black image with `is_empty_image=true`").
pub const EMPTY_IMAGE_SIDE: u32 = 512;

pub struct CropOutcome {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub is_empty_image: bool,
    /// `(lon, lat)` of the output image's top-left and bottom-right corners.
    pub top_left: (f64, f64),
    pub bottom_right: (f64, f64),
}

/// Masks every uncropped block of `canvas_path` against `polygon`, then
/// slices the canvas down to the tight bounding box of kept pixels.
/// Resumable: blocks already marked `cropped=1` are skipped (spec §4.7
/// "On restart, previously cropped blocks are skipped").
pub async fn run_mask_crop(
    pool: &SqlitePool,
    table: &str,
    band: &Band,
    canvas_path: &Path,
    map_width: u32,
    map_height: u32,
    channels: u8,
    dtype: DType,
    polygon: &MultiPolygon<f64>,
    transform: &GeoTransform,
    block_size: u32,
) -> Result<CropOutcome> {
    let all_blocks = blocks_for_canvas(map_width, map_height, block_size);
    upsert_crop_blocks(pool, table, band, &all_blocks).await?;
    let pending = uncropped_blocks(pool, table, band).await?;

    let elem_size = channels as usize * dtype.size_of();
    let row_stride = map_width as usize * elem_size;

    let file = OpenOptions::new().read(true).write(true).open(canvas_path)?;
    let mut mmap = unsafe { MmapMut::map_mut(&file)? };

    for block in pending {
        let start = block.y as usize * row_stride;
        let block_rows = (block.y_end - block.y) as usize;
        let region = &mut mmap[start..start + block_rows * row_stride];
        if let Some(extremum) = process_block_cpu(region, row_stride, block, elem_size, polygon, transform) {
            merge_crop_bounds(
                pool,
                table,
                band,
                CropBounds {
                    ymin: extremum.ymin,
                    ymax: extremum.ymax,
                    xmin: extremum.xmin,
                    xmax: extremum.xmax,
                },
            )
            .await?;
        }
        mark_block_cropped(pool, table, band, block.x, block.y).await?;
    }
    mmap.flush()?;

    let bounds = read_crop_bounds(pool, table, band).await?;
    Ok(slice_canvas(&mmap, map_width, channels, elem_size, transform, bounds))
}

fn slice_canvas(mmap: &MmapMut, map_width: u32, channels: u8, elem_size: usize, transform: &GeoTransform, bounds: Option<CropBounds>) -> CropOutcome {
    let row_stride = map_width as usize * elem_size;
    match bounds {
        Some(b) if b.ymin < b.ymax && b.xmin < b.xmax => {
            let width = (b.xmax - b.xmin) as u32;
            let height = (b.ymax - b.ymin) as u32;
            let out_stride = width as usize * elem_size;
            let mut pixels = Vec::with_capacity(out_stride * height as usize);
            for row in b.ymin..b.ymax {
                let start = row as usize * row_stride + b.xmin as usize * elem_size;
                pixels.extend_from_slice(&mmap[start..start + out_stride]);
            }
            let top_left = transform.pixel_to_geo(b.xmin as f64, b.ymin as f64);
            let bottom_right = transform.pixel_to_geo(b.xmax as f64, b.ymax as f64);
            CropOutcome { pixels, width, height, is_empty_image: false, top_left, bottom_right }
        }
        _ => CropOutcome {
            pixels: vec![0u8; (EMPTY_IMAGE_SIDE * EMPTY_IMAGE_SIDE * 3) as usize],
            width: EMPTY_IMAGE_SIDE,
            height: EMPTY_IMAGE_SIDE,
            is_empty_image: true,
            top_left: (0.0, 0.0),
            bottom_right: (0.0, 0.0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use terra_store::pool::TaskStore;
    use terra_store::schema::ensure_crop_info;

    async fn setup_store() -> TaskStore {
        let store = TaskStore::open_memory().await.unwrap();
        ensure_crop_info(&store.pool).await.unwrap();
        store
    }

    #[tokio::test]
    async fn crops_to_the_overlapping_region() {
        let store = setup_store().await;
        let dir = tempfile::tempdir().unwrap();
        let canvas_path = dir.path().join("canvas.bin");
        std::fs::write(&canvas_path, vec![7u8; 16]).unwrap(); // 4x4 single-channel

        let poly = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: -4.0), (x: 0.0, y: -4.0)];
        let mp = MultiPolygon::new(vec![poly]);
        let gt = GeoTransform::from_corner(0.0, 0.0, 1.0, 1.0);

        let outcome = run_mask_crop(&store.pool, "tiles_10", &None, &canvas_path, 4, 4, 1, DType::U8, &mp, &gt, 4)
            .await
            .unwrap();

        assert!(!outcome.is_empty_image);
        assert!(outcome.width <= 2);
        assert!(outcome.pixels.iter().all(|&b| b == 7));
    }

    #[tokio::test]
    async fn no_overlap_yields_the_empty_placeholder() {
        let store = setup_store().await;
        let dir = tempfile::tempdir().unwrap();
        let canvas_path = dir.path().join("canvas.bin");
        std::fs::write(&canvas_path, vec![7u8; 16]).unwrap();

        let poly = polygon![(x: 100.0, y: 100.0), (x: 101.0, y: 100.0), (x: 101.0, y: 99.0), (x: 100.0, y: 99.0)];
        let mp = MultiPolygon::new(vec![poly]);
        let gt = GeoTransform::from_corner(0.0, 0.0, 1.0, 1.0);

        let outcome = run_mask_crop(&store.pool, "tiles_11", &None, &canvas_path, 4, 4, 1, DType::U8, &mp, &gt, 4)
            .await
            .unwrap();

        assert!(outcome.is_empty_image);
        assert_eq!((outcome.width, outcome.height), (EMPTY_IMAGE_SIDE, EMPTY_IMAGE_SIDE));
    }
}
