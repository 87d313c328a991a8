//! CPU mask/crop path (spec §4.7 "CPU path": build block geo-transform,
//! rasterize mask, in-place zero, update extremum).

use crate::geotransform::GeoTransform;
use crate::rasterize::rasterize_block;
use geo::MultiPolygon;
use terra_store::progress_tables::CropBlock;

/// Per-block outcome: the tight bounding box (in canvas-global pixel
/// coordinates) of pixels the mask kept, if any survived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockExtremum {
    pub ymin: i64,
    pub ymax: i64,
    pub xmin: i64,
    pub xmax: i64,
}

/// Zeroes every pixel in `buf` (row-major, `block.y_end - block.y` rows by
/// `block.x_end - block.x` columns, `elem_size` bytes per pixel, full-canvas
/// row stride `canvas_row_stride` bytes) that falls outside `polygon`, and
/// returns the bounding box of the pixels kept.
pub fn process_block_cpu(
    buf: &mut [u8],
    canvas_row_stride: usize,
    block: CropBlock,
    elem_size: usize,
    polygon: &MultiPolygon<f64>,
    canvas_transform: &GeoTransform,
) -> Option<BlockExtremum> {
    let width = block.x_end - block.x;
    let height = block.y_end - block.y;
    let block_transform = canvas_transform.for_block(block.x, block.y);
    let mask = rasterize_block(polygon, &block_transform, width, height);

    let mut extremum: Option<BlockExtremum> = None;
    for row in 0..height {
        let row_off = row as usize * canvas_row_stride;
        for col in 0..width {
            let inside = mask[(row * width + col) as usize];
            let px_off = row_off + (block.x as usize + col as usize) * elem_size;
            if !inside {
                buf[px_off..px_off + elem_size].fill(0);
                continue;
            }
            let gy = (block.y + row) as i64;
            let gx = (block.x + col) as i64;
            extremum = Some(match extremum {
                None => BlockExtremum { ymin: gy, ymax: gy + 1, xmin: gx, xmax: gx + 1 },
                Some(e) => BlockExtremum {
                    ymin: e.ymin.min(gy),
                    ymax: e.ymax.max(gy + 1),
                    xmin: e.xmin.min(gx),
                    xmax: e.xmax.max(gx + 1),
                },
            });
        }
    }
    extremum
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn zeroes_pixels_outside_the_polygon_and_tracks_extremum() {
        // 4x4 single-channel canvas, u8; polygon covers the left half only.
        let mut buf = vec![9u8; 16];
        let poly = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: -4.0), (x: 0.0, y: -4.0)];
        let mp = MultiPolygon::new(vec![poly]);
        let gt = GeoTransform::from_corner(0.0, 0.0, 1.0, 1.0);
        let block = CropBlock { x: 0, y: 0, x_end: 4, y_end: 4 };

        let extremum = process_block_cpu(&mut buf, 4, block, 1, &mp, &gt).expect("some pixels kept");
        assert_eq!(extremum.xmin, 0);
        assert!(extremum.xmax <= 2);
        // right half zeroed
        assert_eq!(buf[3], 0);
        // left half untouched
        assert_eq!(buf[0], 9);
    }

    #[test]
    fn second_block_in_a_row_writes_to_its_own_columns() {
        // 4x4 canvas split into two 2-wide blocks; polygon covers the left
        // half only. The second block (x=2) must zero its own columns and
        // leave the first block's output untouched.
        let mut buf = vec![9u8; 16];
        let poly = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: -4.0), (x: 0.0, y: -4.0)];
        let mp = MultiPolygon::new(vec![poly]);
        let gt = GeoTransform::from_corner(0.0, 0.0, 1.0, 1.0);

        let first = CropBlock { x: 0, y: 0, x_end: 2, y_end: 4 };
        process_block_cpu(&mut buf, 4, first, 1, &mp, &gt);
        let second = CropBlock { x: 2, y: 0, x_end: 4, y_end: 4 };
        let extremum = process_block_cpu(&mut buf, 4, second, 1, &mp, &gt);

        assert!(extremum.is_none());
        // first block's columns (0, 1) survive in every row
        assert_eq!(buf[0], 9);
        assert_eq!(buf[1], 9);
        // second block's columns (2, 3) are zeroed, not the first block's
        assert_eq!(buf[2], 0);
        assert_eq!(buf[3], 0);
    }

    #[test]
    fn no_overlap_returns_none() {
        let mut buf = vec![9u8; 16];
        let poly = polygon![(x: 100.0, y: 100.0), (x: 101.0, y: 100.0), (x: 101.0, y: 99.0), (x: 100.0, y: 99.0)];
        let mp = MultiPolygon::new(vec![poly]);
        let gt = GeoTransform::from_corner(0.0, 0.0, 1.0, 1.0);
        let block = CropBlock { x: 0, y: 0, x_end: 4, y_end: 4 };

        let extremum = process_block_cpu(&mut buf, 4, block, 1, &mp, &gt);
        assert!(extremum.is_none());
        assert!(buf.iter().all(|&b| b == 0));
    }
}
