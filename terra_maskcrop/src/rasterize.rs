//! Polygon rasterization for one canvas block (spec §4.7 "a rasterized
//! boolean mask is computed against the polygon"). The CPU path tests pixel
//! centers with `geo`'s point-in-polygon predicate rather than hand-rolling
//! the crossing-number scan the GPU kernel uses — same result, no device
//! buffers to manage.

use crate::geotransform::GeoTransform;
use geo::{Contains, Coord, MultiPolygon};

/// Row-major `width × height` mask, `true` where the pixel center falls
/// inside `polygon`.
pub fn rasterize_block(polygon: &MultiPolygon<f64>, transform: &GeoTransform, width: u32, height: u32) -> Vec<bool> {
    let mut mask = vec![false; width as usize * height as usize];
    for row in 0..height {
        for col in 0..width {
            let (lon, lat) = transform.pixel_to_geo(col as f64 + 0.5, row as f64 + 0.5);
            mask[(row * width + col) as usize] = polygon.contains(&Coord { x: lon, y: lat });
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    #[test]
    fn masks_out_everything_beyond_a_unit_square() {
        // Square covering pixel columns/rows 0..5 in a 10x10 degree grid.
        let poly = polygon![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 5.0, y: -5.0), (x: 0.0, y: -5.0)];
        let mp = MultiPolygon::new(vec![poly]);
        let gt = GeoTransform::from_corner(0.0, 0.0, 1.0, 1.0);
        let mask = rasterize_block(&mp, &gt, 10, 10);
        assert!(mask[2 * 10 + 2]);
        assert!(!mask[8 * 10 + 8]);
    }
}
