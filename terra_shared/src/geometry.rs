//! Web-Mercator tile geometry (spec §4.1, component C1).

use crate::model::TileId;
use geo::{BoundingRect, Coord, MultiPolygon, Polygon, Rect};
use std::f64::consts::PI;

/// `(west, south, east, north)` in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LonLatBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl LonLatBounds {
    pub fn to_rect(self) -> Rect<f64> {
        Rect::new(
            Coord { x: self.west, y: self.south },
            Coord { x: self.east, y: self.north },
        )
    }

    pub fn to_polygon(self) -> Polygon<f64> {
        self.to_rect().to_polygon()
    }

    pub fn buffered(self, distance_deg: f64) -> LonLatBounds {
        LonLatBounds {
            west: self.west - distance_deg,
            south: self.south - distance_deg,
            east: self.east + distance_deg,
            north: self.north + distance_deg,
        }
    }
}

/// Unbuffered tile rectangle in lon/lat degrees (spec §4.1).
pub fn tile_bounds(tile: TileId) -> LonLatBounds {
    let n = 2f64.powi(tile.z as i32);
    let west = tile.x as f64 / n * 360.0 - 180.0;
    let east = (tile.x + 1) as f64 / n * 360.0 - 180.0;
    let north = lat_from_tile_y(tile.y, n);
    let south = lat_from_tile_y(tile.y + 1, n);
    LonLatBounds { west, south, east, north }
}

fn lat_from_tile_y(y: u32, n: f64) -> f64 {
    let rad = (PI * (1.0 - 2.0 * y as f64 / n)).sinh().atan();
    rad.to_degrees()
}

/// Zoom-keyed buffer distance in degrees (spec §4.1). Tiles outside this
/// table (z < 10 or z > 21) are not targets the enumerator ever produces,
/// since the download-zoom probe starts at z=10.
pub fn buffer_distance_deg(z: u8) -> f64 {
    match z {
        10 => 0.0018,
        11 => 0.0006,
        12 => 0.00048,
        13 => 0.00024,
        14 => 0.00012,
        15 => 0.00006,
        16 => 0.00003,
        17 => 0.000012,
        18 => 0.000006,
        19 => 0.0000036,
        20 => 0.0000018,
        21 => 0.0000006,
        _ => 0.0018,
    }
}

/// The tile's buffered footprint (spec §4.1 "buffered tile geometry").
/// This is what gets persisted in the task database and requested from the
/// imagery provider so fetched arrays overlap neighbors.
pub fn buffered_tile_polygon(tile: TileId) -> Polygon<f64> {
    tile_bounds(tile).buffered(buffer_distance_deg(tile.z)).to_polygon()
}

pub fn tile_polygon(tile: TileId) -> Polygon<f64> {
    tile_bounds(tile).to_polygon()
}

/// Lon/lat to tile index at zoom `z` (inverse of [`tile_bounds`]).
pub fn lonlat_to_tile(lon_deg: f64, lat_deg: f64, z: u8) -> (u32, u32) {
    let lat_rad = lat_deg.to_radians();
    let n = 2f64.powi(z as i32);
    let x = ((lon_deg + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();
    let max_idx = n - 1.0;
    (x.clamp(0.0, max_idx) as u32, y.clamp(0.0, max_idx) as u32)
}

/// Tile index range covering a lon/lat bounding rectangle at zoom `z`
/// (spec §4.4 "Fast path" / z=1 seeding).
pub fn tile_range_for_bounds(bounds: LonLatBounds, z: u8) -> (u32, u32, u32, u32) {
    let (x0, y0) = lonlat_to_tile(bounds.west, bounds.north, z);
    let (x1, y1) = lonlat_to_tile(bounds.east, bounds.south, z);
    (x0.min(x1), x1.max(x0), y0.min(y1), y1.max(y0))
}

pub fn bounding_rect_of(polygon: &MultiPolygon<f64>) -> Option<Rect<f64>> {
    polygon.bounding_rect()
}

/// Formats a single-ring, no-hole polygon as `POLYGON((...))` WKT. Used for
/// the tile rectangles this crate hands to the imagery provider and to the
/// task store — always simple rectangles, never worth pulling in a
/// general-purpose WKT writer for.
pub fn ring_wkt(polygon: &Polygon<f64>) -> String {
    let pts: Vec<String> = polygon.exterior().0.iter().map(|c| format!("{} {}", c.x, c.y)).collect();
    format!("POLYGON(({}))", pts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_bounds_z0_cover_the_world() {
        let b = tile_bounds(TileId::new(0, 0, 0));
        assert!((b.west - -180.0).abs() < 1e-9);
        assert!((b.east - 180.0).abs() < 1e-9);
        assert!(b.north > 85.0);
        assert!(b.south < -85.0);
    }

    #[test]
    fn lonlat_roundtrips_through_tile_index() {
        let z = 12;
        let (x, y) = lonlat_to_tile(-78.5, 43.0, z);
        let b = tile_bounds(TileId::new(x, y, z));
        assert!(b.west <= -78.5 && -78.5 <= b.east);
        assert!(b.south <= 43.0 && 43.0 <= b.north);
    }

    #[test]
    fn buffer_grows_the_rectangle() {
        let tile = TileId::new(100, 200, 14);
        let plain = tile_bounds(tile);
        let buffered = plain.buffered(buffer_distance_deg(14));
        assert!(buffered.west < plain.west);
        assert!(buffered.east > plain.east);
    }

    #[test]
    fn children_are_the_four_z_plus_one_quadrants() {
        let kids = TileId::new(5, 9, 3).children();
        assert_eq!(kids[0], TileId::new(10, 18, 4));
        assert_eq!(kids[3], TileId::new(11, 19, 4));
    }
}
