use crate::polygon::is_rectangle;
use anyhow::Result;
use geo::{BoundingRect, Contains, Intersects, MultiPolygon};
use terra_shared::config::ENUMERATE_FLUSH_BATCH;
use terra_shared::geometry::{tile_polygon, tile_range_for_bounds, LonLatBounds};
use terra_shared::model::TileId;

/// Receives batches of enumerated tiles (spec §4.4: "every 50,000 tiles the
/// buffer is flushed into the task database"). Kept generic over the sink
/// so the descent algorithm itself stays pure and independently testable;
/// `terra_pipeline` wires a sink that writes through `terra_store`.
pub trait EnumerationSink {
    fn flush(&mut self, tiles: &[TileId]) -> Result<()>;
}

/// Enumerates every tile at `target_zooms` whose footprint intersects
/// `polygon` (spec §4.4). Returns the total tile count emitted.
pub fn enumerate_tiles(
    polygon: &MultiPolygon<f64>,
    target_zooms: &[u8],
    sink: &mut dyn EnumerationSink,
) -> Result<u64> {
    if is_rectangle(polygon) {
        return enumerate_rectangle(polygon, target_zooms, sink);
    }
    enumerate_quadtree(polygon, target_zooms, sink)
}

fn bounds_of(polygon: &MultiPolygon<f64>) -> LonLatBounds {
    let rect = polygon.bounding_rect().expect("non-empty polygon");
    LonLatBounds {
        west: rect.min().x,
        south: rect.min().y,
        east: rect.max().x,
        north: rect.max().y,
    }
}

struct Batcher<'a> {
    sink: &'a mut dyn EnumerationSink,
    buf: Vec<TileId>,
    total: u64,
}

impl<'a> Batcher<'a> {
    fn new(sink: &'a mut dyn EnumerationSink) -> Self {
        Self { sink, buf: Vec::with_capacity(ENUMERATE_FLUSH_BATCH), total: 0 }
    }

    fn push(&mut self, tile: TileId) -> Result<()> {
        self.buf.push(tile);
        self.total += 1;
        if self.buf.len() >= ENUMERATE_FLUSH_BATCH {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.sink.flush(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }

    fn finish(mut self) -> Result<u64> {
        self.flush()?;
        Ok(self.total)
    }
}

/// Fast path (spec §4.4): the polygon equals its own bounding rectangle, so
/// every tile in the index range at each target zoom is a member — no
/// geometric test needed per tile.
fn enumerate_rectangle(
    polygon: &MultiPolygon<f64>,
    target_zooms: &[u8],
    sink: &mut dyn EnumerationSink,
) -> Result<u64> {
    let bounds = bounds_of(polygon);
    let mut batcher = Batcher::new(sink);
    for &z in target_zooms {
        let (x0, x1, y0, y1) = tile_range_for_bounds(bounds, z);
        for x in x0..=x1 {
            for y in y0..=y1 {
                batcher.push(TileId::new(x, y, z))?;
            }
        }
    }
    batcher.finish()
}

/// General path (spec §4.4): recursive quadtree descent seeded at `z=1`.
fn enumerate_quadtree(
    polygon: &MultiPolygon<f64>,
    target_zooms: &[u8],
    sink: &mut dyn EnumerationSink,
) -> Result<u64> {
    let max_target = *target_zooms.iter().max().expect("at least one target zoom");
    let bounds = bounds_of(polygon);
    let (x0, x1, y0, y1) = tile_range_for_bounds(bounds, 1);

    let mut work: Vec<TileId> = Vec::new();
    for x in x0..=x1 {
        for y in y0..=y1 {
            work.push(TileId::new(x, y, 1));
        }
    }

    let mut batcher = Batcher::new(sink);
    while let Some(tile) = work.pop() {
        let tile_geom = tile_polygon(tile);

        if !polygon.intersects(&tile_geom) {
            continue;
        }

        if polygon.contains(&tile_geom) {
            for &z_t in target_zooms {
                emit_descendants(tile, z_t, &mut batcher)?;
            }
            continue;
        }

        // partial overlap
        if target_zooms.contains(&tile.z) {
            batcher.push(tile)?;
        }
        if tile.z + 1 <= max_target {
            for child in tile.children() {
                work.push(child);
            }
        }
    }
    batcher.finish()
}

/// Emits every descendant of `tile` at `target_z` (spec §4.4: "emit every
/// descendant tile at each target zoom level ... without further geometric
/// tests"). A no-op if `target_z < tile.z`; emits `tile` itself if equal.
fn emit_descendants(tile: TileId, target_z: u8, batcher: &mut Batcher) -> Result<()> {
    if target_z < tile.z {
        return Ok(());
    }
    let span = 1u32 << (target_z - tile.z);
    let base_x = tile.x * span;
    let base_y = tile.y * span;
    for dx in 0..span {
        for dy in 0..span {
            batcher.push(TileId::new(base_x + dx, base_y + dy, target_z))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polygon::parse_polygon_wkt;
    use std::collections::HashSet;

    struct VecSink(Vec<TileId>);
    impl EnumerationSink for VecSink {
        fn flush(&mut self, tiles: &[TileId]) -> Result<()> {
            self.0.extend_from_slice(tiles);
            Ok(())
        }
    }

    #[test]
    fn rectangle_fast_path_counts_match_bbox_grid() {
        let poly = parse_polygon_wkt("POLYGON((100 30, 105 30, 105 35, 100 35, 100 30))").unwrap();
        let mut sink = VecSink(Vec::new());
        let total = enumerate_tiles(&poly, &[10], &mut sink).unwrap();
        assert_eq!(total as usize, sink.0.len());
        let unique: HashSet<_> = sink.0.iter().copied().collect();
        assert_eq!(unique.len(), sink.0.len(), "no duplicate tiles");
        assert!(total > 0);
    }

    #[test]
    fn donut_drops_tiles_fully_inside_the_hole() {
        // outer ring 1 degree square, inner ring 0.4 degree square, centered
        let wkt = "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0), (0.3 0.3, 0.7 0.3, 0.7 0.7, 0.3 0.7, 0.3 0.3))";
        let poly = parse_polygon_wkt(wkt).unwrap();
        let mut sink = VecSink(Vec::new());
        let total = enumerate_tiles(&poly, &[10], &mut sink).unwrap();
        assert!(total > 0);

        // a tile whose footprint sits entirely inside the inner hole must
        // not have been emitted.
        use terra_shared::geometry::lonlat_to_tile;
        let (hx, hy) = lonlat_to_tile(0.5, 0.5, 10);
        let hole_tile = TileId::new(hx, hy, 10);
        assert!(!sink.0.contains(&hole_tile));
    }

    #[test]
    fn multipolygon_disjoint_parts_produce_disjoint_tiles() {
        let wkt = "MULTIPOLYGON(((0 0, 0.2 0, 0.2 0.2, 0 0.2, 0 0)), ((5 5, 5.2 5, 5.2 5.2, 5 5.2, 5 5)))";
        let poly = parse_polygon_wkt(wkt).unwrap();
        let mut sink = VecSink(Vec::new());
        enumerate_tiles(&poly, &[10], &mut sink).unwrap();

        use terra_shared::geometry::lonlat_to_tile;
        let (gx, gy) = lonlat_to_tile(2.5, 2.5, 10);
        let gap_tile = TileId::new(gx, gy, 10);
        assert!(!sink.0.contains(&gap_tile));
    }

    #[test]
    fn enumeration_is_deterministic() {
        let wkt = "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0), (0.3 0.3, 0.7 0.3, 0.7 0.7, 0.3 0.7, 0.3 0.3))";
        let poly = parse_polygon_wkt(wkt).unwrap();
        let mut a = VecSink(Vec::new());
        let mut b = VecSink(Vec::new());
        enumerate_tiles(&poly, &[10], &mut a).unwrap();
        enumerate_tiles(&poly, &[10], &mut b).unwrap();
        let sa: HashSet<_> = a.0.into_iter().collect();
        let sb: HashSet<_> = b.0.into_iter().collect();
        assert_eq!(sa, sb);
    }
}
