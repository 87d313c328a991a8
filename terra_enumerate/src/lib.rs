//! Tile enumeration (spec §4.4, component C4): given a polygon and a set of
//! target zooms, compute the exact set of tiles to download via a
//! rectangle fast path or a recursive quadtree descent.

pub mod descent;
pub mod polygon;

pub use descent::{enumerate_tiles, EnumerationSink};
pub use polygon::{is_rectangle, parse_polygon_wkt};
