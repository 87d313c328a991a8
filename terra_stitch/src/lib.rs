//! Tile stitching into per-(table, band) raster canvases (spec §4.6,
//! component C6).

pub mod canvas;
pub mod place;

pub use canvas::Canvas;
pub use place::{stitch_table, temp_canvas_path};
