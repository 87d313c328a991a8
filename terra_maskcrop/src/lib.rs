//! Polygon masking and final crop of the stitched canvas (spec §4.7,
//! component C7).

pub mod block;
pub mod cpu_engine;
pub mod crop;
pub mod geotransform;
pub mod gpu_engine;
pub mod rasterize;

pub use crop::{run_mask_crop, CropOutcome};
pub use geotransform::GeoTransform;
