//! GeoTIFF + sidecar output writing (spec §4.8, component C8).

pub mod geotiff;
pub mod prj;
pub mod readme;
pub mod shapefile_out;
pub mod worldfile;

pub use geotiff::write_geotiff;
pub use prj::write_prj_file;
pub use readme::{write_empty_readme, write_readme, ReadmeInfo};
pub use shapefile_out::write_polygon_shapefile;
pub use worldfile::write_world_file;
