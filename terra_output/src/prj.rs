//! Projection sidecar (spec §4.8 "Projection file (.prj): the fixed WGS84
//! geographic-CS WKT").

use anyhow::Result;
use std::path::Path;

pub const WGS84_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]"#;

pub fn write_prj_file(path: &Path) -> Result<()> {
    std::fs::write(path, WGS84_WKT)?;
    Ok(())
}
