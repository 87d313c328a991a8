//! Optional shapefile export (spec §4.8 "Optional shapefile: if requested,
//! write the polygon as a WGS84 shapefile and zip the four/five component
//! files together").

use anyhow::Result;
use shapefile::dbase::{FieldValue, Record, TableWriterBuilder};
use shapefile::{Point, Polygon, PolygonRing};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;

use crate::prj::WGS84_WKT;

/// Writes `<stem>.shp/.shx/.dbf/.prj` for a single polygon (rings in
/// `(lon, lat)` order) next to `stem`, then zips all four into
/// `<stem>_shp.zip`, matching the output layout's optional
/// `<taskname>_shp.zip`.
pub fn write_polygon_shapefile(stem: &Path, rings: &[Vec<(f64, f64)>]) -> Result<()> {
    let shp_path = stem.with_extension("shp");
    write_shp_dbf(&shp_path, rings)?;

    let prj_path = stem.with_extension("prj");
    std::fs::write(&prj_path, WGS84_WKT)?;

    let zip_path = stem.with_file_name(format!(
        "{}_shp.zip",
        stem.file_stem().and_then(|s| s.to_str()).unwrap_or("region")
    ));
    zip_components(&zip_path, stem)?;
    Ok(())
}

fn write_shp_dbf(shp_path: &Path, rings: &[Vec<(f64, f64)>]) -> Result<()> {
    let polygon = Polygon::new(
        rings
            .iter()
            .map(|ring| PolygonRing::Outer(ring.iter().map(|&(x, y)| Point::new(x, y)).collect()))
            .collect::<Vec<_>>(),
    );

    let table_builder = TableWriterBuilder::new().add_character_field("id".try_into().unwrap(), 10);
    let mut writer = shapefile::Writer::from_path_with_info(shp_path, table_builder)?;

    let mut record = Record::default();
    record.insert("id".to_string(), FieldValue::Character(Some("1".to_string())));
    writer.write_shape_and_record(&polygon, &record)?;
    Ok(())
}

fn zip_components(zip_path: &Path, stem: &Path) -> Result<()> {
    let file = File::create(zip_path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for ext in ["shp", "shx", "dbf", "prj"] {
        let part = stem.with_extension(ext);
        if !part.exists() {
            continue;
        }
        let mut buf = Vec::new();
        File::open(&part)?.read_to_end(&mut buf)?;
        let name = part.file_name().and_then(|n| n.to_str()).unwrap_or(ext);
        zip.start_file(name, options)?;
        zip.write_all(&buf)?;
    }
    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_shp_shx_dbf_and_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("region");
        let rings = vec![vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]];
        write_polygon_shapefile(&stem, &rings).unwrap();

        assert!(stem.with_extension("shp").exists());
        assert!(stem.with_extension("dbf").exists());
        assert!(dir.path().join("region_shp.zip").exists());
    }
}
