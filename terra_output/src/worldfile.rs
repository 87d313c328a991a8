//! World file sidecar (spec §4.8 "World file (.tfw)").

use anyhow::Result;
use std::path::Path;

/// Writes the six-line ESRI world file format: pixel width, rotation (0),
/// rotation (0), negative pixel height, top-left lon, top-left lat.
pub fn write_world_file(path: &Path, pixel_width: f64, pixel_height: f64, top_left_lon: f64, top_left_lat: f64) -> Result<()> {
    let body = format!("{pixel_width}\n0\n0\n{}\n{top_left_lon}\n{top_left_lat}\n", -pixel_height.abs());
    std::fs::write(path, body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_six_lines_with_negated_pixel_height() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tfw");
        write_world_file(&path, 0.001, 0.001, 10.0, 50.0).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["0.001", "0", "0", "-0.001", "10", "50"]);
    }
}
