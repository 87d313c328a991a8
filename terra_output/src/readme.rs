//! Human-readable summary sidecar (spec §4.8 "Readme: plain text recording
//! data source, scale, region name, date range, info URL, geographic
//! bounds, or a single error line if the output is empty").

use anyhow::Result;
use std::path::Path;

pub struct ReadmeInfo<'a> {
    pub source: &'a str,
    pub scale_meters: u32,
    pub region_name: &'a str,
    pub start_date: &'a str,
    pub end_date: &'a str,
    pub info_url: &'a str,
    pub top_left: (f64, f64),
    pub bottom_right: (f64, f64),
}

pub fn write_readme(path: &Path, info: &ReadmeInfo) -> Result<()> {
    let body = format!(
        "data source: {}\nscale (meters): {}\nregion: {}\ndate range: {} to {}\ninfo url: {}\n\
         top-left (lon, lat): {:.6}, {:.6}\nbottom-right (lon, lat): {:.6}, {:.6}\n",
        info.source,
        info.scale_meters,
        info.region_name,
        info.start_date,
        info.end_date,
        info.info_url,
        info.top_left.0,
        info.top_left.1,
        info.bottom_right.0,
        info.bottom_right.1,
    );
    std::fs::write(path, body)?;
    Ok(())
}

/// Written in place of [`write_readme`] when the polygon didn't overlap the
/// canvas at all (spec §4.7 "Final crop", §8 scenario 6).
pub fn write_empty_readme(path: &Path) -> Result<()> {
    std::fs::write(path, "error: requested region does not overlap any downloaded imagery\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readme_carries_the_expected_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme.txt");
        write_readme(
            &path,
            &ReadmeInfo {
                source: "terrain",
                scale_meters: 30,
                region_name: "test-region",
                start_date: "2020-01-01",
                end_date: "2020-12-31",
                info_url: "https://example.com/terrain",
                top_left: (10.0, 50.0),
                bottom_right: (11.0, 49.0),
            },
        )
        .unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("data source: terrain"));
        assert!(contents.contains("scale (meters): 30"));
    }

    #[test]
    fn empty_readme_is_a_single_error_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme.txt");
        write_empty_readme(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.starts_with("error:"));
    }
}
