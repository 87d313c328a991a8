use terra_shared::model::{Band, Source};

/// The provider's own "area too large" signal (spec §4.1, §7), looked for
/// verbatim in a non-2xx response body.
pub const AREA_TOO_LARGE_MARKER: &str = "must be less than or equal to";

/// Whether a source's responses are a raw single/few-channel raster array
/// (headers describe shape/dtype, body is the packed buffer) or an encoded
/// RGB image the client must decode (spec §9 "tagged-variant enum whose
/// variants encode ... band semantics").
pub fn is_raster(source: Source) -> bool {
    matches!(source, Source::Terrain)
}

/// Builds the imagery request URL for one tile fetch (spec §4.1 probing,
/// §4.5 step 1). `geometry_wkt` is the buffered or unbuffered tile
/// rectangle depending on the caller's purpose.
pub fn build_tile_url(
    endpoint_base: &str,
    source: Source,
    project_id: &str,
    start_date: &str,
    end_date: &str,
    scale_meters: u32,
    band: &Band,
    geometry_wkt: &str,
) -> String {
    let mut url = format!(
        "{base}/v1/projects/{project}/sources/{source}/render?start={start}&end={end}&scale={scale}",
        base = endpoint_base,
        project = project_id,
        source = source.as_str(),
        start = start_date,
        end = end_date,
        scale = scale_meters,
    );
    if let Some(b) = band {
        url.push_str(&format!("&band={b}"));
    }
    url.push_str(&format!("&region={}", urlencode(geometry_wkt)));
    url
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terrain_is_the_only_raster_source() {
        assert!(is_raster(Source::Terrain));
        assert!(!is_raster(Source::LandCover));
        assert!(!is_raster(Source::WaterHistory));
        assert!(!is_raster(Source::Climate));
    }

    #[test]
    fn url_carries_band_and_encoded_region() {
        let url = build_tile_url(
            "https://imagery.example",
            Source::LandCover,
            "proj-1",
            "2024-01-01",
            "2024-06-01",
            30,
            &Some("red".to_string()),
            "POLYGON((0 0,1 0,1 1,0 1,0 0))",
        );
        assert!(url.contains("band=red"));
        assert!(url.contains("region=POLYGON"));
        assert!(!url.contains(' '));
    }
}
