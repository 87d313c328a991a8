use crate::fetch::{fetch_and_decode, FetchOutcome};
use crate::provider::build_tile_url;
use anyhow::{bail, Result};
use reqwest::Client;
use terra_shared::geometry::{buffered_tile_polygon, lonlat_to_tile, ring_wkt};
use terra_shared::model::{Band, DType, Source, TileId};

/// The chosen download zoom plus the unbuffered tile pixel dimensions and
/// channel/dtype shape it fixes for the whole task (spec §4.1 "probing
/// procedure"; `task_info` persists `channels`/`dtype` from this result).
pub struct ZoomProbeResult {
    pub zoom: u8,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub dtype: DType,
}

/// Starting at z=10 (spec §4.1), tries fetching the polygon centroid's
/// tile at increasing zoom until one doesn't trip the provider's area
/// limit. A transport/decode failure is treated as fatal — `get_with_retry`
/// has already exhausted its own retry budget by the time it reaches here.
pub async fn probe_download_zoom(
    client: &Client,
    source: Source,
    endpoint_base: &str,
    project_id: &str,
    start_date: &str,
    end_date: &str,
    scale_meters: u32,
    band: &Band,
    centroid_lon: f64,
    centroid_lat: f64,
) -> Result<ZoomProbeResult> {
    for zoom in 10u8..=21 {
        let (x, y) = lonlat_to_tile(centroid_lon, centroid_lat, zoom);
        let tile = TileId::new(x, y, zoom);
        let wkt = ring_wkt(&buffered_tile_polygon(tile));
        let url = build_tile_url(endpoint_base, source, project_id, start_date, end_date, scale_meters, band, &wkt);

        match fetch_and_decode(client, &url, source, band).await? {
            FetchOutcome::AreaTooLarge => continue,
            FetchOutcome::Tile(tile) => {
                return Ok(ZoomProbeResult {
                    zoom,
                    width: tile.width.saturating_sub(2),
                    height: tile.height.saturating_sub(2),
                    channels: tile.channels,
                    dtype: tile.dtype,
                });
            }
        }
    }
    bail!("no zoom between 10 and 21 satisfied the provider's area limit");
}
