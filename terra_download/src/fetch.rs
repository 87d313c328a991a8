use crate::normalize;
use crate::provider::{self, AREA_TOO_LARGE_MARKER};
use anyhow::{bail, Result};
use reqwest::Client;
use terra_net::{get_with_retry, RetryOutcome};
use terra_shared::model::{Band, DType, Source};

/// One decoded tile pixel buffer, always `u8`-or-wider packed row-major
/// (spec §3 "pixel payload ... shape (rows, cols, channels)").
pub struct DecodedTile {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub dtype: DType,
    pub pixels: Vec<u8>,
}

/// Outcome of a zoom-probe or ordinary fetch: either a decoded tile, or the
/// provider's "too large" signal (spec §4.1, §7).
pub enum FetchOutcome {
    Tile(DecodedTile),
    AreaTooLarge,
}

/// Fetches and fully decodes one tile request (spec §4.5 steps 1-4).
pub async fn fetch_and_decode(client: &Client, url: &str, source: Source, band: &Band) -> Result<FetchOutcome> {
    let outcome = get_with_retry(client, url, AREA_TOO_LARGE_MARKER).await?;
    let bytes = match outcome {
        RetryOutcome::AreaTooLarge => return Ok(FetchOutcome::AreaTooLarge),
        RetryOutcome::Ok(bytes) => bytes,
    };
    let tile = if provider::is_raster(source) {
        decode_raster(&bytes, band)?
    } else {
        decode_image(&bytes)?
    };
    Ok(FetchOutcome::Tile(tile))
}

/// Raster sources (spec §9 tagged-variant enum) return a small fixed header
/// — `width:u32`, `height:u32`, `dtype_code:u8` (`0=u8, 1=u16, 2=f32`), all
/// little-endian — followed by the packed pixel buffer. Out of scope per
/// spec §1 is the provider's actual wire protocol; this is the boundary
/// this workspace owns.
fn decode_raster(bytes: &[u8], band: &Band) -> Result<DecodedTile> {
    const HEADER_LEN: usize = 9;
    if bytes.len() < HEADER_LEN {
        bail!("raster response shorter than the fixed header");
    }
    let width = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let height = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let dtype_code = bytes[8];
    let payload = &bytes[HEADER_LEN..];

    match dtype_code {
        0 => Ok(DecodedTile { width, height, channels: 1, dtype: DType::U8, pixels: payload.to_vec() }),
        1 => Ok(DecodedTile { width, height, channels: 1, dtype: DType::U16, pixels: payload.to_vec() }),
        2 => {
            let floats: Vec<f32> = payload
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                .collect();
            if band.is_none() {
                // spec §4.5 step 3: floating dtype, no explicit band -> normalize to u8.
                let pixels = normalize::normalize8(&floats);
                Ok(DecodedTile { width, height, channels: 1, dtype: DType::U8, pixels })
            } else {
                Ok(DecodedTile { width, height, channels: 1, dtype: DType::F32, pixels: payload.to_vec() })
            }
        }
        other => bail!("unrecognized raster dtype code {other}"),
    }
}

/// Non-raster sources return an encoded RGB image; decode and apply the
/// channel swap (spec §4.5 step 4).
fn decode_image(bytes: &[u8]) -> Result<DecodedTile> {
    let img = image::load_from_memory(bytes)?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut pixels = rgb.into_raw();
    normalize::swap_rgb_bgr(&mut pixels, 3);
    Ok(DecodedTile { width, height, channels: 3, dtype: DType::U8, pixels })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_raster_u8_passes_through() {
        let mut bytes = vec![];
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        let tile = decode_raster(&bytes, &None).unwrap();
        assert_eq!(tile.dtype, DType::U8);
        assert_eq!(tile.pixels, vec![1, 2, 3, 4]);
    }

    #[test]
    fn decode_raster_float_normalizes_when_no_band() {
        let mut bytes = vec![];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(2);
        for v in [0.0f32, 10.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let tile = decode_raster(&bytes, &None).unwrap();
        assert_eq!(tile.dtype, DType::U8);
        assert_eq!(tile.pixels, vec![0, 255]);
    }

    #[test]
    fn decode_raster_float_kept_when_band_selected() {
        let mut bytes = vec![];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(2);
        bytes.extend_from_slice(&42.0f32.to_le_bytes());
        let tile = decode_raster(&bytes, &Some("elevation".to_string())).unwrap();
        assert_eq!(tile.dtype, DType::F32);
    }
}
