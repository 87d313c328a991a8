//! GeoTIFF encoding (spec §4.8 "GeoTIFF: encode the cropped image as a
//! TIFF; channels follow the source's convention").

use anyhow::{bail, Result};
use std::fs::File;
use std::path::Path;
use terra_shared::model::DType;
use tiff::encoder::{colortype, TiffEncoder};

/// Writes `pixels` (row-major, `width × height × channels`, `dtype`-sized
/// elements) as a TIFF at `path`. Supports the channel/dtype combinations
/// this pipeline's sources actually produce: single-band rasters (u8/u16/f32)
/// and RGB/RGBA imagery (u8).
pub fn write_geotiff(path: &Path, pixels: &[u8], width: u32, height: u32, channels: u8, dtype: DType) -> Result<()> {
    let file = File::create(path)?;
    let mut encoder = TiffEncoder::new(file)?;

    match (channels, dtype) {
        (1, DType::U8) => encoder.write_image::<colortype::Gray8>(width, height, pixels)?,
        (1, DType::U16) => encoder.write_image::<colortype::Gray16>(width, height, &as_u16(pixels))?,
        (1, DType::F32) => encoder.write_image::<colortype::GrayF32>(width, height, &as_f32(pixels))?,
        (3, DType::U8) => encoder.write_image::<colortype::RGB8>(width, height, pixels)?,
        (4, DType::U8) => encoder.write_image::<colortype::RGBA8>(width, height, pixels)?,
        (c, d) => bail!("unsupported GeoTIFF channel/dtype combination: {c} channels, {d:?}"),
    }
    Ok(())
}

/// Little-endian byte pairs to `u16`s — the payload is produced by this
/// workspace's own decode path (`terra_download::fetch::decode_raster`),
/// which writes that same order.
fn as_u16(bytes: &[u8]) -> Vec<u16> {
    bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect()
}

fn as_f32(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_combination_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        let err = write_geotiff(&path, &[0u8; 8], 2, 2, 2, DType::U8);
        assert!(err.is_err());
    }
}
