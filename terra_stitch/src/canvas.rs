//! Memory-mapped output canvas for one `(table, band)` pair (spec §4.6
//! steps 1-2).

use anyhow::Result;
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::Path;
use terra_shared::model::DType;

/// A writable raster canvas backed by a flat temp file, row-major
/// `(map_height, map_width, channels)` with `dtype`-sized elements.
pub struct Canvas {
    pub min_x: i64,
    pub min_y: i64,
    pub tile_w: u32,
    pub tile_h: u32,
    pub map_width: u32,
    pub map_height: u32,
    pub channels: u8,
    pub dtype: DType,
    mmap: MmapMut,
    since_flush: usize,
}

impl Canvas {
    /// Opens (creating if absent) the backing file at `path`, growing it to
    /// the full canvas size if it was just created. An existing non-empty
    /// file is reused as-is so a resumed run picks up prior placements
    /// (spec §4.6 step 2 "If the file already exists and is non-empty,
    /// resume").
    pub fn open(path: &Path, min_x: i64, min_y: i64, tile_w: u32, tile_h: u32, map_width: u32, map_height: u32, channels: u8, dtype: DType) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        let len = map_width as u64 * map_height as u64 * channels as u64 * dtype.size_of() as u64;
        if file.metadata()?.len() != len {
            file.set_len(len)?;
        }
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            min_x,
            min_y,
            tile_w,
            tile_h,
            map_width,
            map_height,
            channels,
            dtype,
            mmap,
            since_flush: 0,
        })
    }

    fn row_stride(&self) -> usize {
        self.map_width as usize * self.channels as usize * self.dtype.size_of()
    }

    /// Places `pixels` (row-major, already halo-trimmed, `channels`-wide
    /// elements of `self.dtype`) at the tile grid position `(x, y)`, clamped
    /// to canvas bounds (spec §4.6 step 3).
    pub fn place(&mut self, x: i64, y: i64, width: u32, height: u32, pixels: &[u8]) {
        let elem = self.channels as usize * self.dtype.size_of();
        let start_y = ((y - self.min_y) as i64 * self.tile_h as i64).max(0) as u32;
        let start_x = ((x - self.min_x) as i64 * self.tile_w as i64).max(0) as u32;
        let copy_w = width.min(self.map_width.saturating_sub(start_x));
        let copy_h = height.min(self.map_height.saturating_sub(start_y));
        let src_stride = width as usize * elem;
        let dst_stride = self.row_stride();
        for row in 0..copy_h as usize {
            let src_off = row * src_stride;
            let dst_off = (start_y as usize + row) * dst_stride + start_x as usize * elem;
            let n = copy_w as usize * elem;
            self.mmap[dst_off..dst_off + n].copy_from_slice(&pixels[src_off..src_off + n]);
        }
        self.since_flush += 1;
    }

    /// Flushes the mmap to disk if [`terra_shared::config::STITCH_FLUSH_EVERY`]
    /// placements have accumulated since the last flush (spec §4.6 step 4).
    pub fn maybe_flush(&mut self) -> Result<()> {
        if self.since_flush >= terra_shared::config::STITCH_FLUSH_EVERY {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.mmap.flush()?;
        self.since_flush = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_writes_into_the_right_grid_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvas.bin");
        let mut canvas = Canvas::open(&path, 10, 20, 2, 2, 4, 4, 1, DType::U8).unwrap();

        // tile at (x=11, y=21) is grid cell (1, 1): starts at row 2, col 2.
        canvas.place(11, 21, 2, 2, &[9, 9, 9, 9]);
        canvas.flush().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes[2 * 4 + 2], 9);
        assert_eq!(bytes[0], 0);
    }

    #[test]
    fn resuming_reuses_the_existing_file_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvas.bin");
        {
            let mut c = Canvas::open(&path, 0, 0, 2, 2, 4, 4, 1, DType::U8).unwrap();
            c.place(0, 0, 2, 2, &[1, 1, 1, 1]);
            c.flush().unwrap();
        }
        let c2 = Canvas::open(&path, 0, 0, 2, 2, 4, 4, 1, DType::U8).unwrap();
        assert_eq!(c2.map_width * c2.map_height, 16);
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes[0], 1);
    }
}
