//! Block tiling of the stitched canvas (spec §4.7 "Tiling").

use terra_store::progress_tables::CropBlock;

/// Divides a `map_width × map_height` canvas into `block_size`-edge blocks,
/// row-major, with the last row/column clipped to the canvas edge.
pub fn blocks_for_canvas(map_width: u32, map_height: u32, block_size: u32) -> Vec<CropBlock> {
    let mut blocks = Vec::new();
    let mut y = 0;
    while y < map_height {
        let y_end = (y + block_size).min(map_height);
        let mut x = 0;
        while x < map_width {
            let x_end = (x + block_size).min(map_width);
            blocks.push(CropBlock { x, y, x_end, y_end });
            x = x_end;
        }
        y = y_end;
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiple_tiles_cleanly() {
        let blocks = blocks_for_canvas(4096, 2048, 2048);
        assert_eq!(blocks.len(), 4);
    }

    #[test]
    fn ragged_edge_clips_the_last_block() {
        let blocks = blocks_for_canvas(3000, 1000, 2048);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].x_end, 3000);
    }
}
