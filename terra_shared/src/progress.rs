use serde::{Deserialize, Serialize};

/// Snapshot of the shared progress dictionary the controller pushes after
/// every meaningful state change (spec §4.9, §6 "Progress channel").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub download_total: u64,
    pub download_success: u64,
    pub download_fail: u64,
    pub stitch_total: u64,
    pub stitched_tiles: u64,
    pub crop_total: u64,
    pub croped_blocks: u64,
    pub enumerate_exception: Option<String>,
    pub download_exception: Option<String>,
    pub stitch_exception: Option<String>,
    pub crop_exception: Option<String>,
    pub is_calculate_tiles_done: bool,
    pub is_tile_download_done: bool,
    pub is_tile_stitch_done: bool,
}

/// One tuple pushed to the inter-process progress queue (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub progress_info: ProgressInfo,
    pub process_done: bool,
    pub taskname: String,
}
