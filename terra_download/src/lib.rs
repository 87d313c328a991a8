//! Concurrent tile fetch → normalize → persist (spec §4.5, component C5).

pub mod cancellation;
pub mod fetch;
pub mod normalize;
pub mod provider;
pub mod worker;
pub mod zoomprobe;

pub use cancellation::CancellationFlag;
pub use worker::{run_download_stage, DownloadContext};
pub use zoomprobe::{probe_download_zoom, ZoomProbeResult};
