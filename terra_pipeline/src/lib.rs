//! Single-task orchestration across every other crate (spec §4.9,
//! component C9): enumerate, download, stitch, mask/crop, and write output,
//! resumable via a per-task XML milestone sidecar.

pub mod controller;
pub mod milestone;

pub use controller::PipelineController;
pub use milestone::MilestoneState;
pub use terra_download::CancellationFlag;
