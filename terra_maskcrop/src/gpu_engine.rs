//! Optional GPU-offloaded mask path (spec §4.7 "GPU path (optional)").
//!
//! No device backend is wired into this workspace, so every call returns
//! [`TerraError::GpuUnavailable`] immediately; the controller's fallback to
//! [`crate::cpu_engine::process_block_cpu`] is the path actually exercised.
//! The flattened-polygon shape below documents the contract a real backend
//! would need to satisfy (one upload per task, not per block).

use geo::MultiPolygon;
use terra_shared::error::TerraError;

/// A polygon flattened for upload to device memory once per task: `coords`
/// is the concatenation of every ring's `(x, y)` pairs, `offsets` marks
/// where each ring starts within `coords`, and `vertex_counts` gives each
/// ring's point count.
pub struct FlattenedPolygon {
    pub coords: Vec<(f64, f64)>,
    pub offsets: Vec<usize>,
    pub vertex_counts: Vec<usize>,
}

pub fn flatten_polygon(polygon: &MultiPolygon<f64>) -> FlattenedPolygon {
    let mut coords = Vec::new();
    let mut offsets = Vec::new();
    let mut vertex_counts = Vec::new();
    for poly in &polygon.0 {
        for ring in std::iter::once(poly.exterior()).chain(poly.interiors()) {
            offsets.push(coords.len());
            let pts: Vec<(f64, f64)> = ring.points().map(|p| (p.x(), p.y())).collect();
            vertex_counts.push(pts.len());
            coords.extend(pts);
        }
    }
    FlattenedPolygon { coords, offsets, vertex_counts }
}

/// Device handle for the point-in-polygon kernel. Never successfully
/// initializes in this build.
pub struct GpuMaskEngine;

impl GpuMaskEngine {
    pub fn init(_polygon: &FlattenedPolygon) -> Result<Self, TerraError> {
        Err(TerraError::GpuUnavailable("no device backend compiled into this build".into()))
    }

    pub fn process_block(&self, _block_bytes: &mut [u8]) -> Result<(), TerraError> {
        Err(TerraError::GpuUnavailable("no device backend compiled into this build".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn flatten_records_one_ring_per_polygon() {
        let poly = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        let mp = MultiPolygon::new(vec![poly]);
        let flat = flatten_polygon(&mp);
        assert_eq!(flat.offsets, vec![0]);
        assert_eq!(flat.vertex_counts[0], flat.coords.len());
    }

    #[test]
    fn init_always_reports_gpu_unavailable() {
        let flat = FlattenedPolygon { coords: vec![], offsets: vec![], vertex_counts: vec![] };
        assert!(GpuMaskEngine::init(&flat).is_err());
    }
}
