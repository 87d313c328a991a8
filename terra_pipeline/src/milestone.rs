//! Per-task XML milestone sidecar (spec §4.9 "persists every milestone to
//! a per-task XML sidecar so that restarting the application picks up at
//! the right stage").

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use xml::reader::{EventReader, XmlEvent as ReadEvent};
use xml::writer::{EmitterConfig, XmlEvent as WriteEvent};

/// The progress dictionary's keys (spec §4.9), persisted as one flat XML
/// document. `0` total/zero counters and all-`false` milestones is the
/// correct initial state for a brand-new task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MilestoneState {
    pub is_calculate_tiles_done: bool,
    pub is_tile_download_done: bool,
    pub is_tile_stitch_done: bool,
    /// The zoom level the enumeration probe settled on. Not part of the
    /// spec's progress dictionary, but needed on resume to rediscover which
    /// physical tables belong to this task without re-probing.
    pub target_zoom: u8,
    pub download_total: u64,
    pub download_success: u64,
    pub download_fail: u64,
    pub stitch_total: u64,
    pub stitched_tiles: u64,
    pub crop_total: u64,
    pub croped_blocks: u64,
    pub exception: Option<String>,
}

const FIELDS: &[&str] = &[
    "is_calculate_tiles_done",
    "is_tile_download_done",
    "is_tile_stitch_done",
    "target_zoom",
    "download_total",
    "download_success",
    "download_fail",
    "stitch_total",
    "stitched_tiles",
    "crop_total",
    "croped_blocks",
];

impl MilestoneState {
    /// Loads the sidecar at `path` if present, else returns the all-zero
    /// starting state (spec §4.9 "restarting the application picks up at
    /// the right stage").
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = File::open(path).with_context(|| format!("opening milestone sidecar {}", path.display()))?;
        let reader = EventReader::new(BufReader::new(file));
        let mut state = Self::default();
        let mut current_tag: Option<String> = None;
        for event in reader {
            match event? {
                ReadEvent::StartElement { name, .. } => current_tag = Some(name.local_name),
                ReadEvent::Characters(text) | ReadEvent::CData(text) => {
                    if let Some(tag) = current_tag.as_deref() {
                        state.set_field(tag, &text);
                    }
                }
                ReadEvent::EndElement { .. } => current_tag = None,
                _ => {}
            }
        }
        Ok(state)
    }

    fn set_field(&mut self, tag: &str, text: &str) {
        match tag {
            "is_calculate_tiles_done" => self.is_calculate_tiles_done = text == "true",
            "is_tile_download_done" => self.is_tile_download_done = text == "true",
            "is_tile_stitch_done" => self.is_tile_stitch_done = text == "true",
            "target_zoom" => self.target_zoom = text.parse().unwrap_or(0),
            "download_total" => self.download_total = text.parse().unwrap_or(0),
            "download_success" => self.download_success = text.parse().unwrap_or(0),
            "download_fail" => self.download_fail = text.parse().unwrap_or(0),
            "stitch_total" => self.stitch_total = text.parse().unwrap_or(0),
            "stitched_tiles" => self.stitched_tiles = text.parse().unwrap_or(0),
            "crop_total" => self.crop_total = text.parse().unwrap_or(0),
            "croped_blocks" => self.croped_blocks = text.parse().unwrap_or(0),
            "exception" => self.exception = Some(text.to_string()),
            _ => {}
        }
    }

    fn field_value(&self, name: &str) -> String {
        match name {
            "is_calculate_tiles_done" => self.is_calculate_tiles_done.to_string(),
            "is_tile_download_done" => self.is_tile_download_done.to_string(),
            "is_tile_stitch_done" => self.is_tile_stitch_done.to_string(),
            "target_zoom" => self.target_zoom.to_string(),
            "download_total" => self.download_total.to_string(),
            "download_success" => self.download_success.to_string(),
            "download_fail" => self.download_fail.to_string(),
            "stitch_total" => self.stitch_total.to_string(),
            "stitched_tiles" => self.stitched_tiles.to_string(),
            "crop_total" => self.crop_total.to_string(),
            "croped_blocks" => self.croped_blocks.to_string(),
            _ => unreachable!("unlisted milestone field {name}"),
        }
    }

    /// Overwrites the sidecar at `path` with the current state (spec §4.9).
    /// Called after every meaningful state change per the progress channel
    /// contract in spec §6.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut writer = EmitterConfig::new().perform_indent(true).create_writer(file);

        writer.write(WriteEvent::start_element("task"))?;
        for field in FIELDS {
            writer.write(WriteEvent::start_element(*field))?;
            writer.write(WriteEvent::characters(&self.field_value(field)))?;
            writer.write(WriteEvent::end_element())?;
        }
        if let Some(exc) = &self.exception {
            writer.write(WriteEvent::start_element("exception"))?;
            writer.write(WriteEvent::characters(exc))?;
            writer.write(WriteEvent::end_element())?;
        }
        writer.write(WriteEvent::end_element())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sidecar_yields_the_default_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("milestones.xml");
        let state = MilestoneState::load_or_default(&path).unwrap();
        assert_eq!(state, MilestoneState::default());
    }

    #[test]
    fn persisted_state_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("milestones.xml");
        let mut state = MilestoneState::default();
        state.is_calculate_tiles_done = true;
        state.download_total = 42;
        state.exception = Some("disk full".to_string());
        state.persist(&path).unwrap();

        let loaded = MilestoneState::load_or_default(&path).unwrap();
        assert!(loaded.is_calculate_tiles_done);
        assert_eq!(loaded.download_total, 42);
        assert_eq!(loaded.exception.as_deref(), Some("disk full"));
    }
}
