use serde::{Deserialize, Serialize};

/// Web-Mercator tile coordinate triple (spec §3 "Tile identity").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileId {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// `(2x, 2y), (2x+1, 2y), (2x, 2y+1), (2x+1, 2y+1)` at `z+1` (spec §4.4).
    pub fn children(&self) -> [TileId; 4] {
        let (x, y, z) = (self.x, self.y, self.z + 1);
        [
            TileId::new(2 * x, 2 * y, z),
            TileId::new(2 * x + 1, 2 * y, z),
            TileId::new(2 * x, 2 * y + 1, z),
            TileId::new(2 * x + 1, 2 * y + 1, z),
        ]
    }

    /// The logical per-zoom table name (spec §3 "Per-zoom table partitioning").
    pub fn table_name(z: u8) -> String {
        format!("tiles_{z}")
    }
}

/// Optional band discriminator; `None` for single-band sources.
pub type Band = Option<String>;

/// Pixel dtype recorded once download succeeds (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    U8,
    U16,
    F32,
}

impl DType {
    pub fn size_of(self) -> usize {
        match self {
            DType::U8 => 1,
            DType::U16 => 2,
            DType::F32 => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::U8 => "u8",
            DType::U16 => "u16",
            DType::F32 => "f32",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "u8" => Some(DType::U8),
            "u16" => Some(DType::U16),
            "f32" => Some(DType::F32),
            _ => None,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32)
    }
}

/// Per-tile download outcome (spec §3). Stored as a small integer in the
/// task database (`-1`/`0`/`1`), mirroring the original's sentinel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileStatus {
    Unattempted,
    Success,
    Failed,
}

impl TileStatus {
    pub fn as_i32(self) -> i32 {
        match self {
            TileStatus::Unattempted => 0,
            TileStatus::Success => 1,
            TileStatus::Failed => -1,
        }
    }

    pub fn from_i32(v: i32) -> Self {
        match v {
            1 => TileStatus::Success,
            -1 => TileStatus::Failed,
            _ => TileStatus::Unattempted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StitchStatus {
    Null,
    Consumed,
}

impl StitchStatus {
    pub fn as_i32(self) -> i32 {
        match self {
            StitchStatus::Null => 0,
            StitchStatus::Consumed => 1,
        }
    }
}

/// Full tile row as read back from a `_rs` table (spec §3 "Tile record").
#[derive(Debug, Clone)]
pub struct TileRecord {
    pub id: TileId,
    pub band: Band,
    pub geometry_wkt: String,
    pub payload: Vec<u8>,
    pub dtype: Option<DType>,
    pub shape: Option<(u32, u32, u8)>,
    pub width: u32,
    pub height: u32,
    pub status: TileStatus,
    pub stitch_status: StitchStatus,
    pub error: Option<String>,
    pub cost_secs: f64,
}

/// Closed set of imagery provider adapters (spec §9 "Dynamic dispatch on
/// source type"). Resolved once at task start rather than dispatched by
/// string at the hot path; each variant encodes its own quirks instead of
/// branching on a source name downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    LandCover,
    WaterHistory,
    Terrain,
    Climate,
}

impl Source {
    pub fn from_selector(selector: &str) -> Option<Self> {
        match selector {
            "land_cover" => Some(Source::LandCover),
            "water_history" => Some(Source::WaterHistory),
            "terrain" => Some(Source::Terrain),
            "climate" => Some(Source::Climate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::LandCover => "land_cover",
            Source::WaterHistory => "water_history",
            Source::Terrain => "terrain",
            Source::Climate => "climate",
        }
    }

    /// The land-cover source returns tiles flipped vertically; a provider
    /// quirk the stitcher must undo before placement (spec §4.6).
    pub fn vertically_flipped(self) -> bool {
        matches!(self, Source::LandCover)
    }
}
