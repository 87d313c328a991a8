use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// One outbound proxy URL pair (spec §6 "proxy set").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyEntry {
    pub id: String,
    pub http: String,
    pub https: String,
}

/// Credential handle for the imagery provider. The pipeline never performs
/// auth itself (spec §1 "Out of scope") — it receives this ready-made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialHandle {
    pub service_account: String,
    pub key_path: PathBuf,
    pub project_id: String,
}

/// The task descriptor the pipeline consumes (spec §6 "Inputs").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub taskname: String,
    pub output_dir: PathBuf,
    pub source: String,
    pub start_date: String,
    pub end_date: String,
    pub proxies: HashMap<String, ProxyEntry>,
    pub credential: CredentialHandle,
    pub scale_meters: u32,
    pub polygon_wkt: String,
    pub band: Option<String>,
    pub is_export_shp: bool,
}

impl TaskConfig {
    pub fn task_dir(&self) -> PathBuf {
        self.output_dir.join(&self.taskname)
    }

    /// `<output>/<taskname>/<taskname>.nev` (spec §6 "Task database file").
    pub fn db_path(&self) -> PathBuf {
        self.task_dir().join(format!("{}.nev", self.taskname))
    }

    pub fn geotif_dir(&self) -> PathBuf {
        self.task_dir().join("GeoTif")
    }

    pub fn bands(&self) -> Vec<Option<String>> {
        match &self.band {
            None => vec![None],
            Some(s) => s.split(',').map(|b| Some(b.trim().to_string())).collect(),
        }
    }
}

/// Reads `$name` as a `usize`, clamped to `[min, max]`, defaulting to
/// `default` when unset or unparsable. Mirrors the teacher's
/// `env_usize`/`env_i64` helpers (`backend/src/main.rs`) — used only for
/// process-wide tuning knobs, never for per-task parameters (those travel
/// through `TaskConfig` by value, per spec §9 "Global database connections
/// and `os.environ` mutation for proxy").
pub fn env_usize(name: &str, default: usize, min: usize, max: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
        .clamp(min, max)
}

pub fn env_u64(name: &str, default: u64, min: u64, max: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
        .clamp(min, max)
}

/// Default row-count at which a per-zoom table is resharded (spec §3).
pub const DEFAULT_SPLIT_THRESHOLD: usize = 5_000;
/// Enumerator in-memory flush batch size (spec §4.4).
pub const ENUMERATE_FLUSH_BATCH: usize = 50_000;
/// Concurrent download workers (spec §4.5, §5).
pub const DOWNLOAD_WORKERS: usize = 40;
/// Bounded in-memory queue between download workers and the writer thread.
pub const DOWNLOAD_QUEUE_CAPACITY: usize = 10_000;
/// Writer batch size per insert (spec §4.5).
pub const DOWNLOAD_WRITE_BATCH: usize = 1_000;
/// Stitcher worker threads, one per physical shard (spec §5).
pub const STITCH_WORKERS: usize = 5;
/// mmap flush cadence during stitching (spec §4.6).
pub const STITCH_FLUSH_EVERY: usize = 200;
/// Default mask/crop block edge length (spec §4.7).
pub const DEFAULT_BLOCK_SIZE: u32 = 2_048;
/// GPU crop pipeline depth (spec §5).
pub const GPU_PIPELINE_DEPTH: usize = 4;
/// HTTP connection pool size (spec §4.3).
pub const HTTP_POOL_SIZE: usize = 50;
/// Total HTTP retries per request (spec §4.3).
pub const HTTP_TOTAL_RETRIES: u32 = 10;
/// Exponential backoff factor (spec §4.3).
pub const HTTP_BACKOFF_FACTOR: f64 = 1.0;
/// Max automatic download-stage restarts before the task is marked failed
/// (spec §4.9, §7).
pub const MAX_DOWNLOAD_RETRIES: u32 = 3;
/// Maximum DB connections in the pool (spec §4.2).
pub const DB_MAX_CONNECTIONS: u32 = 30;
/// Base URL for the imagery provider's render endpoint (spec §1 "Out of
/// scope: auth to the imagery provider" — the endpoint itself is fixed,
/// only credentials travel through [`CredentialHandle`]).
pub const IMAGERY_ENDPOINT_BASE: &str = "https://imagery.example/api";
