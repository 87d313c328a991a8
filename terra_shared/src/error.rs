use thiserror::Error;

/// Exception taxonomy the controller recognizes (spec §6 "Exit codes / status",
/// §7 "Error handling design"). Stage code maps failures onto these variants
/// instead of raising raw strings so the controller can classify without
/// substring matching wherever a typed path is available; the legacy
/// substring classes are kept for exceptions bubbled up from `anyhow`/SQL
/// driver text that callers outside this workspace may still produce.
#[derive(Debug, Error)]
pub enum TerraError {
    #[error("disk full or no space left on device: {0}")]
    DiskFull(String),

    #[error("database is locked: {0}")]
    DbLocked(String),

    #[error("max retries exceeded fetching {url}")]
    MaxRetriesExceeded { url: String },

    #[error("GPU mask engine unavailable: {0}")]
    GpuUnavailable(String),

    #[error("requested area too large at zoom {zoom}")]
    AreaTooLarge { zoom: u8 },

    #[error("stage cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TerraError {
    /// Classifies a raw error string the way the controller classifies
    /// stage exceptions it did not originate itself (spec §6): by
    /// substring match against the known exception classes.
    pub fn classify(message: &str) -> Option<&'static str> {
        const KNOWN: &[&str] = &[
            "database or disk is full",
            "No space left on device",
            "database is locked",
            "Max retries exceeded",
        ];
        KNOWN.iter().copied().find(|needle| message.contains(needle))
    }
}
