//! Rotating outbound proxy pool and retrying HTTP client (spec §4.3,
//! component C3). Replaces the original's `os.environ` proxy mutation with
//! an explicit pool the caller threads through by value (spec §9).

pub mod pool;
pub mod retry;

pub use pool::ProxyPool;
pub use retry::{get_with_retry, RetryOutcome};
