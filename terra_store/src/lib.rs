//! The task database (spec §3, §4.2, component C2). One `.nev` SQLite file
//! per task; every stage reads and writes through here, which is what makes
//! the pipeline resumable after a crash, pause or kill (spec §1).

pub mod pool;
pub mod progress_tables;
pub mod reshard;
pub mod schema;
pub mod tiles;

pub use pool::TaskStore;
