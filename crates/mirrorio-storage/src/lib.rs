//! MirrorIO Storage - Member block store adapters
//!
//! This crate implements the leaf of the mirror stack: a uniform
//! positioned read / write / flush interface over one backing extent.
//! - Positioned file and block-device I/O (`RawFile`)
//! - The `BlockStore` adapter trait and its file-backed implementation
//! - An in-memory store with fault injection for tests and dry runs
//! - Per-member I/O statistics

pub mod memory;
pub mod raw_io;
pub mod stats;
pub mod store;

// Re-exports
pub use memory::{FaultPlan, MemoryStore};
pub use raw_io::RawFile;
pub use stats::{IoStats, IoStatsSnapshot};
pub use store::{BlockStore, FileStore};
