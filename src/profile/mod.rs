//! Compatibility profiling of registry extensions
//!
//! - [`classifier`]: era and up-to-date classification of one dependency set
//! - [`report`]: per-date aggregation, console summary and JSON snapshot
//! - [`runner`]: backfill, current snapshot and single package inspection

pub mod classifier;
pub mod error;
pub mod report;
pub mod runner;

pub use classifier::{Classification, CurrentRanges, classify};
pub use error::ProfileError;
pub use report::{ClassificationResult, Snapshot, SnapshotReport, Summary};
pub use runner::Profiler;
