//! Two-tier persistent cache in front of the registry
//!
//! - [`metadata`]: manifests of every published version, keyed by package name
//! - [`publish_times`]: publish timelines, keyed by package name
//! - [`store`]: JSON file and SQLite backends both caches persist through

pub mod metadata;
pub mod publish_times;
pub mod store;

pub use metadata::MetadataCache;
pub use publish_times::{PublishTimeCache, PublishTimeline};
pub use store::{CacheDocument, CacheStore, JsonFileStore, SqliteStore, open_stores};
