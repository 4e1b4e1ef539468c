//! Package version layer
//!
//! Everything needed to answer "which version of a package existed at a date,
//! and what did it declare".
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Registry   │────▶│    Cache    │────▶│  Resolver   │
//! │  (fetch)    │     │  (storage)  │     │ (by date)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                                       │
//!        ▼                                       ▼
//! ┌─────────────┐                         ┌─────────────┐
//! │ Registries  │                         │    Range    │
//! │   (npm)     │                         │  (semver)   │
//! └─────────────┘                         └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`registry`]: Registry trait for reading package data from a remote source
//! - [`registries`]: Concrete registry implementations (npm)
//! - [`resolver`]: Newest version published before a date
//! - [`range`]: npm range parsing, satisfaction and intersection
//! - [`semver`]: Loose version parsing and sorting
//! - [`error`]: Error types for cache, registry and range operations
//! - [`types`]: Manifests, package metadata and search results

pub mod error;
pub mod range;
pub mod registries;
pub mod registry;
pub mod resolver;
pub mod semver;
pub mod types;
