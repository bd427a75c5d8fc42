//! Artifact cache for compiled modules
//!
//! Each module has a compiled output file, a JSON metadata sidecar and an
//! optional source map, all under a per-build-mode directory. A single
//! manifest at the cache root records the engine and target fingerprint; a
//! mismatch discards the whole cache at startup.

pub mod artifact;
pub mod error;
pub mod layout;
pub mod manifest;
pub mod metadata;

pub use artifact::{ArtifactCache, MetaLookup};
pub use error::CacheError;
pub use layout::ArtifactVariant;
pub use manifest::CacheManifest;
pub use metadata::ModuleMeta;
