//! Core module model, content hashing and extension contracts for weft

pub mod config;
pub mod engine;
pub mod error;
pub mod hash;
pub mod hooks;
pub mod import_map;
pub mod module;
pub mod specifier;

pub use config::{BuildConfig, BuildMode, FetchConfig};
pub use engine::{
    DependencyDescriptor, EngineFingerprint, TransformEngine, TransformOutput, TransformRequest,
};
pub use error::CoreError;
pub use hooks::{Hook, HookPattern, HookSet, LoadedSource, ResolveResult};
pub use import_map::ImportMap;
pub use module::{Dependency, Module, ModuleMetadata, SourceKind};
