//! Incremental module registry for weft
//!
//! [`ModuleRegistry`] compiles module graphs through a pluggable
//! [`TransformEngine`](weft_core::TransformEngine), persists results in the
//! artifact cache, and keeps the dependency-hash markers embedded in compiled
//! output current when a module changes.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use weft_core::{BuildConfig, TransformEngine};
//! # use weft_registry::ModuleRegistry;
//! # async fn run(engine: Arc<dyn TransformEngine>) -> Result<(), weft_registry::CompileError> {
//! let registry = ModuleRegistry::new(BuildConfig::for_project("."), engine)?;
//! let index = registry.compile("/pages/index.tsx").await?;
//! println!("{} deps", index.deps.len());
//! # Ok(())
//! # }
//! ```

mod cascade;
mod events;
mod index;
mod init;
mod loader;
mod ready;
mod registry;
mod resident;
mod transpile;
mod visit;
mod walker;

pub mod error;

pub use error::{CompileError, LoadError};
pub use events::SourceEvent;
pub use loader::FallbackLoader;
pub use ready::ReadySignal;
pub use registry::{
    CompileOptions, ModuleRegistry, PatchedFn, RegistryBuilder, Resolution, MAIN_SPECIFIER,
};
pub use visit::VisitSet;
