//! Test fixtures for the weft workspace
//!
//! - [`ScriptedEngine`]: a transform engine driven by a tiny line-based
//!   script language, which counts its invocations per specifier
//! - [`MemoryLoader`]: a loader hook serving sources from memory
//! - [`TestProject`]: a temporary project root with its own cache directory

mod engine;
mod loader;
mod project;

pub use engine::ScriptedEngine;
pub use loader::MemoryLoader;
pub use project::TestProject;

/// Install a test-writer subscriber filtered by `RUST_LOG`; safe to call
/// from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
