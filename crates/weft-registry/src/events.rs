//! Source change signals from an external watcher

use tracing::debug;

use crate::error::CompileError;
use crate::registry::{ModuleRegistry, PatchedFn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// The source behind a specifier was created or edited
    Modified(String),
    /// The source behind a specifier disappeared
    Removed(String),
}

impl SourceEvent {
    pub fn specifier(&self) -> &str {
        match self {
            Self::Modified(specifier) | Self::Removed(specifier) => specifier,
        }
    }
}

impl ModuleRegistry {
    /// Apply a watcher signal
    ///
    /// Modified sources of registered modules are recompiled and their new
    /// hash cascades into dependents, with `on_patched` called for every
    /// dependent whose output changed. Removed sources are unregistered and
    /// their artifacts deleted. Signals for untracked specifiers are ignored.
    pub async fn handle_source_event(
        &self,
        event: &SourceEvent,
        on_patched: &PatchedFn<'_>,
    ) -> Result<(), CompileError> {
        let specifier = event.specifier();
        if !self.contains(specifier) {
            debug!(specifier, "Ignoring change to untracked module");
            return Ok(());
        }

        match event {
            SourceEvent::Modified(_) => {
                self.recompile(specifier, on_patched).await?;
            }
            SourceEvent::Removed(_) => {
                self.remove_module(specifier).await?;
            }
        }
        Ok(())
    }
}
