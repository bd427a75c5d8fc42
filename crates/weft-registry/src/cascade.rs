//! Hash cascade into dependents
//!
//! When a module's source changes, every module that embeds its aggregate
//! hash gets the new value patched into its output in place. The patched
//! module's own aggregate hash changed with it, so the cascade continues into
//! its dependents. Nothing on this path is re-transformed.

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error};
use weft_core::hash::{patch_short_hash, short_hash};

use crate::error::CompileError;
use crate::registry::{ModuleRegistry, PatchedFn};
use crate::visit::VisitSet;

impl ModuleRegistry {
    /// Patch `changed`'s aggregate hash into its dependents, recursively
    ///
    /// Dependents are handled one at a time; each patched module is persisted
    /// before the cascade descends into it. A failure on one dependent is
    /// logged and the cascade moves on.
    pub(crate) fn propagate<'a>(
        &'a self,
        changed: &'a str,
        on_patched: &'a PatchedFn<'a>,
        visit: &'a VisitSet,
    ) -> BoxFuture<'a, ()> {
        async move {
            if !visit.claim(changed) {
                return;
            }

            let mut short: Option<String> = None;
            for dependent in self.dependents.dependents_of(changed) {
                let Some(location) = self
                    .with_module(&dependent, |m| {
                        m.dependency(changed).and_then(|d| d.hash_location)
                    })
                    .flatten()
                else {
                    continue;
                };

                if short.is_none() {
                    short = self
                        .aggregate_hash(changed)
                        .map(|hash| short_hash(&hash).to_string());
                }
                let Some(marker) = short.as_deref() else {
                    return;
                };

                match self.patch_dependent(&dependent, location, marker).await {
                    Ok(true) => {
                        self.notify_patched(&dependent, on_patched);
                        if let Err(e) = self.persist(&dependent).await {
                            error!(specifier = %dependent, error = %e, "Failed to persist patched module");
                        }
                    }
                    Ok(false) => {
                        debug!(specifier = %dependent, dependency = changed, "Marker already current");
                    }
                    Err(e) => {
                        error!(specifier = %dependent, dependency = changed, error = %e, "Failed to patch dependent");
                        continue;
                    }
                }

                self.propagate(&dependent, on_patched, visit).await;
            }
        }
        .boxed()
    }

    /// Overwrite the marker at `location` in `dependent`'s output
    async fn patch_dependent(
        &self,
        dependent: &str,
        location: usize,
        short: &str,
    ) -> Result<bool, CompileError> {
        if self.read(dependent).await?.is_none() {
            return Ok(false);
        }
        let patched = self
            .update_module(dependent, |m| match m.compiled.as_mut() {
                Some(bytes) => patch_short_hash(bytes, location, short),
                None => Ok(false),
            })
            .unwrap_or(Ok(false))?;
        if patched {
            debug!(specifier = dependent, location, hash = short, "Patched dependency marker");
        }
        Ok(patched)
    }
}
