use std::collections::BTreeSet;

use dashmap::DashMap;
use weft_core::Dependency;

/// Reverse dependency edges: specifier to the modules that import it
///
/// Kept in sync with every change to a module's `deps`, so the cascade only
/// visits modules that can embed a marker for the changed specifier.
#[derive(Debug, Default)]
pub(crate) struct ReverseIndex {
    dependents: DashMap<String, BTreeSet<String>>,
}

impl ReverseIndex {
    /// Replace the edges contributed by `importer`
    pub(crate) fn update(&self, importer: &str, old: &[Dependency], new: &[Dependency]) {
        self.remove_edges(importer, old);
        for dep in new {
            self.dependents
                .entry(dep.specifier.clone())
                .or_default()
                .insert(importer.to_string());
        }
    }

    pub(crate) fn remove_edges(&self, importer: &str, deps: &[Dependency]) {
        for dep in deps {
            let now_empty = match self.dependents.get_mut(&dep.specifier) {
                Some(mut importers) => {
                    importers.remove(importer);
                    importers.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.dependents
                    .remove_if(&dep.specifier, |_, importers| importers.is_empty());
            }
        }
    }

    /// Importers of `specifier`, in specifier order
    pub(crate) fn dependents_of(&self, specifier: &str) -> Vec<String> {
        self.dependents
            .get(specifier)
            .map(|importers| importers.iter().cloned().collect())
            .unwrap_or_default()
    }
}
