//! Dependency closure traversal and aggregate hashes

use std::collections::HashSet;
use std::ops::ControlFlow;

use weft_core::hash;
use weft_core::Dependency;

use crate::registry::ModuleRegistry;

impl ModuleRegistry {
    /// Visit every dependency record in the closure of `specifier`
    ///
    /// Each module's direct dependencies are all visited before any of them is
    /// descended into. A module is expanded at most once, so cycles terminate.
    /// Returning [`ControlFlow::Break`] from `visit` stops the walk.
    pub fn lookup_deps(
        &self,
        specifier: &str,
        visit: &mut dyn FnMut(&Dependency) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        let mut expanded = HashSet::new();
        self.walk(specifier, visit, &mut expanded)
    }

    fn walk(
        &self,
        specifier: &str,
        visit: &mut dyn FnMut(&Dependency) -> ControlFlow<()>,
        expanded: &mut HashSet<String>,
    ) -> ControlFlow<()> {
        if !expanded.insert(specifier.to_string()) {
            return ControlFlow::Continue(());
        }
        let Some(deps) = self.with_module(specifier, |m| m.deps.clone()) else {
            return ControlFlow::Continue(());
        };

        for dep in &deps {
            visit(dep)?;
        }
        for dep in &deps {
            self.walk(&dep.specifier, visit, expanded)?;
        }
        ControlFlow::Continue(())
    }

    /// Hash of a module's source hash followed by the source hash of every
    /// dependency record in its closure, in walk order
    ///
    /// `None` when the module is not registered or has never been built.
    pub fn aggregate_hash(&self, specifier: &str) -> Option<String> {
        let own = self.source_hash(specifier)?;
        let mut dep_hashes = Vec::new();
        let _ = self.lookup_deps(specifier, &mut |dep| {
            dep_hashes.push(self.source_hash(&dep.specifier).unwrap_or_default());
            ControlFlow::Continue(())
        });
        Some(hash::aggregate_hash(
            &own,
            dep_hashes.iter().map(String::as_str),
        ))
    }
}
