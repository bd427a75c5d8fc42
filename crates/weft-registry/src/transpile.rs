//! Transpile orchestration
//!
//! A module with fresh source goes through the engine, then the matching
//! transformer hooks, and has its dependency markers located. Its state is
//! published before its dependencies are compiled, so a dependency that
//! imports it back computes hashes from the new state. Once the dependencies
//! are done, their aggregate hashes are patched into the output and the result
//! is persisted. If a dependency fails, a previously built module gets its old
//! state back and its artifact on disk stays authoritative.

use std::collections::HashSet;

use futures::future::join_all;
use tracing::{debug, error, warn};
use weft_core::hash::{locate_hash_marker, patch_short_hash, short_hash};
use weft_core::hooks::{TransformHookEntry, TransformHookInput};
use weft_core::specifier::is_local;
use weft_core::{
    CoreError, Dependency, DependencyDescriptor, ModuleMetadata, SourceKind, TransformRequest,
};

use crate::error::CompileError;
use crate::init::{Initialized, PendingSource};
use crate::registry::{CompileOptions, ModuleRegistry};
use crate::visit::Pass;

impl ModuleRegistry {
    pub(crate) async fn transpile_module(
        &self,
        initialized: Initialized<'_>,
        options: CompileOptions,
        pass: &Pass,
    ) -> Result<(), CompileError> {
        let Initialized {
            specifier,
            source,
            guard,
        } = initialized;

        let result = match source {
            Some(pending) => self.transform_and_link(&specifier, pending, options, pass).await,
            None => self.relink(&specifier, options, pass).await,
        };
        drop(guard);
        result
    }

    async fn transform_and_link(
        &self,
        specifier: &str,
        pending: PendingSource,
        options: CompileOptions,
        pass: &Pass,
    ) -> Result<(), CompileError> {
        let Some(kind) = SourceKind::parse(&pending.loaded.kind) else {
            warn!(specifier, kind = %pending.loaded.kind, "Unsupported source kind, skipping");
            return Ok(());
        };

        let output = self
            .engine
            .transform(TransformRequest {
                specifier,
                code: &pending.loaded.code,
                kind,
                map: pending.loaded.map.as_deref(),
                import_map: &self.config.import_map,
                target: &self.config.target,
                mode: self.config.mode,
                bundle: self.config.bundle,
            })
            .await
            .map_err(|e| {
                error!(specifier, error = %e, "Transform failed");
                CompileError::Transform {
                    specifier: specifier.to_string(),
                    source: e.into(),
                }
            })?;

        let mut code = output.code;
        let mut map = output.map;
        let mut extra_deps = Vec::new();

        let mut hooks: Vec<TransformHookEntry> =
            self.hooks.transformers_for(specifier).cloned().collect();
        if self.config.mode.is_development() && is_local(specifier) {
            hooks.extend(self.hooks.hmr_transformers().cloned());
        }
        for hook in &hooks {
            let out = hook
                .handler
                .transform(TransformHookInput {
                    specifier,
                    code: code.clone(),
                    map: map.clone(),
                })
                .await
                .map_err(|e| CompileError::hook(specifier, &hook.name, e))?;
            if let Some(replaced) = out.code {
                code = replaced;
            }
            if out.map.is_some() {
                map = out.map;
            }
            extra_deps.extend(out.extra_deps);
        }

        let bytes = code.into_bytes();
        let deps = collect_deps(&bytes, &output.deps, &extra_deps, |raw| {
            self.resolve(raw).map(|r| r.specifier).ok()
        });

        let prior = self
            .update_module(specifier, |m| PriorBuild {
                deps: std::mem::replace(&mut m.deps, deps.clone()),
                source_hash: std::mem::replace(&mut m.source_hash, pending.source_hash),
                compiled: m.compiled.replace(bytes),
                source_map: std::mem::replace(&mut m.source_map, map),
                kind: m.kind.replace(kind),
                metadata: std::mem::replace(&mut m.metadata, output.metadata),
            })
            .ok_or_else(|| CompileError::NotRegistered(specifier.to_string()))?;
        self.dependents.update(specifier, &prior.deps, &deps);
        debug!(specifier, deps = deps.len(), "Transformed module");

        if let Err(e) = self.link_dependencies(specifier, &deps, options, pass).await {
            self.restore_prior(specifier, prior, &deps);
            return Err(e);
        }
        self.patch_own_markers(specifier)?;
        self.persist(specifier).await?;
        self.mark_resident(specifier).await;
        Ok(())
    }

    /// Put back a previously built state after its refresh failed to link
    ///
    /// A module that was never built keeps the new state unpersisted, so the
    /// next compile finds no artifact and links it again.
    fn restore_prior(&self, specifier: &str, prior: PriorBuild, deps: &[Dependency]) {
        if prior.source_hash.is_empty() {
            return;
        }
        let restored = self.update_module(specifier, |m| {
            m.deps = prior.deps.clone();
            m.source_hash = prior.source_hash;
            m.compiled = prior.compiled;
            m.source_map = prior.source_map;
            m.kind = prior.kind;
            m.metadata = prior.metadata;
        });
        if restored.is_some() {
            self.dependents.update(specifier, deps, &prior.deps);
            warn!(specifier, "Refresh failed, kept previous build");
        }
    }

    /// Nothing to transform: bring dependencies up to date and refresh the
    /// markers they feed
    async fn relink(
        &self,
        specifier: &str,
        options: CompileOptions,
        pass: &Pass,
    ) -> Result<(), CompileError> {
        let Some((deps, external, has_markers)) = self.with_module(specifier, |m| {
            (
                m.deps.clone(),
                m.external,
                m.hash_locations().next().is_some(),
            )
        }) else {
            return Ok(());
        };
        if external {
            return Ok(());
        }

        self.link_dependencies(specifier, &deps, options, pass)
            .await?;

        if !has_markers || self.read(specifier).await?.is_none() {
            return Ok(());
        }
        let patched = self.patch_own_markers(specifier)?;
        if patched {
            pass.relinked.claim(specifier);
        }
        if patched || !self.cache.exists(specifier).await {
            debug!(specifier, patched, "Re-persisting module");
            self.persist(specifier).await?;
        }
        Ok(())
    }

    /// Compile dependencies concurrently; fails after every sibling finished
    async fn link_dependencies(
        &self,
        specifier: &str,
        deps: &[Dependency],
        options: CompileOptions,
        pass: &Pass,
    ) -> Result<(), CompileError> {
        let dep_options = options.for_dependency();
        let targets: Vec<&Dependency> = deps
            .iter()
            .filter(|dep| !(options.ignore_deps && self.source_hash(&dep.specifier).is_some()))
            .collect();

        let results = join_all(
            targets
                .iter()
                .map(|dep| self.compile_in_pass(dep.request(), dep_options, pass, None)),
        )
        .await;

        let mut first_failure = None;
        for (dep, result) in targets.into_iter().zip(results) {
            if let Err(e) = result {
                error!(specifier, dependency = %dep.specifier, error = %e, "Missing dependency");
                first_failure.get_or_insert(CompileError::Dependency {
                    specifier: specifier.to_string(),
                    dependency: dep.request().to_string(),
                    source: Box::new(e),
                });
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    /// Write each marked dependency's current aggregate short hash into the
    /// module's held bytes; returns whether any byte changed
    pub(crate) fn patch_own_markers(&self, specifier: &str) -> Result<bool, CompileError> {
        let Some(locations) = self.with_module(specifier, |m| {
            m.hash_locations()
                .map(|(dep, loc)| (dep.to_string(), loc))
                .collect::<Vec<_>>()
        }) else {
            return Ok(false);
        };

        let shorts: Vec<(usize, String)> = locations
            .into_iter()
            .filter_map(|(dep, loc)| {
                self.aggregate_hash(&dep)
                    .map(|hash| (loc, short_hash(&hash).to_string()))
            })
            .collect();
        if shorts.is_empty() {
            return Ok(false);
        }

        let patched = self
            .update_module(specifier, |m| -> Result<bool, CoreError> {
                let Some(bytes) = m.compiled.as_mut() else {
                    return Ok(false);
                };
                let mut changed = false;
                for (loc, short) in &shorts {
                    changed |= patch_short_hash(bytes, *loc, short)?;
                }
                Ok(changed)
            })
            .unwrap_or(Ok(false))?;
        Ok(patched)
    }

    pub(crate) async fn persist(&self, specifier: &str) -> Result<(), CompileError> {
        let Some(module) = self.get(specifier) else {
            return Ok(());
        };
        self.cache.write(&module).await?;
        Ok(())
    }
}

/// State of a module before a refresh replaced it
struct PriorBuild {
    deps: Vec<Dependency>,
    source_hash: String,
    compiled: Option<Vec<u8>>,
    source_map: Option<String>,
    kind: Option<SourceKind>,
    metadata: ModuleMetadata,
}

/// Dependency records for an engine result
///
/// Each record is keyed by the specifier `resolve` maps the import to, the
/// key the imported module registers under; unresolvable imports keep their
/// text. Engine deps carry the offset of their marker when local, found by
/// the import text the engine wrote. Hook-supplied deps never carry one. The
/// first occurrence of a resolved key wins.
fn collect_deps(
    code: &[u8],
    engine_deps: &[DependencyDescriptor],
    extra_deps: &[DependencyDescriptor],
    resolve: impl Fn(&str) -> Option<String>,
) -> Vec<Dependency> {
    let record = |d: &DependencyDescriptor, hash_location: Option<usize>| {
        let key = resolve(&d.specifier).unwrap_or_else(|| d.specifier.clone());
        Dependency {
            is_dynamic: d.is_dynamic,
            hash_location,
            ..Dependency::new(key).requested_as(&d.specifier)
        }
    };

    let mut seen = HashSet::new();
    let located = engine_deps.iter().map(|d| {
        let location = is_local(&d.specifier)
            .then(|| locate_hash_marker(code, &d.specifier))
            .flatten();
        record(d, location)
    });
    let extra = extra_deps.iter().map(|d| record(d, None));
    located
        .chain(extra)
        .filter(|d| seen.insert(d.specifier.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collect_deps_locates_local_markers() {
        let code = b"import A from \"/a.ts#/a.ts@000000\";\nimport R from \"https://esm.sh/react\";\n";
        let deps = collect_deps(
            code,
            &[
                DependencyDescriptor::new("/a.ts"),
                DependencyDescriptor::new("https://esm.sh/react"),
                DependencyDescriptor::new("/a.ts"),
            ],
            &[DependencyDescriptor {
                specifier: "/extra.css".to_string(),
                is_dynamic: true,
            }],
            |raw| Some(raw.to_string()),
        );

        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].specifier, "/a.ts");
        let loc = deps[0].hash_location.unwrap();
        assert_eq!(&code[loc..loc + 6], b"000000");
        assert_eq!(deps[1].hash_location, None);
        assert_eq!(deps[2].specifier, "/extra.css");
        assert!(deps[2].is_dynamic);
        assert_eq!(deps[2].hash_location, None);
    }

    #[test]
    fn test_collect_deps_without_marker() {
        let deps = collect_deps(
            b"export {}",
            &[DependencyDescriptor::new("/b.ts")],
            &[],
            |_| None,
        );
        assert_eq!(deps[0].hash_location, None);
        assert_eq!(deps[0].specifier, "/b.ts");
    }

    #[test]
    fn test_collect_deps_keys_by_resolved_specifier() {
        let code = b"import B from \"/alias/button#/alias/button@000000\";\n";
        let deps = collect_deps(
            code,
            &[
                DependencyDescriptor::new("/alias/button"),
                DependencyDescriptor::new("/components/button.tsx"),
            ],
            &[],
            |raw| Some(raw.replace("/alias/button", "/components/button.tsx")),
        );

        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].specifier, "/components/button.tsx");
        assert_eq!(deps[0].request(), "/alias/button");
        let loc = deps[0].hash_location.unwrap();
        assert_eq!(&code[loc..loc + 6], b"000000");
    }
}
