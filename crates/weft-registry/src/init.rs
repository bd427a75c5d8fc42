//! Module initialisation: resolve, register, restore, load

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, warn};
use weft_cache::MetaLookup;
use weft_core::hash::SourceHasher;
use weft_core::hooks::LoadRequest;
use weft_core::specifier::{is_local, is_remote};
use weft_core::{LoadedSource, Module};

use crate::error::CompileError;
use crate::ready::ReadyGuard;
use crate::registry::{CompileOptions, ModuleRegistry, Resolution};
use crate::visit::Pass;

/// Freshly loaded source whose hash differs from the stored one
pub(crate) struct PendingSource {
    pub(crate) loaded: LoadedSource,
    pub(crate) source_hash: String,
}

pub(crate) struct Initialized<'a> {
    pub(crate) specifier: String,
    /// `None` when there is nothing to transform
    pub(crate) source: Option<PendingSource>,
    /// Held until the attempt ends; dropping it resolves the ready signal
    pub(crate) guard: Option<ReadyGuard<'a>>,
}

impl ModuleRegistry {
    /// Initialise and transpile `specifier` as part of `pass`
    ///
    /// Returns the resolved specifier. A specifier already claimed in this
    /// pass is skipped.
    pub(crate) fn compile_in_pass<'a>(
        &'a self,
        specifier: &'a str,
        options: CompileOptions,
        pass: &'a Pass,
        provided: Option<LoadedSource>,
    ) -> BoxFuture<'a, Result<String, CompileError>> {
        async move {
            if !pass.visit.claim(specifier) {
                return Ok(specifier.to_string());
            }

            let resolution = self.resolve(specifier).map_err(|e| {
                error!(specifier, error = %e, "Resolution failed");
                e
            })?;
            if resolution.specifier != specifier && !pass.visit.claim(&resolution.specifier) {
                return Ok(resolution.specifier);
            }

            let initialized = self.init_module(resolution, options, provided).await?;
            let resolved = initialized.specifier.clone();
            self.transpile_module(initialized, options, pass).await?;
            Ok(resolved)
        }
        .boxed()
    }

    pub(crate) async fn init_module(
        &self,
        resolution: Resolution,
        options: CompileOptions,
        provided: Option<LoadedSource>,
    ) -> Result<Initialized<'_>, CompileError> {
        let specifier = resolution.specifier.clone();

        if resolution.external {
            if !self.contains(&specifier) {
                debug!(specifier = %specifier, "Registered external module");
                self.modules
                    .insert(specifier.clone(), Module::external(specifier.clone()));
            }
            return Ok(Initialized {
                specifier,
                source: None,
                guard: None,
            });
        }

        let existing_http_external = self.with_module(&specifier, |m| m.http_external);
        if let Some(http_external) = existing_http_external {
            let compatible = http_external || !options.http_external;
            if !options.force_refresh && compatible && provided.is_none() {
                if let Some(signal) = self.ready(&specifier) {
                    signal.wait().await;
                }
                return Ok(Initialized {
                    specifier,
                    source: None,
                    guard: None,
                });
            }
        }

        let is_new = existing_http_external.is_none();
        let guard = ReadyGuard::install(&self.in_flight, &specifier);
        if is_new {
            let mut module = Module::new(specifier.clone());
            module.compiled_path = self.cache.compiled_path(&specifier);
            module.http_external = options.http_external;
            self.modules.insert(specifier.clone(), module);
        } else if options.http_external {
            self.update_module(&specifier, |m| m.http_external = true);
        }

        match self
            .restore_and_load(&resolution, is_new, options, provided)
            .await
        {
            Ok(source) => Ok(Initialized {
                specifier,
                source,
                guard: Some(guard),
            }),
            Err(e) => {
                error!(specifier = %specifier, error = %e, "Failed to initialise module");
                if is_new {
                    self.discard_new_module(&specifier);
                }
                Err(e)
            }
        }
    }

    async fn restore_and_load(
        &self,
        resolution: &Resolution,
        is_new: bool,
        options: CompileOptions,
        provided: Option<LoadedSource>,
    ) -> Result<Option<PendingSource>, CompileError> {
        let specifier = resolution.specifier.as_str();

        if is_new {
            self.restore_from_cache(specifier).await?;
        }

        let stored_hash = self.source_hash(specifier);
        let artifact_exists = self.cache.exists(specifier).await;
        let needs_load = provided.is_some()
            || !is_remote(specifier)
            || stored_hash.is_none()
            || options.force_refresh
            || !artifact_exists;
        if !needs_load {
            debug!(specifier, "Remote module cached, skipping load");
            return Ok(None);
        }

        let loaded = match provided {
            Some(source) => source,
            None => self.load_source(resolution).await?,
        };
        let source_hash = self.compute_source_hash(specifier, &loaded.code);

        if artifact_exists && stored_hash.as_deref() == Some(source_hash.as_str()) {
            debug!(specifier, "Source hash unchanged");
            return Ok(None);
        }

        Ok(Some(PendingSource {
            loaded,
            source_hash,
        }))
    }

    /// Merge a valid metadata sidecar into a newly created module
    async fn restore_from_cache(&self, specifier: &str) -> Result<(), CompileError> {
        match self.cache.read_meta(specifier).await {
            MetaLookup::Found(meta) => {
                let deps = meta.deps.clone();
                self.update_module(specifier, |m| meta.apply_to(m));
                self.dependents.update(specifier, &[], &deps);
                debug!(specifier, deps = deps.len(), "Restored module from cache");
            }
            MetaLookup::Corrupt => {
                warn!(specifier, "Discarding corrupt metadata sidecar");
                self.cache.discard_meta(specifier).await?;
            }
            MetaLookup::Missing => {}
        }
        Ok(())
    }

    async fn load_source(&self, resolution: &Resolution) -> Result<LoadedSource, CompileError> {
        let specifier = resolution.specifier.as_str();

        if let Some(hook) = self.hooks.loader_for(specifier) {
            debug!(specifier, hook = %hook.name, "Loading through hook");
            return hook
                .handler
                .load(LoadRequest {
                    specifier,
                    data: resolution.data.as_ref(),
                })
                .await
                .map_err(|e| CompileError::hook(specifier, &hook.name, e));
        }

        self.loader
            .load(specifier)
            .await
            .map_err(|source| CompileError::Load {
                specifier: specifier.to_string(),
                source,
            })
    }

    pub(crate) fn compute_source_hash(&self, specifier: &str, code: &[u8]) -> String {
        let mut hasher = SourceHasher::new();
        hasher.source(code);
        for (key, value) in &self.hash_entries {
            hasher.config_entry(key, value);
        }
        let with_hmr = self.config.mode.is_development() && is_local(specifier);
        for checksum in self.hooks.matched_checksums(specifier, with_hmr) {
            hasher.extension_checksum(checksum);
        }
        hasher.finish()
    }

    fn discard_new_module(&self, specifier: &str) {
        if let Some((_, module)) = self.modules.remove(specifier) {
            self.dependents.remove_edges(specifier, &module.deps);
        }
    }
}
