//! The module registry
//!
//! The registry is the authoritative mapping from specifier to [`Module`]. It
//! is an explicit context object: every compile, cascade and query goes
//! through a `ModuleRegistry` value, and nothing is process-global.
//!
//! # Concurrency
//!
//! Top-level passes (a `compile`, or a recompile followed by its cascade) are
//! serialised by a registry-wide pass gate. Within a pass, dependencies are
//! compiled concurrently, each claimed in the pass's [`VisitSet`] before it is
//! initialised, so a branch of a pass never waits on another branch of the
//! same pass. Callers that find a compile in flight for their specifier wait
//! on its [`ReadySignal`] before queueing for the gate.
//!
//! Module entries live in a `DashMap`. Accessors copy data out; no map guard
//! is held across an `.await`.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use weft_cache::ArtifactCache;
use weft_core::hooks::TransformHookInput;
use weft_core::{BuildConfig, HookSet, LoadedSource, Module, TransformEngine};

use crate::error::CompileError;
use crate::index::ReverseIndex;
use crate::loader::FallbackLoader;
use crate::ready::ReadySignal;
use crate::resident::ResidentSet;
use crate::visit::{Pass, VisitSet};

/// Called with the specifier of every dependent whose output was patched
pub type PatchedFn<'a> = dyn Fn(&str) + Send + Sync + 'a;

type InvalidateFn = Box<dyn Fn(&str) + Send + Sync>;

/// Specifier handed to `Main` transformers
pub const MAIN_SPECIFIER: &str = "/main.js";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Reload the source even if a module is already registered
    pub force_refresh: bool,
    /// Do not transpile dependencies that already have a build
    pub ignore_deps: bool,
    /// The module is fetched remotely and referenced as an HTTP external
    pub http_external: bool,
}

impl CompileOptions {
    pub fn refresh() -> Self {
        Self {
            force_refresh: true,
            ..Default::default()
        }
    }

    /// Options passed down to dependencies of a module compiled with `self`
    pub(crate) fn for_dependency(&self) -> Self {
        Self {
            force_refresh: false,
            ignore_deps: self.ignore_deps,
            http_external: false,
        }
    }
}

/// Outcome of running the resolver chain on a specifier
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub specifier: String,
    pub external: bool,
    /// Payload for the loader hook
    pub data: Option<Value>,
    /// Routing hint for page collaborators
    pub as_page: Option<Value>,
}

pub struct RegistryBuilder {
    config: BuildConfig,
    engine: Arc<dyn TransformEngine>,
    hooks: HookSet,
    invalidators: Vec<InvalidateFn>,
}

impl RegistryBuilder {
    pub fn hooks(mut self, hooks: HookSet) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn on_invalidate(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.invalidators.push(Box::new(f));
        self
    }

    /// Open the artifact cache and assemble the registry
    ///
    /// The cache manifest is checked here, so a changed engine or target
    /// discards every artifact before anything is compiled.
    pub fn build(self) -> Result<ModuleRegistry, CompileError> {
        let (cache, discarded) = ArtifactCache::open(&self.config, &self.engine.fingerprint())?;
        if discarded {
            info!(cache_dir = %self.config.cache_dir.display(), "Artifact cache invalidated");
        }

        Ok(ModuleRegistry {
            loader: FallbackLoader::new(&self.config)?,
            resident: ResidentSet::new(self.config.max_resident_modules),
            hash_entries: self.config.hash_entries(),
            config: self.config,
            engine: self.engine,
            hooks: self.hooks,
            cache,
            modules: DashMap::new(),
            in_flight: DashMap::new(),
            dependents: ReverseIndex::default(),
            pass_gate: Mutex::new(()),
            invalidators: self.invalidators,
        })
    }
}

pub struct ModuleRegistry {
    pub(crate) config: BuildConfig,
    pub(crate) engine: Arc<dyn TransformEngine>,
    pub(crate) hooks: HookSet,
    pub(crate) cache: ArtifactCache,
    pub(crate) loader: FallbackLoader,
    pub(crate) modules: DashMap<String, Module>,
    pub(crate) in_flight: DashMap<String, ReadySignal>,
    pub(crate) dependents: ReverseIndex,
    pub(crate) resident: ResidentSet,
    pub(crate) pass_gate: Mutex<()>,
    pub(crate) invalidators: Vec<InvalidateFn>,
    pub(crate) hash_entries: Vec<(String, String)>,
}

impl ModuleRegistry {
    pub fn builder(config: BuildConfig, engine: Arc<dyn TransformEngine>) -> RegistryBuilder {
        RegistryBuilder {
            config,
            engine,
            hooks: HookSet::default(),
            invalidators: Vec::new(),
        }
    }

    pub fn new(config: BuildConfig, engine: Arc<dyn TransformEngine>) -> Result<Self, CompileError> {
        Self::builder(config, engine).build()
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Compile `specifier` and everything it imports
    ///
    /// Returns the module as it stands after the attempt, with its compiled
    /// bytes loaded.
    pub async fn compile(&self, specifier: &str) -> Result<Module, CompileError> {
        self.compile_with(specifier, CompileOptions::default()).await
    }

    #[instrument(skip(self), fields(specifier = %specifier))]
    pub async fn compile_with(
        &self,
        specifier: &str,
        options: CompileOptions,
    ) -> Result<Module, CompileError> {
        self.run_pass(specifier, options, None).await
    }

    /// Compile `specifier`, taking its source from `source` instead of a loader
    /// when one is given
    #[instrument(skip(self, source), fields(specifier = %specifier))]
    pub async fn add_module(
        &self,
        specifier: &str,
        source: Option<LoadedSource>,
    ) -> Result<Module, CompileError> {
        self.run_pass(specifier, CompileOptions::default(), source)
            .await
    }

    async fn run_pass(
        &self,
        specifier: &str,
        options: CompileOptions,
        source: Option<LoadedSource>,
    ) -> Result<Module, CompileError> {
        if let Some(signal) = self.ready(specifier) {
            debug!(specifier, "Waiting for in-flight compile");
            signal.wait().await;
        }

        let resolved = {
            let _gate = self.pass_gate.lock().await;
            let pass = Pass::default();
            self.compile_in_pass(specifier, options, &pass, source)
                .await?
        };
        self.snapshot(&resolved).await
    }

    /// Force a reload of `specifier` and cascade its new hash into dependents
    ///
    /// `on_patched` is called for every dependent whose output bytes changed.
    #[instrument(skip(self, on_patched), fields(specifier = %specifier))]
    pub async fn recompile(
        &self,
        specifier: &str,
        on_patched: &PatchedFn<'_>,
    ) -> Result<Module, CompileError> {
        let resolved = {
            let _gate = self.pass_gate.lock().await;
            let before = self.source_hash(specifier);

            let pass = Pass::default();
            let resolved = self
                .compile_in_pass(specifier, CompileOptions::refresh(), &pass, None)
                .await?;

            // Importers inside a cycle with `resolved` were already patched by the pass
            for relinked in pass.relinked_sorted() {
                self.notify_patched(&relinked, on_patched);
            }

            let after = self.source_hash(&resolved);
            if after.is_some() && after != before {
                info!(specifier = %resolved, "Source changed, propagating hash");
                self.propagate(&resolved, on_patched, &VisitSet::new())
                    .await;
            } else {
                debug!(specifier = %resolved, "Source unchanged, nothing to propagate");
            }
            resolved
        };
        self.snapshot(&resolved).await
    }

    /// Run the resolver chain on `specifier`
    ///
    /// The import map is applied first; then the first resolver whose pattern
    /// matches decides.
    pub fn resolve(&self, specifier: &str) -> Result<Resolution, CompileError> {
        let mapped = self.config.import_map.resolve(specifier);

        let Some(hook) = self.hooks.resolver_for(&mapped) else {
            return Ok(Resolution {
                specifier: mapped.into_owned(),
                external: false,
                data: None,
                as_page: None,
            });
        };

        let result = hook
            .handler
            .resolve(&mapped)
            .map_err(|e| CompileError::Resolve {
                specifier: specifier.to_string(),
                hook: hook.name.clone(),
                source: e.into(),
            })?;

        Ok(Resolution {
            specifier: result.specifier.unwrap_or_else(|| mapped.into_owned()),
            external: result.external,
            data: result.data,
            as_page: result.as_page,
        })
    }

    /// Apply the `Main` transformers to application bootstrap code
    pub async fn transform_main(&self, code: String) -> Result<String, CompileError> {
        let mut code = code;
        for hook in self.hooks.main_transformers() {
            let output = hook
                .handler
                .transform(TransformHookInput {
                    specifier: MAIN_SPECIFIER,
                    code: code.clone(),
                    map: None,
                })
                .await
                .map_err(|e| CompileError::hook(MAIN_SPECIFIER, &hook.name, e))?;
            if let Some(replaced) = output.code {
                code = replaced;
            }
        }
        Ok(code)
    }

    /// A copy of the registered module, without loading evicted bytes
    pub fn get(&self, specifier: &str) -> Option<Module> {
        self.modules.get(specifier).map(|m| m.clone())
    }

    pub fn contains(&self, specifier: &str) -> bool {
        self.modules.contains_key(specifier)
    }

    /// All registered specifiers, sorted
    pub fn specifiers(&self) -> Vec<String> {
        let mut specifiers: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        specifiers.sort();
        specifiers
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Signal for the compile attempt currently in flight for `specifier`
    pub fn ready(&self, specifier: &str) -> Option<ReadySignal> {
        self.in_flight.get(specifier).map(|s| s.clone())
    }

    /// Modules whose dependency list names `specifier`
    pub fn dependents_of(&self, specifier: &str) -> Vec<String> {
        self.dependents.dependents_of(specifier)
    }

    /// Compiled bytes of a module, re-read from the artifact cache if evicted
    pub async fn read(&self, specifier: &str) -> Result<Option<Vec<u8>>, CompileError> {
        if let Some(held) = self.with_module(specifier, |m| m.compiled.clone()).flatten() {
            return Ok(Some(held));
        }
        if !self.contains(specifier) {
            return Ok(None);
        }

        let Some(bytes) = self.cache.read(specifier).await? else {
            return Ok(None);
        };
        self.update_module(specifier, |m| {
            if m.compiled.is_none() {
                m.compiled = Some(bytes.clone());
            }
        });
        self.mark_resident(specifier).await;
        Ok(Some(bytes))
    }

    /// Unregister a module and delete its artifacts
    pub async fn remove_module(&self, specifier: &str) -> Result<Option<Module>, CompileError> {
        let _gate = self.pass_gate.lock().await;

        let Some((_, module)) = self.modules.remove(specifier) else {
            return Ok(None);
        };
        self.dependents.remove_edges(specifier, &module.deps);
        self.in_flight.remove(specifier);
        self.resident.forget(specifier).await;
        if !module.external {
            self.cache.remove(specifier).await?;
        }

        info!(specifier, "Removed module");
        Ok(Some(module))
    }

    pub(crate) fn with_module<R>(&self, specifier: &str, f: impl FnOnce(&Module) -> R) -> Option<R> {
        self.modules.get(specifier).map(|m| f(&m))
    }

    pub(crate) fn update_module<R>(
        &self,
        specifier: &str,
        f: impl FnOnce(&mut Module) -> R,
    ) -> Option<R> {
        self.modules.get_mut(specifier).map(|mut m| f(&mut m))
    }

    /// Run the render invalidation callbacks, then `on_patched`
    pub(crate) fn notify_patched(&self, specifier: &str, on_patched: &PatchedFn<'_>) {
        for invalidate in &self.invalidators {
            invalidate(specifier);
        }
        on_patched(specifier);
    }

    pub(crate) fn source_hash(&self, specifier: &str) -> Option<String> {
        self.with_module(specifier, |m| m.source_hash.clone())
            .filter(|h| !h.is_empty())
    }

    /// Mark `specifier` as holding bytes and evict the least recently used
    /// module if the resident bound is exceeded
    pub(crate) async fn mark_resident(&self, specifier: &str) {
        let Some(evicted) = self.resident.touch(specifier).await else {
            return;
        };
        // Bytes that never reached disk stay in memory
        if !self.cache.exists(&evicted).await {
            warn!(specifier = %evicted, "Not evicting unpersisted module");
            return;
        }
        self.update_module(&evicted, |m| m.compiled = None);
        debug!(specifier = %evicted, "Evicted compiled bytes");
    }

    async fn snapshot(&self, specifier: &str) -> Result<Module, CompileError> {
        let bytes = self.read(specifier).await?;
        let mut module = self
            .get(specifier)
            .ok_or_else(|| CompileError::NotRegistered(specifier.to_string()))?;
        if module.compiled.is_none() {
            module.compiled = bytes;
        }
        Ok(module)
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("cache_dir", &self.config.cache_dir)
            .field("modules", &self.modules.len())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}
