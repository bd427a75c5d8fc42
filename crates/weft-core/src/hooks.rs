//! Extension hooks: resolvers, loaders and transformers
//!
//! Hooks are registered in ordered lists and matched against specifiers with a
//! regular expression. For resolvers and loaders the first matching hook in
//! registration order wins. Every matching transformer runs, in registration
//! order, each one seeing the previous one's output. Transformers tagged
//! [`HookPattern::Hmr`] or [`HookPattern::Main`] never match a specifier; they
//! are looked up by tag for their single purpose.
//!
//! Each hook carries a checksum. The checksums of the hooks that matched a
//! specifier are part of its source hash, so upgrading an extension rebuilds
//! exactly the modules it touches.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use serde_json::Value;

use crate::engine::DependencyDescriptor;
use crate::error::CoreError;

#[derive(Debug, Clone)]
pub enum HookPattern {
    Regex(Regex),
    /// Hot-reload instrumentation applied to local modules in development
    Hmr,
    /// Bootstrap code for the application entry
    Main,
}

impl HookPattern {
    pub fn regex(pattern: &str) -> Result<Self, CoreError> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    pub fn matches(&self, specifier: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(specifier),
            Self::Hmr | Self::Main => false,
        }
    }
}

/// What a resolver decided about a specifier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveResult {
    /// Replacement specifier, if the resolver rewrites it
    pub specifier: Option<String>,
    /// Referenced as-is and never compiled locally
    pub external: bool,
    /// Opaque payload handed to the loader
    pub data: Option<Value>,
    /// Routing hint for page collaborators
    pub as_page: Option<Value>,
}

pub trait ResolverHook: Send + Sync {
    fn resolve(&self, specifier: &str) -> anyhow::Result<ResolveResult>;
}

#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    pub specifier: &'a str,
    pub data: Option<&'a Value>,
}

/// Raw source produced by a loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSource {
    pub code: Vec<u8>,
    /// Kind as reported by the loader; unknown kinds are skipped at transpile time
    pub kind: String,
    pub map: Option<String>,
}

pub trait LoaderHook: Send + Sync {
    fn load<'a>(&'a self, request: LoadRequest<'a>) -> BoxFuture<'a, anyhow::Result<LoadedSource>>;
}

#[derive(Debug, Clone)]
pub struct TransformHookInput<'a> {
    pub specifier: &'a str,
    pub code: String,
    pub map: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TransformHookOutput {
    /// Replacement code; `None` keeps the input
    pub code: Option<String>,
    pub map: Option<String>,
    pub extra_deps: Vec<DependencyDescriptor>,
}

pub trait TransformHook: Send + Sync {
    fn transform<'a>(
        &'a self,
        input: TransformHookInput<'a>,
    ) -> BoxFuture<'a, anyhow::Result<TransformHookOutput>>;
}

pub struct Hook<H: ?Sized> {
    pub name: String,
    pub checksum: String,
    pub pattern: HookPattern,
    pub handler: Arc<H>,
}

impl<H: ?Sized> Hook<H> {
    pub fn new(
        name: impl Into<String>,
        checksum: impl Into<String>,
        pattern: HookPattern,
        handler: Arc<H>,
    ) -> Self {
        Self {
            name: name.into(),
            checksum: checksum.into(),
            pattern,
            handler,
        }
    }
}

impl<H: ?Sized> Clone for Hook<H> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            checksum: self.checksum.clone(),
            pattern: self.pattern.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H: ?Sized> fmt::Debug for Hook<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("checksum", &self.checksum)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

pub type ResolverHookEntry = Hook<dyn ResolverHook>;
pub type LoaderHookEntry = Hook<dyn LoaderHook>;
pub type TransformHookEntry = Hook<dyn TransformHook>;

/// All hooks registered by extensions, in registration order
#[derive(Debug, Clone, Default)]
pub struct HookSet {
    resolvers: Vec<ResolverHookEntry>,
    loaders: Vec<LoaderHookEntry>,
    transformers: Vec<TransformHookEntry>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resolver(&mut self, hook: ResolverHookEntry) -> &mut Self {
        self.resolvers.push(hook);
        self
    }

    pub fn add_loader(&mut self, hook: LoaderHookEntry) -> &mut Self {
        self.loaders.push(hook);
        self
    }

    pub fn add_transformer(&mut self, hook: TransformHookEntry) -> &mut Self {
        self.transformers.push(hook);
        self
    }

    pub fn with_resolver(mut self, hook: ResolverHookEntry) -> Self {
        self.add_resolver(hook);
        self
    }

    pub fn with_loader(mut self, hook: LoaderHookEntry) -> Self {
        self.add_loader(hook);
        self
    }

    pub fn with_transformer(mut self, hook: TransformHookEntry) -> Self {
        self.add_transformer(hook);
        self
    }

    pub fn resolver_for(&self, specifier: &str) -> Option<&ResolverHookEntry> {
        self.resolvers.iter().find(|h| h.pattern.matches(specifier))
    }

    pub fn loader_for(&self, specifier: &str) -> Option<&LoaderHookEntry> {
        self.loaders.iter().find(|h| h.pattern.matches(specifier))
    }

    pub fn transformers_for<'a>(
        &'a self,
        specifier: &'a str,
    ) -> impl Iterator<Item = &'a TransformHookEntry> + 'a {
        self.transformers
            .iter()
            .filter(move |h| h.pattern.matches(specifier))
    }

    pub fn hmr_transformers(&self) -> impl Iterator<Item = &TransformHookEntry> {
        self.transformers
            .iter()
            .filter(|h| matches!(h.pattern, HookPattern::Hmr))
    }

    pub fn main_transformers(&self) -> impl Iterator<Item = &TransformHookEntry> {
        self.transformers
            .iter()
            .filter(|h| matches!(h.pattern, HookPattern::Main))
    }

    /// Checksums of every hook that takes part in building `specifier`
    ///
    /// `with_hmr` adds the `Hmr` transformers, which rewrite local modules in
    /// development mode.
    pub fn matched_checksums<'a>(&'a self, specifier: &'a str, with_hmr: bool) -> Vec<&'a str> {
        let resolver = self.resolver_for(specifier).map(|h| h.checksum.as_str());
        let loader = self.loader_for(specifier).map(|h| h.checksum.as_str());
        let hmr = self
            .hmr_transformers()
            .filter(move |_| with_hmr)
            .map(|h| h.checksum.as_str());
        resolver
            .into_iter()
            .chain(loader)
            .chain(self.transformers_for(specifier).map(|h| h.checksum.as_str()))
            .chain(hmr)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty() && self.loaders.is_empty() && self.transformers.is_empty()
    }
}
