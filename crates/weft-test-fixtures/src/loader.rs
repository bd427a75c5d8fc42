use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use weft_core::hooks::{LoadRequest, LoaderHook, LoaderHookEntry};
use weft_core::specifier::extension;
use weft_core::{Hook, HookPattern, LoadedSource};

/// Loader hook serving sources from memory
#[derive(Debug, Default)]
pub struct MemoryLoader {
    sources: DashMap<String, String>,
    loads: DashMap<String, usize>,
}

impl MemoryLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, specifier: &str, code: &str) {
        self.sources.insert(specifier.to_string(), code.to_string());
    }

    pub fn remove(&self, specifier: &str) {
        self.sources.remove(specifier);
    }

    pub fn loads(&self, specifier: &str) -> usize {
        self.loads.get(specifier).map(|c| *c).unwrap_or(0)
    }

    /// Hook entry matching `pattern`, checksum `memory@1`
    pub fn hook(self: &Arc<Self>, pattern: &str) -> LoaderHookEntry {
        Hook::new(
            "memory",
            "memory@1",
            HookPattern::regex(pattern).unwrap(),
            Arc::clone(self) as Arc<dyn LoaderHook>,
        )
    }
}

impl LoaderHook for MemoryLoader {
    fn load<'a>(&'a self, request: LoadRequest<'a>) -> BoxFuture<'a, anyhow::Result<LoadedSource>> {
        async move {
            *self.loads.entry(request.specifier.to_string()).or_insert(0) += 1;
            let code = self
                .sources
                .get(request.specifier)
                .map(|c| c.clone())
                .ok_or_else(|| anyhow::anyhow!("no source for {}", request.specifier))?;
            Ok(LoadedSource {
                code: code.into_bytes(),
                kind: extension(request.specifier).unwrap_or("js").to_string(),
                map: None,
            })
        }
        .boxed()
    }
}
