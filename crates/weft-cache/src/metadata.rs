//! Metadata sidecar written next to each compiled output

use serde::{Deserialize, Serialize};
use weft_core::{Dependency, Module, ModuleMetadata};

/// Persisted, serializable part of a [`Module`]
///
/// Compiled bytes and the ready signal are in-memory only and never written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMeta {
    pub specifier: String,
    pub deps: Vec<Dependency>,
    pub source_hash: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub http_external: bool,
    #[serde(flatten)]
    pub metadata: ModuleMetadata,
}

impl ModuleMeta {
    pub fn from_module(module: &Module) -> Self {
        Self {
            specifier: module.specifier.clone(),
            deps: module.deps.clone(),
            source_hash: module.source_hash.clone(),
            http_external: module.http_external,
            metadata: module.metadata.clone(),
        }
    }

    /// Decode a sidecar and check it describes `specifier`
    ///
    /// Returns `None` for malformed JSON, a different specifier, or an empty
    /// source hash. Field types (for example `deps` being a list) are enforced
    /// by deserialization.
    pub fn decode(bytes: &[u8], specifier: &str) -> Option<Self> {
        let meta: Self = serde_json::from_slice(bytes).ok()?;
        meta.is_consistent_with(specifier).then_some(meta)
    }

    pub fn is_consistent_with(&self, specifier: &str) -> bool {
        self.specifier == specifier && !self.source_hash.is_empty()
    }

    /// Restore a prior build into `module` without touching its source
    pub fn apply_to(self, module: &mut Module) {
        module.deps = self.deps;
        module.source_hash = self.source_hash;
        module.metadata = self.metadata;
        module.http_external |= self.http_external;
    }
}
