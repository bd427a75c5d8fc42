//! The module record tracked by the registry
//!
//! A [`Module`] is the in-memory state of one specifier: its dependency edges,
//! its source hash, where its compiled output lives, and (optionally) the
//! compiled bytes themselves. The serializable parts of a module round-trip
//! through the metadata sidecar written next to the compiled output.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::specifier;

/// Source languages the transform engine accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Js,
    Jsx,
    Mjs,
    Ts,
    Tsx,
    Css,
    Json,
}

impl SourceKind {
    /// Parse a kind reported by a loader (`"tsx"`, `"css"`, ...)
    ///
    /// Returns `None` for kinds the engine does not understand; the
    /// orchestrator logs and skips such modules.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "js" | "javascript" => Some(Self::Js),
            "jsx" => Some(Self::Jsx),
            "mjs" => Some(Self::Mjs),
            "ts" | "typescript" => Some(Self::Ts),
            "tsx" => Some(Self::Tsx),
            "css" => Some(Self::Css),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Kind implied by a specifier's extension
    pub fn from_specifier(spec: &str) -> Option<Self> {
        specifier::extension(spec).and_then(Self::parse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Js => "js",
            Self::Jsx => "jsx",
            Self::Mjs => "mjs",
            Self::Ts => "ts",
            Self::Tsx => "tsx",
            Self::Css => "css",
            Self::Json => "json",
        }
    }

    /// Script kinds are replaced by `.js` in derived output paths
    pub fn is_script(&self) -> bool {
        matches!(
            self,
            Self::Js | Self::Jsx | Self::Mjs | Self::Ts | Self::Tsx
        )
    }
}

/// One edge from a module to something it imports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    /// Registry key of the imported module, after the import map and resolvers
    pub specifier: String,

    /// Import text as written in the importer, when resolution rewrote it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_dynamic: bool,

    /// Byte offset of the 6-char hash slot embedded in the importer's output.
    /// Only present for locally rewritten imports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_location: Option<usize>,
}

impl Dependency {
    pub fn new(specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            requested: None,
            is_dynamic: false,
            hash_location: None,
        }
    }

    pub fn dynamic(specifier: impl Into<String>) -> Self {
        Self {
            is_dynamic: true,
            ..Self::new(specifier)
        }
    }

    /// Record the pre-resolution import text if it differs from the key
    pub fn requested_as(mut self, requested: &str) -> Self {
        if requested != self.specifier {
            self.requested = Some(requested.to_string());
        }
        self
    }

    /// Specifier to hand back to the compiler when linking this edge
    pub fn request(&self) -> &str {
        self.requested.as_deref().unwrap_or(&self.specifier)
    }
}

/// Flags the transform engine reports about a module
///
/// Opaque to the registry; consumed by page rendering and hot reloading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMetadata {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_style: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deno_hooks: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_fetch_fn: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub static_paths_fn: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_class_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub specifier: String,
    pub deps: Vec<Dependency>,
    /// Empty until the first successful load
    pub source_hash: String,
    pub compiled_path: PathBuf,
    /// Held compiled output; `None` when never built or evicted from memory
    pub compiled: Option<Vec<u8>>,
    pub source_map: Option<String>,
    pub external: bool,
    pub http_external: bool,
    pub kind: Option<SourceKind>,
    pub metadata: ModuleMetadata,
}

impl Module {
    pub fn new(specifier: impl Into<String>) -> Self {
        let specifier = specifier.into();
        Self {
            kind: SourceKind::from_specifier(&specifier),
            specifier,
            ..Default::default()
        }
    }

    /// A reference that is never compiled locally: no deps, no hash, no bytes
    pub fn external(specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            external: true,
            ..Default::default()
        }
    }

    pub fn is_remote(&self) -> bool {
        specifier::is_remote(&self.specifier)
    }

    /// Whether a source hash has ever been recorded
    pub fn is_built(&self) -> bool {
        !self.source_hash.is_empty()
    }

    pub fn dependency(&self, specifier: &str) -> Option<&Dependency> {
        self.deps.iter().find(|d| d.specifier == specifier)
    }

    /// Dependencies that carry an embedded hash marker
    pub fn hash_locations(&self) -> impl Iterator<Item = (&str, usize)> {
        self.deps
            .iter()
            .filter_map(|d| d.hash_location.map(|loc| (d.specifier.as_str(), loc)))
    }
}
