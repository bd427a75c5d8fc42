//! Contract of the external transform engine
//!
//! The engine turns loaded source into executable output, reports the module's
//! dependencies, and reports metadata flags. For every local dependency it
//! rewrites, it embeds a fixed-width marker `#<specifier>@000000` into the
//! output (see [`crate::hash::placeholder_marker`]); the registry records the
//! byte offset of each marker and later patches it in place.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::config::BuildMode;
use crate::import_map::ImportMap;
use crate::module::{ModuleMetadata, SourceKind};

/// A dependency as reported by the engine or an extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyDescriptor {
    pub specifier: String,
    #[serde(default)]
    pub is_dynamic: bool,
}

impl DependencyDescriptor {
    pub fn new(specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            is_dynamic: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    pub specifier: &'a str,
    pub code: &'a [u8],
    pub kind: SourceKind,
    pub map: Option<&'a str>,
    pub import_map: &'a ImportMap,
    pub target: &'a str,
    pub mode: BuildMode,
    pub bundle: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    pub code: String,
    pub map: Option<String>,
    pub deps: Vec<DependencyDescriptor>,
    pub metadata: ModuleMetadata,
}

/// Identity of the engine build; a change invalidates the whole artifact cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFingerprint {
    pub version: String,
    pub checksum: String,
}

impl EngineFingerprint {
    pub fn new(version: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            checksum: checksum.into(),
        }
    }
}

/// Compiler that turns one module's source into output code
///
/// Each local import in the output carries exactly one hash marker,
/// `#<specifier>@000000`, written with the import text as it appears in the
/// source. Imports of the same specifier are merged into a single statement,
/// so one marker per dependency is all the registry records and patches.
pub trait TransformEngine: Send + Sync {
    fn fingerprint(&self) -> EngineFingerprint;

    fn transform<'a>(
        &'a self,
        request: TransformRequest<'a>,
    ) -> BoxFuture<'a, anyhow::Result<TransformOutput>>;
}
