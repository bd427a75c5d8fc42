//! Whole-cache manifest
//!
//! Stored as `manifest.json` at the cache root. It records which engine build
//! and which target configuration produced the artifacts below it. When either
//! differs from the running configuration the entire cache directory is
//! discarded before any module is compiled.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use weft_core::EngineFingerprint;

use crate::error::CacheError;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Layout revision of the cache directory itself
pub const CACHE_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheManifest {
    pub format: u32,
    pub engine: EngineFingerprint,
    /// `target:mode:variant`, see `BuildConfig::target_fingerprint`
    pub target: String,
    pub created_at: DateTime<Utc>,
}

impl CacheManifest {
    pub fn new(engine: EngineFingerprint, target: impl Into<String>) -> Self {
        Self {
            format: CACHE_FORMAT,
            engine,
            target: target.into(),
            created_at: Utc::now(),
        }
    }

    /// Read the manifest; any failure is a miss
    pub fn load(cache_dir: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(cache_dir.join(MANIFEST_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(cache_dir).map_err(|e| CacheError::io(cache_dir, e))?;
        let path = cache_dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| CacheError::io(path, e))
    }

    pub fn matches(&self, engine: &EngineFingerprint, target: &str) -> bool {
        self.format == CACHE_FORMAT && &self.engine == engine && self.target == target
    }

    /// Validate `cache_dir` against the running engine and target
    ///
    /// On mismatch (or a missing or unreadable manifest) every artifact under
    /// `cache_dir` is removed and a fresh manifest is written. Returns `true`
    /// when existing content was discarded.
    pub fn prepare(
        cache_dir: &Path,
        engine: &EngineFingerprint,
        target: &str,
    ) -> Result<bool, CacheError> {
        if let Some(existing) = Self::load(cache_dir) {
            if existing.matches(engine, target) {
                debug!(cache_dir = %cache_dir.display(), "Cache manifest matches");
                return Ok(false);
            }
            info!(
                cache_dir = %cache_dir.display(),
                previous_engine = %existing.engine.version,
                previous_target = %existing.target,
                "Engine or target changed, discarding artifact cache"
            );
        }

        let discarded = has_entries(cache_dir)?;
        if discarded {
            std::fs::remove_dir_all(cache_dir).map_err(|e| CacheError::io(cache_dir, e))?;
        }

        Self::new(engine.clone(), target).save(cache_dir)?;
        Ok(discarded)
    }
}

fn has_entries(dir: &Path) -> Result<bool, CacheError> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CacheError::io(dir, e)),
    }
}
