//! Commands behind the `weft` binary
//!
//! Everything here works on the artifact cache directory alone: sidecars are
//! read straight from disk and no module is compiled.

use std::collections::HashSet;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use walkdir::WalkDir;
use weft_cache::layout::META_EXTENSION;
use weft_cache::{ArtifactCache, CacheManifest, ModuleMeta};

/// Artifact counts for one build-mode directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSummary {
    pub mode: String,
    pub modules: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSummary {
    pub manifest: Option<CacheManifest>,
    pub modes: Vec<ModeSummary>,
}

impl fmt::Display for CacheSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.manifest {
            Some(manifest) => {
                writeln!(f, "format:  {}", manifest.format)?;
                writeln!(
                    f,
                    "engine:  {} ({})",
                    manifest.engine.version, manifest.engine.checksum
                )?;
                writeln!(f, "target:  {}", manifest.target)?;
                writeln!(f, "created: {}", manifest.created_at.to_rfc3339())?;
            }
            None => writeln!(f, "no manifest")?,
        }
        for mode in &self.modes {
            writeln!(
                f,
                "{}: {} modules, {} bytes",
                mode.mode, mode.modules, mode.bytes
            )?;
        }
        Ok(())
    }
}

/// Summarise the manifest and per-mode contents of `cache_dir`
pub fn cache_info(cache_dir: &Path) -> Result<CacheSummary> {
    let manifest = CacheManifest::load(cache_dir);
    let mut modes = Vec::new();

    let entries = match std::fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(CacheSummary { manifest, modes })
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", cache_dir.display()))
        }
    };

    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read {}", cache_dir.display()))?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let mut summary = ModeSummary {
            mode: entry.file_name().to_string_lossy().into_owned(),
            modules: 0,
            bytes: 0,
        };
        for file in WalkDir::new(entry.path()) {
            let file = file?;
            if !file.file_type().is_file() {
                continue;
            }
            summary.bytes += file.metadata()?.len();
            if file.file_name().to_string_lossy().ends_with(META_EXTENSION) {
                summary.modules += 1;
            }
        }
        modes.push(summary);
    }
    modes.sort_by(|a, b| a.mode.cmp(&b.mode));

    Ok(CacheSummary { manifest, modes })
}

/// Delete the whole cache directory; returns whether anything was there
pub fn clean(cache_dir: &Path) -> Result<bool> {
    match std::fs::remove_dir_all(cache_dir) {
        Ok(()) => {
            info!(cache_dir = %cache_dir.display(), "Removed artifact cache");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", cache_dir.display())),
    }
}

/// The stored sidecar of `specifier`
pub fn inspect(cache: &ArtifactCache, specifier: &str) -> Result<ModuleMeta> {
    match read_meta(cache, specifier)? {
        Some(meta) => Ok(meta),
        None => bail!("No cached build for {specifier}"),
    }
}

/// One dependency record reached while walking sidecars
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepEdge {
    pub importer: String,
    pub specifier: String,
    pub is_dynamic: bool,
    /// Whether the dependency has a sidecar of its own
    pub cached: bool,
}

impl fmt::Display for DepEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.importer, self.specifier)?;
        if self.is_dynamic {
            write!(f, " (dynamic)")?;
        }
        if !self.cached {
            write!(f, " (not cached)")?;
        }
        Ok(())
    }
}

/// Dependency closure of `specifier` as recorded in sidecars
///
/// Each module's direct dependencies are listed before any of them is
/// expanded, and every module is expanded once.
pub fn dependency_closure(cache: &ArtifactCache, specifier: &str) -> Result<Vec<DepEdge>> {
    let root = inspect(cache, specifier)?;
    let mut expanded = HashSet::from([specifier.to_string()]);
    let mut edges = Vec::new();
    walk(cache, root, &mut expanded, &mut edges)?;
    Ok(edges)
}

fn walk(
    cache: &ArtifactCache,
    meta: ModuleMeta,
    expanded: &mut HashSet<String>,
    edges: &mut Vec<DepEdge>,
) -> Result<()> {
    let mut children = Vec::new();
    for dep in &meta.deps {
        let child = read_meta(cache, &dep.specifier)?;
        edges.push(DepEdge {
            importer: meta.specifier.clone(),
            specifier: dep.specifier.clone(),
            is_dynamic: dep.is_dynamic,
            cached: child.is_some(),
        });
        children.push(child);
    }
    for child in children.into_iter().flatten() {
        if expanded.insert(child.specifier.clone()) {
            walk(cache, child, expanded, edges)?;
        }
    }
    Ok(())
}

fn read_meta(cache: &ArtifactCache, specifier: &str) -> Result<Option<ModuleMeta>> {
    let path = cache.meta_path(specifier);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    match ModuleMeta::decode(&bytes, specifier) {
        Some(meta) => Ok(Some(meta)),
        None => {
            debug!(path = %path.display(), "Sidecar does not describe {}", specifier);
            bail!("Corrupt metadata sidecar at {}", path.display())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use weft_core::{BuildMode, Dependency, EngineFingerprint};

    fn write_meta(cache: &ArtifactCache, specifier: &str, deps: Vec<Dependency>) {
        let meta = ModuleMeta {
            specifier: specifier.to_string(),
            deps,
            source_hash: "ab".repeat(32),
            http_external: false,
            metadata: Default::default(),
        };
        let path = cache.meta_path(specifier);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_vec(&meta).unwrap()).unwrap();
    }

    fn sample_cache(dir: &Path) -> ArtifactCache {
        let cache = ArtifactCache::new(dir, BuildMode::Development, false);
        write_meta(
            &cache,
            "/pages/index.tsx",
            vec![
                Dependency::new("/components/button.tsx"),
                Dependency::dynamic("/lib/lazy.ts"),
            ],
        );
        write_meta(
            &cache,
            "/components/button.tsx",
            vec![Dependency::new("/pages/index.tsx"), Dependency::new("/lib/theme.ts")],
        );
        write_meta(&cache, "/lib/lazy.ts", vec![]);
        cache
    }

    #[test]
    fn test_dependency_closure_order_and_cycles() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = sample_cache(dir.path());

        let edges = dependency_closure(&cache, "/pages/index.tsx")?;
        let rendered: Vec<String> = edges.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "/pages/index.tsx -> /components/button.tsx",
                "/pages/index.tsx -> /lib/lazy.ts (dynamic)",
                "/components/button.tsx -> /pages/index.tsx",
                "/components/button.tsx -> /lib/theme.ts (not cached)",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_inspect_missing_and_corrupt() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = sample_cache(dir.path());

        assert!(inspect(&cache, "/nope.ts").is_err());
        std::fs::write(cache.meta_path("/lib/lazy.ts"), b"[]")?;
        let err = inspect(&cache, "/lib/lazy.ts").unwrap_err();
        assert!(err.to_string().contains("Corrupt"));
        Ok(())
    }

    #[test]
    fn test_cache_info_counts_sidecars() -> Result<()> {
        let dir = tempfile::tempdir()?;
        sample_cache(dir.path());
        CacheManifest::new(EngineFingerprint::new("1.0.0", "abc"), "es2020").save(dir.path())?;

        let summary = cache_info(dir.path())?;
        assert_eq!(summary.modes.len(), 1);
        assert_eq!(summary.modes[0].mode, "development");
        assert_eq!(summary.modes[0].modules, 3);
        assert!(summary.to_string().contains("engine:  1.0.0 (abc)"));
        Ok(())
    }

    #[test]
    fn test_clean() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache_dir = dir.path().join(".weft");
        sample_cache(&cache_dir);

        assert!(clean(&cache_dir)?);
        assert!(!cache_dir.exists());
        assert!(!clean(&cache_dir)?);
        assert!(cache_info(&cache_dir)?.modes.is_empty());
        Ok(())
    }
}
