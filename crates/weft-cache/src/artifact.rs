use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;
use weft_core::{BuildConfig, BuildMode, EngineFingerprint, Module};

use crate::error::CacheError;
use crate::layout::{derived_stem, with_suffix, ArtifactVariant, MAP_EXTENSION, META_EXTENSION};
use crate::manifest::CacheManifest;
use crate::metadata::ModuleMeta;

/// Outcome of reading a metadata sidecar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaLookup {
    Missing,
    /// Present but malformed or describing another module
    Corrupt,
    Found(ModuleMeta),
}

/// Per-mode artifact store rooted at `<cache_dir>/<mode>`
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    cache_dir: PathBuf,
    mode_dir: PathBuf,
    variant: ArtifactVariant,
}

impl ArtifactCache {
    pub fn new(cache_dir: impl Into<PathBuf>, mode: BuildMode, bundle: bool) -> Self {
        let cache_dir = cache_dir.into();
        Self {
            mode_dir: cache_dir.join(mode.as_str()),
            cache_dir,
            variant: ArtifactVariant::from_bundle_flag(bundle),
        }
    }

    /// Open the cache for `config`, discarding it first if the manifest does
    /// not match `engine` and the configured target
    ///
    /// The boolean is `true` when previous artifacts were discarded.
    pub fn open(
        config: &BuildConfig,
        engine: &EngineFingerprint,
    ) -> Result<(Self, bool), CacheError> {
        let discarded =
            CacheManifest::prepare(&config.cache_dir, engine, &config.target_fingerprint())?;
        Ok((
            Self::new(&config.cache_dir, config.mode, config.bundle),
            discarded,
        ))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn mode_dir(&self) -> &Path {
        &self.mode_dir
    }

    pub fn variant(&self) -> ArtifactVariant {
        self.variant
    }

    pub fn compiled_path(&self, specifier: &str) -> PathBuf {
        self.variant_path(specifier, self.variant)
    }

    pub fn meta_path(&self, specifier: &str) -> PathBuf {
        with_suffix(&self.mode_dir.join(derived_stem(specifier)), META_EXTENSION)
    }

    pub fn source_map_path(&self, specifier: &str) -> PathBuf {
        with_suffix(&self.compiled_path(specifier), MAP_EXTENSION)
    }

    fn variant_path(&self, specifier: &str, variant: ArtifactVariant) -> PathBuf {
        with_suffix(
            &self.mode_dir.join(derived_stem(specifier)),
            variant.extension(),
        )
    }

    pub async fn exists(&self, specifier: &str) -> bool {
        fs::try_exists(self.compiled_path(specifier))
            .await
            .unwrap_or(false)
    }

    /// Compiled bytes on disk, `None` when absent
    pub async fn read(&self, specifier: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.compiled_path(specifier);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    pub async fn read_source_map(&self, specifier: &str) -> Option<String> {
        fs::read_to_string(self.source_map_path(specifier)).await.ok()
    }

    pub async fn read_meta(&self, specifier: &str) -> MetaLookup {
        let path = self.meta_path(specifier);
        match fs::read(&path).await {
            Ok(bytes) => match ModuleMeta::decode(&bytes, specifier) {
                Some(meta) => MetaLookup::Found(meta),
                None => MetaLookup::Corrupt,
            },
            Err(e) if e.kind() == ErrorKind::NotFound => MetaLookup::Missing,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable metadata sidecar");
                MetaLookup::Corrupt
            }
        }
    }

    pub async fn discard_meta(&self, specifier: &str) -> Result<(), CacheError> {
        remove_if_exists(&self.meta_path(specifier)).await
    }

    /// Persist a module's compiled bytes, sidecar and source map
    ///
    /// The alternate variant's compiled output for the same module is removed.
    pub async fn write(&self, module: &Module) -> Result<(), CacheError> {
        let compiled = module
            .compiled
            .as_deref()
            .ok_or_else(|| CacheError::NothingToWrite(module.specifier.clone()))?;
        let specifier = module.specifier.as_str();

        let compiled_path = self.compiled_path(specifier);
        write_atomic(&compiled_path, compiled).await?;

        let meta = serde_json::to_vec(&ModuleMeta::from_module(module))?;
        write_atomic(&self.meta_path(specifier), &meta).await?;

        let map_path = self.source_map_path(specifier);
        match &module.source_map {
            Some(map) => write_atomic(&map_path, map.as_bytes()).await?,
            None => remove_if_exists(&map_path).await?,
        }

        let stale = self.variant_path(specifier, self.variant.alternate());
        remove_if_exists(&stale).await?;
        remove_if_exists(&with_suffix(&stale, MAP_EXTENSION)).await?;

        debug!(
            specifier = %specifier,
            path = %compiled_path.display(),
            bytes = compiled.len(),
            "Wrote artifact"
        );
        Ok(())
    }

    /// Remove every artifact of a module, in both variants
    pub async fn remove(&self, specifier: &str) -> Result<(), CacheError> {
        for variant in [self.variant, self.variant.alternate()] {
            let compiled = self.variant_path(specifier, variant);
            remove_if_exists(&with_suffix(&compiled, MAP_EXTENSION)).await?;
            remove_if_exists(&compiled).await?;
        }
        remove_if_exists(&self.meta_path(specifier)).await
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .await
        .map_err(|e| CacheError::io(dir, e))?;

    let tmp = dir.join(format!(".{}.tmp", Uuid::now_v7()));
    fs::write(&tmp, bytes)
        .await
        .map_err(|e| CacheError::io(&tmp, e))?;

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(CacheError::io(path, e));
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(path, e)),
    }
}
