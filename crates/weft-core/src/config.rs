//! Build configuration
//!
//! Loaded from a TOML file (usually `weft.toml`). Every field has a default so
//! an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::import_map::ImportMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Development,
    Production,
}

impl BuildMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Network fetch policy for remote specifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_retries() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("weft/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Directory that local specifiers are resolved against
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub mode: BuildMode,
    #[serde(default = "default_target")]
    pub target: String,
    /// Write the bundling variant of each artifact instead of the plain one
    #[serde(default)]
    pub bundle: bool,
    #[serde(default)]
    pub import_map: ImportMap,
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Upper bound on compiled buffers held in memory (0 = unbounded)
    #[serde(default)]
    pub max_resident_modules: usize,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".weft")
}

fn default_target() -> String {
    "es2020".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            cache_dir: default_cache_dir(),
            mode: BuildMode::default(),
            target: default_target(),
            bundle: false,
            import_map: ImportMap::default(),
            fetch: FetchConfig::default(),
            max_resident_modules: 0,
        }
    }
}

impl BuildConfig {
    /// Defaults rooted at `root`, with the cache in `<root>/.weft`
    pub fn for_project(root: impl Into<PathBuf>) -> Self {
        let root_dir = root.into();
        Self {
            cache_dir: root_dir.join(default_cache_dir()),
            root_dir,
            ..Default::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CoreError> {
        Ok(toml::from_str(content)?)
    }

    /// Entries that feed every module's source hash
    pub fn hash_entries(&self) -> Vec<(String, String)> {
        self.import_map
            .entries()
            .map(|(k, v)| (format!("import:{k}"), v.to_string()))
            .chain(std::iter::once(("target".to_string(), self.target.clone())))
            .collect()
    }

    /// Fingerprint of everything that affects all outputs at once
    pub fn target_fingerprint(&self) -> String {
        format!(
            "{}:{}:{}",
            self.target,
            self.mode.as_str(),
            if self.bundle { "bundle" } else { "module" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::SourceHasher;
    use proptest::prelude::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = BuildConfig::from_toml_str("").unwrap();
        assert_eq!(config, BuildConfig::default());
        assert_eq!(config.target, "es2020");
        assert_eq!(config.fetch.retries, 2);
        assert!(config.mode.is_development());
    }

    #[test]
    fn test_full_config() {
        let config = BuildConfig::from_toml_str(
            r#"
            root_dir = "app"
            cache_dir = "app/.cache"
            mode = "production"
            target = "es2018"
            bundle = true
            max_resident_modules = 128

            [import_map]
            "react" = "https://esm.sh/react@17.0.2"

            [fetch]
            retries = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.root_dir, PathBuf::from("app"));
        assert_eq!(config.mode, BuildMode::Production);
        assert!(config.bundle);
        assert_eq!(config.max_resident_modules, 128);
        assert_eq!(config.fetch.retries, 5);
        assert_eq!(config.fetch.timeout_secs, 30);
        assert_eq!(config.target_fingerprint(), "es2018:production:bundle");
        assert_eq!(
            config.hash_entries(),
            vec![
                (
                    "import:react".to_string(),
                    "https://esm.sh/react@17.0.2".to_string()
                ),
                ("target".to_string(), "es2018".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_mode_is_rejected() {
        let err = BuildConfig::from_toml_str(r#"mode = "staging""#).unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weft.toml");
        std::fs::write(&path, "target = \"esnext\"\n").unwrap();
        let config = BuildConfig::load(&path).unwrap();
        assert_eq!(config.target, "esnext");

        let missing = BuildConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(CoreError::ConfigIo { .. })));
    }

    #[test]
    fn test_for_project() {
        let config = BuildConfig::for_project("/srv/site");
        assert_eq!(config.root_dir, PathBuf::from("/srv/site"));
        assert_eq!(config.cache_dir, PathBuf::from("/srv/site/.weft"));
    }

    fn config_digest(config: &BuildConfig) -> String {
        let mut hasher = SourceHasher::new();
        hasher.source(b"export default 1");
        for (key, value) in config.hash_entries() {
            hasher.config_entry(&key, &value);
        }
        hasher.finish()
    }

    proptest! {
        #[test]
        fn prop_import_map_insertion_order_does_not_change_hash(
            shuffled in proptest::collection::btree_map("[a-z~@/]{1,10}", "/[a-z/]{1,12}", 0..8)
                .prop_map(|entries| entries.into_iter().collect::<Vec<_>>())
                .prop_shuffle(),
        ) {
            let mut sorted = BuildConfig::default();
            let mut sorted_entries = shuffled.clone();
            sorted_entries.sort();
            for (key, target) in &sorted_entries {
                sorted.import_map.insert(key.clone(), target.clone());
            }

            let mut arbitrary = BuildConfig::default();
            for (key, target) in &shuffled {
                arbitrary.import_map.insert(key.clone(), target.clone());
            }

            let mut reversed = BuildConfig::default();
            for (key, target) in shuffled.iter().rev() {
                reversed.import_map.insert(key.clone(), target.clone());
            }

            prop_assert_eq!(sorted.hash_entries(), arbitrary.hash_entries());
            prop_assert_eq!(sorted.hash_entries(), reversed.hash_entries());
            prop_assert_eq!(config_digest(&sorted), config_digest(&arbitrary));
            prop_assert_eq!(config_digest(&sorted), config_digest(&reversed));
        }
    }
}
