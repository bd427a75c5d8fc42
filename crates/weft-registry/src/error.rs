use std::path::PathBuf;

use thiserror::Error;
use weft_cache::CacheError;
use weft_core::CoreError;

/// Error raised by extension or engine code
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Source not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Specifier escapes the project root: {0}")]
    OutsideRoot(String),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Fetching {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Fetching {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },
}

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Resolver '{hook}' failed for {specifier}: {source}")]
    Resolve {
        specifier: String,
        hook: String,
        source: BoxError,
    },

    #[error("Failed to load {specifier}: {source}")]
    Load {
        specifier: String,
        source: LoadError,
    },

    #[error("Hook '{hook}' failed for {specifier}: {source}")]
    Hook {
        specifier: String,
        hook: String,
        source: BoxError,
    },

    #[error("Transform failed for {specifier}: {source}")]
    Transform {
        specifier: String,
        source: BoxError,
    },

    #[error("Dependency {dependency} of {specifier} failed: {source}")]
    Dependency {
        specifier: String,
        dependency: String,
        source: Box<CompileError>,
    },

    #[error("Module not registered: {0}")]
    NotRegistered(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CompileError {
    pub(crate) fn hook(specifier: &str, hook: &str, source: anyhow::Error) -> Self {
        Self::Hook {
            specifier: specifier.to_string(),
            hook: hook.to_string(),
            source: source.into(),
        }
    }

    /// The specifier the failure is attributed to, if any
    pub fn specifier(&self) -> Option<&str> {
        match self {
            Self::Resolve { specifier, .. }
            | Self::Load { specifier, .. }
            | Self::Hook { specifier, .. }
            | Self::Transform { specifier, .. }
            | Self::Dependency { specifier, .. }
            | Self::NotRegistered(specifier) => Some(specifier.as_str()),
            Self::Client(_) | Self::Cache(_) | Self::Core(_) => None,
        }
    }

    /// The innermost failure along a chain of dependency errors
    pub fn root_cause(&self) -> &CompileError {
        match self {
            Self::Dependency { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
