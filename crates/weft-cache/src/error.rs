use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Module {0} has no compiled output to write")]
    NothingToWrite(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let err = CacheError::io(
            "/tmp/cache/pages/index.js",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("Cache I/O error"));
        assert!(msg.contains("pages/index.js"));
    }

    #[test]
    fn test_nothing_to_write_display() {
        let err = CacheError::NothingToWrite("/pages/index.tsx".to_string());
        assert!(err.to_string().contains("/pages/index.tsx"));
    }
}
