use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid hook pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid short hash: {0:?}")]
    InvalidHash(String),

    #[error("Hash location {offset} out of range for a buffer of {len} bytes")]
    HashLocationOutOfRange { offset: usize, len: usize },

    #[error("Failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
