//! Loader used when no loader hook matches a specifier
//!
//! Local specifiers are read from the project root; `http(s)` specifiers are
//! fetched with a bounded number of retries on transient failures.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};
use weft_core::specifier::{extension, is_remote, strip_query};
use weft_core::{BuildConfig, LoadedSource};

use crate::error::{CompileError, LoadError};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct FallbackLoader {
    root_dir: PathBuf,
    client: reqwest::Client,
    retries: u32,
}

impl FallbackLoader {
    pub fn new(config: &BuildConfig) -> Result<Self, CompileError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch.timeout_secs))
            .user_agent(config.fetch.user_agent.clone())
            .build()
            .map_err(CompileError::Client)?;

        Ok(Self {
            root_dir: config.root_dir.clone(),
            client,
            retries: config.fetch.retries,
        })
    }

    pub async fn load(&self, specifier: &str) -> Result<LoadedSource, LoadError> {
        if is_remote(specifier) {
            self.fetch(specifier).await
        } else {
            self.read_local(specifier).await
        }
    }

    async fn read_local(&self, specifier: &str) -> Result<LoadedSource, LoadError> {
        let relative = Path::new(strip_query(specifier).trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            warn!(specifier, "Refusing to read outside the project root");
            return Err(LoadError::OutsideRoot(specifier.to_string()));
        }
        let path = self.root_dir.join(relative);
        let code = match tokio::fs::read(&path).await {
            Ok(code) => code,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(LoadError::NotFound(path)),
            Err(source) => return Err(LoadError::Io { path, source }),
        };

        Ok(LoadedSource {
            code,
            kind: extension(specifier).unwrap_or("js").to_string(),
            map: None,
        })
    }

    async fn fetch(&self, url: &str) -> Result<LoadedSource, LoadError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(source) => return Ok(source),
                Err(e) if attempt < self.retries && is_transient(&e) => {
                    attempt += 1;
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1);
                    warn!(url, attempt, error = %e, "Fetch failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<LoadedSource, LoadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| LoadError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let code = response
            .bytes()
            .await
            .map_err(|source| LoadError::Request {
                url: url.to_string(),
                source,
            })?
            .to_vec();

        debug!(url, bytes = code.len(), "Fetched remote source");
        Ok(LoadedSource {
            code,
            kind: remote_kind(url, content_type.as_deref()).to_string(),
            map: None,
        })
    }
}

fn is_transient(err: &LoadError) -> bool {
    match err {
        LoadError::Request { .. } => true,
        LoadError::Status { status, .. } => *status == 429 || *status >= 500,
        LoadError::NotFound(_) | LoadError::OutsideRoot(_) | LoadError::Io { .. } => false,
    }
}

/// Kind of a fetched module: URL extension first, then the content type
fn remote_kind<'a>(url: &'a str, content_type: Option<&str>) -> &'a str {
    if let Some(ext) = extension(url) {
        return ext;
    }
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .unwrap_or_default();
    match mime {
        "application/typescript" | "text/typescript" | "video/mp2t" => "ts",
        "text/tsx" => "tsx",
        "text/jsx" => "jsx",
        "text/css" => "css",
        "application/json" => "json",
        _ => "js",
    }
}
