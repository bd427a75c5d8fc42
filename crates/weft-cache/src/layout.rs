//! Derivation of on-disk artifact paths from specifiers
//!
//! ```text
//! /pages/index.tsx               -> pages/index
//! /style/app.css                 -> style/app.css
//! https://deno.land/x/mod.ts     -> -/deno.land/x/mod
//! http://localhost:8080/a.js     -> -/localhost_8080/a
//! https://esm.sh/react?dev       -> -/esm.sh/react.<6 hex of query>
//! ```
//!
//! The stem is then suffixed per artifact: `.js` / `.bundling.js` for compiled
//! output, `.meta.json` for the sidecar, `<output>.map` for source maps. Script
//! extensions are dropped from the stem; anything else keeps its extension, so
//! `app.css` compiles to `app.css.js`.

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use weft_core::hash::short_hash;
use weft_core::specifier::{is_remote, query, strip_query};
use weft_core::SourceKind;

/// Which compiled output flavour a cache writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactVariant {
    Module,
    Bundling,
}

impl ArtifactVariant {
    pub fn from_bundle_flag(bundle: bool) -> Self {
        if bundle {
            Self::Bundling
        } else {
            Self::Module
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Module => ".js",
            Self::Bundling => ".bundling.js",
        }
    }

    pub fn alternate(&self) -> Self {
        match self {
            Self::Module => Self::Bundling,
            Self::Bundling => Self::Module,
        }
    }
}

pub const META_EXTENSION: &str = ".meta.json";
pub const MAP_EXTENSION: &str = ".map";

/// Relative stem (no artifact suffix) for a specifier
pub fn derived_stem(specifier: &str) -> PathBuf {
    let base = strip_query(specifier);

    let mut segments: Vec<String> = Vec::new();
    let path_part = if is_remote(base) {
        segments.push("-".to_string());
        base.split_once("://").map(|(_, rest)| rest).unwrap_or(base)
    } else {
        base
    };

    for segment in path_part.split('/') {
        match segment {
            "" | "." => continue,
            ".." => segments.push("__".to_string()),
            s => segments.push(s.replace(':', "_")),
        }
    }

    if segments.is_empty() || segments == ["-"] {
        segments.push("index".to_string());
    }

    if let Some(last) = segments.last_mut() {
        if let Some(kind) = SourceKind::from_specifier(base) {
            if kind.is_script() {
                if let Some((stem, _)) = last.rsplit_once('.') {
                    *last = stem.to_string();
                }
            }
        }
        if let Some(q) = query(specifier) {
            let digest = hex::encode(Sha256::digest(q.as_bytes()));
            last.push('.');
            last.push_str(short_hash(&digest));
        }
    }

    segments.iter().collect()
}

pub(crate) fn with_suffix(stem: &std::path::Path, suffix: &str) -> PathBuf {
    let mut os = stem.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
