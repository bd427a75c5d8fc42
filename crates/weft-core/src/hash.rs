//! Content hashing and embedded hash markers
//!
//! Two hashes exist per module:
//!
//! - the **source hash** covers the raw source, the configuration entries that
//!   influence resolution, and the checksums of every extension hook that
//!   matched the specifier. It alone decides whether a module is recompiled.
//! - the **aggregate hash** folds in the source hashes of the transitive
//!   dependency closure. Its first [`SHORT_HASH_LEN`] hex chars are embedded in
//!   importers' output as a cache-busting marker and patched in place when a
//!   dependency changes.
//!
//! Markers are fixed width. A patch overwrites exactly [`SHORT_HASH_LEN`] bytes
//! and never changes the length of the buffer, so recorded offsets stay valid.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// Width of an embedded hash marker
pub const SHORT_HASH_LEN: usize = 6;

/// Marker value emitted by the transform engine before the first patch
pub const HASH_PLACEHOLDER: &str = "000000";

/// Builder for a module's source hash
#[derive(Debug, Clone, Default)]
pub struct SourceHasher {
    source: Sha256,
    config: BTreeMap<String, String>,
    checksums: Vec<String>,
}

impl SourceHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw source bytes
    pub fn source(&mut self, bytes: &[u8]) -> &mut Self {
        self.source.update(bytes);
        self
    }

    /// Add a configuration entry relevant to resolution (import map, target, ...)
    pub fn config_entry(&mut self, key: &str, value: &str) -> &mut Self {
        self.config.insert(key.to_string(), value.to_string());
        self
    }

    /// Add the checksum of an extension hook that matched this specifier
    pub fn extension_checksum(&mut self, checksum: &str) -> &mut Self {
        self.checksums.push(checksum.to_string());
        self
    }

    pub fn finish(&self) -> String {
        let mut hasher = self.source.clone();

        hasher.update(b"\0config\0");
        for (key, value) in &self.config {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }

        // Registration order of hooks must not leak into the hash
        let mut checksums = self.checksums.clone();
        checksums.sort();
        hasher.update(b"\0extensions\0");
        for checksum in &checksums {
            hasher.update(checksum.as_bytes());
            hasher.update(b"\n");
        }

        hex::encode(hasher.finalize())
    }
}

/// Hash of a module seeded with its own source hash, then each dependency's
/// source hash in traversal order
pub fn aggregate_hash<'a>(
    source_hash: &str,
    dep_source_hashes: impl IntoIterator<Item = &'a str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_hash.as_bytes());
    for dep_hash in dep_source_hashes {
        hasher.update(dep_hash.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// The marker-sized prefix of a hash
pub fn short_hash(hash: &str) -> &str {
    hash.get(..SHORT_HASH_LEN).unwrap_or(hash)
}

/// Text that precedes the hash slot for `dep_specifier` in compiled output
pub fn marker_prefix(dep_specifier: &str) -> String {
    format!("#{dep_specifier}@")
}

/// Unpatched marker as emitted by the transform engine
pub fn placeholder_marker(dep_specifier: &str) -> String {
    format!("{}{HASH_PLACEHOLDER}", marker_prefix(dep_specifier))
}

/// Find the hash slot the engine embedded for `dep_specifier`
///
/// Returns the byte offset of the first char of the slot. The engine emits a
/// single marker per dependency; should the text appear again later, only the
/// first slot is the one patched.
pub fn locate_hash_marker(code: &[u8], dep_specifier: &str) -> Option<usize> {
    let marker = placeholder_marker(dep_specifier);
    let needle = marker.as_bytes();
    if needle.len() > code.len() {
        return None;
    }
    code.windows(needle.len())
        .position(|window| window == needle)
        .map(|idx| idx + needle.len() - SHORT_HASH_LEN)
}

/// Current contents of the hash slot at `offset`
pub fn read_short_hash(buf: &[u8], offset: usize) -> Option<&str> {
    let end = offset.checked_add(SHORT_HASH_LEN)?;
    buf.get(offset..end)
        .and_then(|slot| std::str::from_utf8(slot).ok())
}

/// Overwrite the slot at `offset` with `short`
///
/// Returns `Ok(true)` when the bytes changed and `Ok(false)` when the slot
/// already held `short`.
pub fn patch_short_hash(buf: &mut [u8], offset: usize, short: &str) -> Result<bool, CoreError> {
    if short.len() != SHORT_HASH_LEN || !short.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CoreError::InvalidHash(short.to_string()));
    }
    let len = buf.len();
    let slot = offset
        .checked_add(SHORT_HASH_LEN)
        .and_then(|end| buf.get_mut(offset..end))
        .ok_or(CoreError::HashLocationOutOfRange { offset, len })?;

    if slot == short.as_bytes() {
        return Ok(false);
    }
    slot.copy_from_slice(short.as_bytes());
    Ok(true)
}
