//! # Cache Keys
//!
//! Maps remote URLs to stable, filesystem-safe file names. The name is the
//! SHA-256 digest of the full URL string rendered as lowercase hex, with the
//! extension carried over from the URL path when it looks like a real one.

use sha2::{Digest, Sha256};
use url::Url;

use crate::store::PART_SUFFIX;

/// Longest extension carried over from a URL path.
const MAX_EXT_LEN: usize = 8;

/// Identifier for one remote asset inside the cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hash: String,
    ext: Option<String>,
}

impl CacheKey {
    /// Derive the key for a remote URL.
    ///
    /// Pure and total: the same URL always yields the same key, in this
    /// process and across restarts, and distinct URLs collide only with
    /// SHA-256 probability.
    pub fn derive(url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());

        Self {
            hash: hex::encode(hasher.finalize()),
            ext: extension_of(url),
        }
    }

    /// File name this key resolves to: `<hash>.<ext>` or bare `<hash>`.
    /// Always a single path component.
    pub fn file_name(&self) -> String {
        match &self.ext {
            Some(ext) => format!("{}.{ext}", self.hash),
            None => self.hash.clone(),
        }
    }

    /// Hex digest portion of the key.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Extract a plausible file extension from the URL path.
///
/// Query and fragment never contribute. The extension is kept only when it
/// is 1..=8 ASCII alphanumeric characters; anything else stores the entry
/// extension-less. `part` is rejected: that suffix marks in-progress writes.
fn extension_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;

    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXT_LEN {
        return None;
    }
    if !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    if ext.eq_ignore_ascii_case(PART_SUFFIX) {
        return None;
    }

    Some(ext.to_ascii_lowercase())
}
