//! # Cache Store
//!
//! On-disk storage for cached assets. The filesystem is the source of
//! truth: an entry exists iff a complete, non-empty file sits at its
//! resolved path. Writes land in a `.part` sibling first and are published
//! with an atomic rename, so readers never observe a truncated entry.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio::fs;
use tracing::{debug, warn};

use crate::key::CacheKey;

/// Suffix marking in-progress temp files. Never visible as a cache entry.
pub(crate) const PART_SUFFIX: &str = "part";

/// Aggregate numbers for a cache directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of complete entries.
    pub entries: usize,
    /// Total size of complete entries in bytes.
    pub total_bytes: u64,
}

/// Store over a single flat cache directory, one file per key.
#[derive(Debug, Clone)]
pub struct CacheStore {
    cache_dir: PathBuf,
    initialized: Arc<AtomicBool>,
}

impl CacheStore {
    /// Create a store over the given directory. The directory itself is
    /// created lazily, on the first write.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Directory this store owns.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Create the cache directory if this store hasn't yet. Idempotent and
    /// safe under concurrent callers; `create_dir_all` tolerates the race.
    async fn ensure_initialized(&self) -> io::Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        fs::create_dir_all(&self.cache_dir).await?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Resolve the on-disk path for a key. Pure path composition, no
    /// filesystem access.
    pub fn resolved_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.file_name())
    }

    /// True iff a complete, non-empty entry is present for the key.
    ///
    /// In-progress writes live at a `.part` path, so they can never be
    /// reported here.
    pub async fn exists(&self, key: &CacheKey) -> io::Result<bool> {
        match fs::metadata(self.resolved_path(key)).await {
            Ok(meta) => Ok(meta.is_file() && meta.len() > 0),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write an entry and publish it atomically.
    ///
    /// The bytes go to `<name>.part` inside the cache directory, then a
    /// rename moves them to the final path. On any failure the temp file is
    /// removed and no final file appears.
    pub async fn write(&self, key: &CacheKey, data: Bytes) -> io::Result<PathBuf> {
        self.ensure_initialized().await?;

        let final_path = self.resolved_path(key);
        let temp_path = self
            .cache_dir
            .join(format!("{}.{PART_SUFFIX}", key.file_name()));

        if let Err(e) = fs::write(&temp_path, &data).await {
            warn!(path = ?temp_path, error = %e, "Failed to write cache temp file");
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            warn!(
                from = ?temp_path,
                to = ?final_path,
                error = %e,
                "Failed to publish cache entry"
            );
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        debug!(path = ?final_path, bytes = data.len(), "Cached entry published");
        Ok(final_path)
    }

    /// Delete entries whose modification time is older than `max_age`.
    /// Returns how many entries were removed.
    ///
    /// Best-effort: failures on individual entries are logged and skipped.
    /// Only a failure to list the directory itself aborts the sweep.
    /// `.part` files belong to in-flight writes and are left alone.
    pub async fn sweep_expired(&self, max_age: Duration) -> io::Result<usize> {
        let mut entries = match fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                warn!(dir = ?self.cache_dir, error = %e, "Failed to read cache directory");
                return Err(e);
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_partial(&path) {
                continue;
            }

            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to stat cache entry");
                    continue;
                }
            };

            let modified = match meta.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(path = ?path, error = %e, "No modification time for cache entry");
                    continue;
                }
            };

            // A clock-skewed future mtime counts as fresh.
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= max_age {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = ?path, age_secs = age.as_secs(), "Removed expired cache entry");
                    removed += 1;
                }
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to remove expired cache entry");
                }
            }
        }

        debug!(count = removed, "Expiry sweep finished");
        Ok(removed)
    }

    /// Delete every entry in the cache directory.
    ///
    /// Fails only if the directory cannot be listed; per-file deletion
    /// errors are logged and skipped.
    pub async fn clear_all(&self) -> io::Result<()> {
        let mut entries = match fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                warn!(dir = ?self.cache_dir, error = %e, "Failed to read cache directory");
                return Err(e);
            }
        };

        let mut cleared = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if path.is_dir() {
                if let Err(e) = fs::remove_dir_all(&path).await {
                    warn!(path = ?path, error = %e, "Failed to remove cache subdirectory");
                } else {
                    cleared += 1;
                }
            } else if let Err(e) = fs::remove_file(&path).await {
                warn!(path = ?path, error = %e, "Failed to remove cache file");
            } else {
                cleared += 1;
            }
        }

        debug!(count = cleared, "Cleared cache entries");
        Ok(())
    }

    /// Count complete entries and their total size.
    pub async fn stats(&self) -> io::Result<CacheStats> {
        let mut entries = match fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheStats::default()),
            Err(e) => return Err(e),
        };

        let mut stats = CacheStats::default();

        while let Some(entry) = entries.next_entry().await? {
            if is_partial(&entry.path()) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if !meta.is_file() || meta.len() == 0 {
                continue;
            }
            stats.entries += 1;
            stats.total_bytes += meta.len();
        }

        Ok(stats)
    }
}

fn is_partial(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(PART_SUFFIX)
}
