// pydeps-common/src/cache.rs
// URL-keyed local store for index pages and artifact bytes.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::error::{PydepsError, Result};
use crate::Config;

const PAGES_BUCKET: &str = "index";
const ARTIFACTS_BUCKET: &str = "artifacts";

/// Whether an existing cache entry may answer a request without a network round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Skip the network entirely when a valid entry exists.
    UseCache,
    /// Always re-fetch and overwrite the entry.
    #[default]
    Refresh,
}

impl CacheMode {
    pub fn from_flag(use_cached_index: bool) -> Self {
        if use_cached_index {
            Self::UseCache
        } else {
            Self::Refresh
        }
    }
}

/// A fetched index page as persisted on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPage {
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub body: String,
}

/// Cache struct to manage cache operations
#[derive(Debug, Clone)]
pub struct Cache {
    cache_dir: PathBuf,
}

impl Cache {
    /// Create a new Cache using the config's cache_dir
    pub fn new(config: &Config) -> Result<Self> {
        Self::at(config.cache_dir())
    }

    pub fn at(cache_dir: &Path) -> Result<Self> {
        for bucket in [PAGES_BUCKET, ARTIFACTS_BUCKET] {
            let dir = cache_dir.join(bucket);
            if !dir.exists() {
                fs::create_dir_all(&dir).map_err(|e| {
                    PydepsError::Cache(format!(
                        "Failed to create cache directory {}: {e}",
                        dir.display()
                    ))
                })?;
            }
        }
        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    /// Gets the cache directory path
    pub fn get_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Stable file name for a URL.
    pub fn key_for_url(url: &str) -> String {
        hex::encode(Sha256::digest(url.as_bytes()))
    }

    fn entry_path(&self, bucket: &str, url: &str) -> PathBuf {
        self.cache_dir.join(bucket).join(Self::key_for_url(url))
    }

    pub fn store_page(&self, page: &CachedPage) -> Result<()> {
        let path = self.entry_path(PAGES_BUCKET, &page.url);
        debug!("Saving index page {} to cache file: {:?}", page.url, path);
        let data = serde_json::to_vec(page)?;
        atomic_write(&path, &data)
    }

    /// Missing and corrupt entries both read as `None`; the caller re-fetches.
    pub fn load_page(&self, url: &str) -> Option<CachedPage> {
        let path = self.entry_path(PAGES_BUCKET, url);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("No cache entry for {url}");
                return None;
            }
        };
        match serde_json::from_slice::<CachedPage>(&raw) {
            Ok(page) if page.url == url => Some(page),
            Ok(page) => {
                warn!(
                    "Cache entry {} belongs to {}, not {url}; ignoring it",
                    path.display(),
                    page.url
                );
                None
            }
            Err(e) => {
                warn!("Ignoring corrupt cache entry {}: {e}", path.display());
                None
            }
        }
    }

    pub fn store_bytes(&self, url: &str, data: &[u8]) -> Result<()> {
        let path = self.entry_path(ARTIFACTS_BUCKET, url);
        debug!("Saving {} bytes for {url} to {:?}", data.len(), path);
        atomic_write(&path, data)
    }

    pub fn load_bytes(&self, url: &str) -> Option<Vec<u8>> {
        fs::read(self.entry_path(ARTIFACTS_BUCKET, url)).ok()
    }

    /// Clears a specific cache entry
    pub fn clear_url(&self, url: &str) -> Result<()> {
        for bucket in [PAGES_BUCKET, ARTIFACTS_BUCKET] {
            let path = self.entry_path(bucket, url);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Clears all cache files
    pub fn clear_all(&self) -> Result<()> {
        for bucket in [PAGES_BUCKET, ARTIFACTS_BUCKET] {
            let dir = self.cache_dir.join(bucket);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Writes through a temp file in the same directory, then renames it over the
/// target, so readers never observe a partial entry.
fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        PydepsError::Cache(format!("Cannot get parent directory for {}", path.display()))
    })?;
    fs::create_dir_all(dir)?;

    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| {
        PydepsError::Cache(format!(
            "Failed to persist cache entry {}: {}",
            path.display(),
            e.error
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str) -> CachedPage {
        CachedPage {
            url: url.to_string(),
            content_type: Some("text/html".to_string()),
            body: "<a href=\"pkg_a-1.0.tar.gz#sha256=ab\">pkg_a-1.0.tar.gz</a>".to_string(),
        }
    }

    #[test]
    fn page_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::at(dir.path()).unwrap();
        let stored = page("https://pypi.org/simple/pkg-a/");
        cache.store_page(&stored).unwrap();
        assert_eq!(cache.load_page(&stored.url), Some(stored));
    }

    #[test]
    fn corrupt_entry_reads_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::at(dir.path()).unwrap();
        let url = "https://pypi.org/simple/pkg-a/";
        let path = dir
            .path()
            .join(PAGES_BUCKET)
            .join(Cache::key_for_url(url));
        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(cache.load_page(url), None);

        // A valid rewrite replaces the corrupt entry.
        cache.store_page(&page(url)).unwrap();
        assert!(cache.load_page(url).is_some());
    }

    #[test]
    fn bytes_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::at(dir.path()).unwrap();
        let url = "https://files.example/pkg_a-1.0-py3-none-any.whl";
        cache.store_bytes(url, b"wheel").unwrap();
        assert_eq!(cache.load_bytes(url).as_deref(), Some(&b"wheel"[..]));
        cache.clear_url(url).unwrap();
        assert_eq!(cache.load_bytes(url), None);

        cache.store_page(&page("https://x.example/simple/a/")).unwrap();
        cache.clear_all().unwrap();
        assert_eq!(cache.load_page("https://x.example/simple/a/"), None);
    }

    #[test]
    fn cache_mode_from_flag() {
        assert_eq!(CacheMode::from_flag(true), CacheMode::UseCache);
        assert_eq!(CacheMode::from_flag(false), CacheMode::Refresh);
    }
}
