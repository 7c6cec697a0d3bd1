//! Response cache keyed by normalized request URL.
//!
//! The fetcher reads and writes through the [`Cache`] trait; [`FsCache`] keeps
//! one directory per content store so re-runs of an extraction are cheap, and
//! [`MemoryCache`] backs tests. Entries never expire. [`CachePolicy::Refresh`]
//! skips reads and overwrites entries with fresh responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::error::CacheError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Serve cached responses when present.
    #[default]
    Reuse,
    /// Always fetch; store the fresh response.
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    fn put(&self, key: &str, body: &[u8]) -> Result<(), CacheError>;
}

/// Cache key for a request: the absolute URL without its fragment.
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

const MAX_STEM_CHARS: usize = 80;

/// Deterministic file stem for a key: a readable prefix plus a SHA-256 suffix.
pub fn cache_file_stem(key: &str) -> String {
    let readable: String = key
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_STEM_CHARS)
        .collect();
    let digest = Sha256::digest(key.as_bytes());
    let hash: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("{readable}-{hash}")
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    fetched_at: DateTime<Utc>,
}

/// Directory-backed cache. The directory is created on first write.
#[derive(Debug, Clone)]
pub struct FsCache {
    dir: PathBuf,
}

impl FsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn body_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", cache_file_stem(key)))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_file_stem(key)))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl Cache for FsCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let body_path = self.body_path(key);
        let meta_path = self.meta_path(key);
        if !body_path.exists() || !meta_path.exists() {
            return Ok(None);
        }
        let meta: EntryMeta =
            serde_json::from_slice(&fs::read(&meta_path).map_err(io_error(&meta_path))?)?;
        let body = fs::read(&body_path).map_err(io_error(&body_path))?;
        debug!(url = %meta.url, fetched_at = %meta.fetched_at, "Cache hit");
        Ok(Some(CacheEntry {
            body,
            fetched_at: meta.fetched_at,
        }))
    }

    fn put(&self, key: &str, body: &[u8]) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let body_path = self.body_path(key);
        fs::write(&body_path, body).map_err(io_error(&body_path))?;
        let meta = EntryMeta {
            url: key.to_string(),
            fetched_at: Utc::now(),
        };
        let meta_path = self.meta_path(key);
        fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?).map_err(io_error(&meta_path))?;
        debug!(url = %key, path = %body_path.display(), "Cached response");
        Ok(())
    }
}

/// In-memory cache for tests and cache-less runs.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, body: &[u8]) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            CacheEntry {
                body: body.to_vec(),
                fetched_at: Utc::now(),
            },
        );
        Ok(())
    }
}
