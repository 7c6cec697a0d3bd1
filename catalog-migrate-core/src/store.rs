//! Content stores, the store URL convention, and manifest files.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use crate::error::ManifestError;

/// Per-store output layout, relative to the store's output directory.
pub const CACHE_DIR: &str = "cache";
pub const IMAGES_DIR: &str = "images";
pub const HIERARCHY_FILE: &str = "hierarchy.json";
pub const FLAT_FILE: &str = "flat.csv";
pub const MERGED_FILE: &str = "merged.json";
pub const MERGED_FLAT_FILE: &str = "merged.csv";

/// Top-level catalogs are `Main`; catalogs nested below another store are `Sub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Main,
    Sub,
}

/// A named entry point into the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentStore {
    pub path: String,
    pub kind: StoreKind,
    name: String,
}

impl ContentStore {
    /// Sanitized, hyphenated short name used for directories and target paths.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_main(&self) -> bool {
        self.kind == StoreKind::Main
    }

    /// Isolated output directory for this store.
    pub fn output_dir(&self, base: &Path) -> PathBuf {
        base.join(&self.name)
    }

    /// Whether `other` lives below this store in the source tree.
    pub fn contains(&self, other: &ContentStore) -> bool {
        other.path.starts_with(&format!("{}/", self.path))
    }
}

/// Decides which links point at content stores and how store paths are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConvention {
    base_url: Url,
    stores_root: String,
}

impl StoreConvention {
    pub fn new(base_url: Url, stores_root: &str) -> Self {
        let trimmed = stores_root.trim().trim_end_matches('/');
        let stores_root = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Self {
            base_url,
            stores_root,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn stores_root(&self) -> &str {
        &self.stores_root
    }

    /// Resolves a (possibly relative) reference against the source base URL.
    pub fn resolve(&self, href: &str) -> Option<Url> {
        self.base_url.join(href.trim()).ok()
    }

    /// Strips query, fragment, a trailing `.html` and trailing slashes.
    pub fn normalize_path(&self, path: &str) -> String {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".html").unwrap_or(path);
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        }
    }

    /// Returns the normalized store path when `href` points at a content store
    /// on the source host.
    pub fn store_link(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }
        let url = self.resolve(href)?;
        if url.scheme() != self.base_url.scheme() || url.host_str() != self.base_url.host_str() {
            return None;
        }
        let path = self.normalize_path(url.path());
        if self.relative_segments(&path).is_some() {
            Some(path)
        } else {
            None
        }
    }

    /// Absolute URL of a store's rendered page.
    pub fn page_url(&self, store_path: &str) -> Option<Url> {
        let path = self.normalize_path(store_path);
        self.base_url.join(&format!("{path}.html")).ok()
    }

    pub fn store(&self, path: &str) -> ContentStore {
        let path = self.normalize_path(path);
        let (kind, raw_name) = match self.relative_segments(&path) {
            Some(segments) if segments.len() > 1 => (StoreKind::Sub, segments.join("-")),
            Some(segments) => (StoreKind::Main, segments.join("-")),
            None => (
                StoreKind::Main,
                path.rsplit('/').next().unwrap_or_default().to_string(),
            ),
        };
        let name = match slugify(&raw_name) {
            s if s.is_empty() => "store".to_string(),
            s => s,
        };
        ContentStore { path, kind, name }
    }

    fn relative_segments<'a>(&self, path: &'a str) -> Option<Vec<&'a str>> {
        let rest = path.strip_prefix(&self.stores_root)?.strip_prefix('/')?;
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            None
        } else {
            Some(segments)
        }
    }
}

/// Lowercases and collapses every run of non-alphanumeric characters into `-`.
pub fn slugify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Reads a newline-delimited manifest of store paths. Blank lines are ignored and
/// duplicates are dropped, keeping the first occurrence.
pub fn read_manifest(path: &Path) -> Result<Vec<String>, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ManifestError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ManifestError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let mut seen = HashSet::new();
    let paths: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && seen.insert(*l))
        .map(str::to_string)
        .collect();
    debug!(manifest = %path.display(), count = paths.len(), "Read store manifest");
    Ok(paths)
}

pub fn write_manifest(path: &Path, paths: &[String]) -> Result<(), ManifestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ManifestError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut content = paths.join("\n");
    content.push('\n');
    fs::write(path, content).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(manifest = %path.display(), count = paths.len(), "Wrote store manifest");
    Ok(())
}
