//! Error types shared by the pipeline stages.
//!
//! Errors fall into three groups:
//! - fatal: rejected credentials ([`SourceError::Unauthorized`], [`TargetError::Unauthorized`])
//!   and missing manifests. These abort a run.
//! - transient: transport failures and 5xx/429 responses. These are retried by
//!   [`crate::retry::RetryPolicy`] before being treated as per-item failures.
//! - per-item: everything else. Logged, counted and skipped.

use std::path::PathBuf;
use thiserror::Error;

use crate::hierarchy::NodeKind;

/// Errors returned by the source repository read API.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Credentials were rejected. Never retried.
    #[error("source rejected credentials for {url} (status {status})")]
    Unauthorized { url: String, status: u16 },

    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("source returned status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl SourceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Unauthorized { .. })
    }

    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Transport { .. } => true,
            SourceError::Status { status, .. } => is_transient_status(*status),
            _ => false,
        }
    }
}

/// Errors returned by the target document store write API.
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("target rejected credentials for {path} (status {status})")]
    Unauthorized { path: String, status: u16 },

    #[error("target returned status {status} for {path}: {message}")]
    Status {
        path: String,
        status: u16,
        message: String,
    },

    #[error("transport error for {path}: {message}")]
    Transport { path: String, message: String },
}

impl TargetError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TargetError::Unauthorized { .. })
    }

    pub fn is_transient(&self) -> bool {
        match self {
            TargetError::Transport { .. } => true,
            TargetError::Status { status, .. } => is_transient_status(*status),
            TargetError::Unauthorized { .. } => false,
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Errors from the on-disk response cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// A parsed component did not carry a field its kind requires.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MarkupError {
    #[error("{kind} component is missing required field `{field}`")]
    MissingField { kind: NodeKind, field: &'static str },
}

/// Errors reading or writing hierarchy and flat files.
#[derive(Error, Debug)]
pub enum HierarchyError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid hierarchy json at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors reading or writing a store manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("manifest file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("manifest io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from fetching a content store tree.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store page {url} is not valid utf-8")]
    Encoding { url: String },
}

impl DownloadError {
    /// Whether this error must abort the whole batch rather than just one store.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DownloadError::Source(e) if e.is_fatal())
    }
}
