//! Trait seams between the pipeline and the outside world.
//!
//! - [`SourceClient`]: read access to the source content repository.
//! - [`TargetStore`]: write access to the target document store.
//! - [`Downloader`]: fetches whole content stores into hierarchies.
//!
//! Concrete HTTP clients live in the CLI crate. With the `test-export-mocks`
//! feature (on by default) `mockall` generates `MockSourceClient`,
//! `MockTargetStore` and `MockDownloader` for tests in any crate.

use async_trait::async_trait;
use std::path::Path;
use url::Url;

#[allow(unused_imports)]
use mockall::{automock, predicate::*};

use crate::download::FetchedTree;
use crate::error::{DownloadError, SourceError, TargetError};
use crate::store::ContentStore;

/// Read access to the source repository. Credentials are the implementor's concern
/// and are attached to every request.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetches the raw body at an absolute source URL (store markup or image bytes).
    async fn get(&self, url: &Url) -> Result<Vec<u8>, SourceError>;
}

/// Write access to the target document store. Paths are relative to the
/// organisation/repository prefix the implementor was configured with.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, TargetError>;

    async fn put(&self, path: &str, content: &[u8], content_type: &str)
        -> Result<(), TargetError>;

    /// Releases the document to the staging endpoint.
    async fn preview(&self, path: &str) -> Result<(), TargetError>;

    /// Releases the document to the live endpoint.
    async fn publish(&self, path: &str) -> Result<(), TargetError>;
}

/// Fetches content stores. Allows plugging in real, test, or mock downloaders.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetches the store's tree, writing its cache and images below `store_dir`.
    async fn fetch_tree(
        &self,
        store: &ContentStore,
        store_dir: &Path,
    ) -> Result<FetchedTree, DownloadError>;

    /// Fetches only the store's own page and returns the store plus every
    /// content-store path it links to, in discovery order.
    async fn discover_stores(
        &self,
        store: &ContentStore,
        store_dir: &Path,
    ) -> Result<Vec<String>, DownloadError>;
}
