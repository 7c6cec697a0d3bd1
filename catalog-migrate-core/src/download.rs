//! Tree Fetcher: fetches a content store, follows links to nested stores and
//! assembles one hierarchy.
//!
//! Fetching runs as an explicit worklist (frontier queue plus visited set keyed
//! by normalized store path), so the depth of the remote store graph is not
//! bounded by the call stack. Once the frontier drains, the tree is assembled
//! from the parsed pages and each store reference gets the referenced store's
//! nodes as children. A store that is already an ancestor is never attached
//! again, which keeps cyclic links from recursing.

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{cache_key, Cache, CachePolicy, FsCache, MemoryCache};
use crate::contract::{Downloader, SourceClient};
use crate::error::{DownloadError, SourceError};
use crate::hierarchy::{Hierarchy, HierarchyNode, NodeKind};
use crate::markup::{parse_page, ParsedNode, ParsedPage};
use crate::merge::merge_items;
use crate::retry::RetryPolicy;
use crate::store::{slugify, ContentStore, StoreConvention, CACHE_DIR, IMAGES_DIR};

const MAX_IMAGE_PREFIX_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Follow links to nested content stores.
    pub recursive: bool,
    pub cache_policy: CachePolicy,
    /// Keep responses in `<store_dir>/cache` between runs.
    pub persist_cache: bool,
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            cache_policy: CachePolicy::Reuse,
            persist_cache: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// Counters for one store fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub stores_fetched: usize,
    pub stores_failed: usize,
    /// Nodes in the assembled tree, root excluded.
    pub nodes: usize,
    pub skipped_nodes: usize,
    pub images_saved: usize,
    pub images_failed: usize,
    pub cache_hits: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedTree {
    pub hierarchy: Hierarchy,
    pub report: FetchReport,
}

/// One fetch session over an injected cache.
pub struct StoreFetcher<'a, S: ?Sized, C: ?Sized> {
    client: &'a S,
    cache: &'a C,
    convention: &'a StoreConvention,
    options: &'a FetchOptions,
    image_dir: Option<PathBuf>,
}

impl<'a, S, C> StoreFetcher<'a, S, C>
where
    S: SourceClient + ?Sized,
    C: Cache + ?Sized,
{
    pub fn new(
        client: &'a S,
        cache: &'a C,
        convention: &'a StoreConvention,
        options: &'a FetchOptions,
    ) -> Self {
        Self {
            client,
            cache,
            convention,
            options,
            image_dir: None,
        }
    }

    /// Downloads referenced images into `dir`. Without it image URLs are left untouched.
    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = Some(dir.into());
        self
    }

    pub async fn fetch_tree(&self, store: &ContentStore) -> Result<FetchedTree, DownloadError> {
        let mut report = FetchReport::default();
        let mut pages: HashMap<String, ParsedPage> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<String> = VecDeque::new();
        visited.insert(store.path.clone());
        frontier.push_back(store.path.clone());

        while let Some(path) = frontier.pop_front() {
            let page = match self.fetch_page(&path, &mut report).await {
                Ok(page) => page,
                Err(e) if path == store.path || e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(store = %path, error = %e, "Skipping nested store");
                    report.stores_failed += 1;
                    continue;
                }
            };
            report.stores_fetched += 1;
            report.skipped_nodes += page.skipped;
            if self.options.recursive {
                for child in page.store_refs() {
                    if visited.insert(child.clone()) {
                        debug!(parent = %path, store = %child, "Queued nested store");
                        frontier.push_back(child);
                    }
                }
            }
            pages.insert(path, page);
        }

        let Some(root_page) = pages.get(&store.path) else {
            return Ok(FetchedTree {
                hierarchy: Hierarchy::default(),
                report,
            });
        };
        let mut chain = vec![store.path.clone()];
        let items = assemble(&root_page.nodes, &pages, &mut chain);
        let mut hierarchy = Hierarchy::new(wrap_in_trail(store, root_page, items));

        if let Some(dir) = &self.image_dir {
            self.save_images(&mut hierarchy, dir, &mut report).await?;
        }
        report.nodes = hierarchy.count_nodes() - 1;

        info!(
            store = %store.path,
            stores = report.stores_fetched,
            failed_stores = report.stores_failed,
            nodes = report.nodes,
            skipped = report.skipped_nodes,
            images = report.images_saved,
            "Fetched store tree"
        );
        Ok(FetchedTree { hierarchy, report })
    }

    /// Fetches only the store's own page. Returns the store followed by every
    /// content store it links to, in document order and without duplicates.
    pub async fn discover(&self, store: &ContentStore) -> Result<Vec<String>, DownloadError> {
        let mut report = FetchReport::default();
        let page = self.fetch_page(&store.path, &mut report).await?;
        let mut stores = vec![store.path.clone()];
        for path in page.store_refs() {
            if !stores.contains(&path) {
                stores.push(path);
            }
        }
        info!(store = %store.path, discovered = stores.len() - 1, "Discovered linked stores");
        Ok(stores)
    }

    async fn fetch_page(
        &self,
        store_path: &str,
        report: &mut FetchReport,
    ) -> Result<ParsedPage, DownloadError> {
        let url = self
            .convention
            .page_url(store_path)
            .ok_or_else(|| SourceError::InvalidUrl {
                url: store_path.to_string(),
                message: "cannot build page url".to_string(),
            })?;
        let body = self.fetch_bytes(&url, report).await?;
        let html = String::from_utf8(body).map_err(|_| DownloadError::Encoding {
            url: url.to_string(),
        })?;
        Ok(parse_page(&html, self.convention))
    }

    /// Serves from the cache or fetches with retry. Cache failures only cost a refetch.
    async fn fetch_bytes(&self, url: &Url, report: &mut FetchReport) -> Result<Vec<u8>, SourceError> {
        let key = cache_key(url);
        if self.options.cache_policy == CachePolicy::Reuse {
            match self.cache.get(&key) {
                Ok(Some(entry)) => {
                    report.cache_hits += 1;
                    return Ok(entry.body);
                }
                Ok(None) => {}
                Err(e) => warn!(url = %key, error = %e, "Ignoring unreadable cache entry"),
            }
        }
        let client = self.client;
        let body = self
            .options
            .retry
            .run(url.as_str(), || client.get(url))
            .await?;
        if let Err(e) = self.cache.put(&key, &body) {
            warn!(url = %key, error = %e, "Failed to cache response");
        }
        Ok(body)
    }

    async fn save_images(
        &self,
        hierarchy: &mut Hierarchy,
        dir: &Path,
        report: &mut FetchReport,
    ) -> Result<(), DownloadError> {
        let jobs: Vec<(String, String)> = hierarchy
            .nodes()
            .into_iter()
            .filter_map(|n| n.image_url.as_ref().map(|img| (n.path.clone(), img.clone())))
            .filter(|(_, img)| !img.starts_with(&format!("{IMAGES_DIR}/")))
            .collect();
        if jobs.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(dir).map_err(|source| DownloadError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut saved: HashMap<String, String> = HashMap::new();
        for (node_path, image_url) in jobs {
            let Some(url) = self.convention.resolve(&image_url) else {
                warn!(node = %node_path, image = %image_url, "Unresolvable image url");
                report.images_failed += 1;
                continue;
            };
            let file_name = image_file_name(&node_path, &url);
            let body = match self.fetch_bytes(&url, report).await {
                Ok(body) => body,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(node = %node_path, image = %url, error = %e, "Failed to download image");
                    report.images_failed += 1;
                    continue;
                }
            };
            let target = dir.join(&file_name);
            if let Err(e) = fs::write(&target, &body) {
                warn!(path = %target.display(), error = %e, "Failed to write image");
                report.images_failed += 1;
                continue;
            }
            debug!(node = %node_path, path = %target.display(), "Saved image");
            report.images_saved += 1;
            saved.insert(node_path, format!("{IMAGES_DIR}/{file_name}"));
        }

        fn rewrite(nodes: &mut [HierarchyNode], saved: &HashMap<String, String>) {
            for node in nodes {
                if let Some(local) = saved.get(&node.path) {
                    node.image_url = Some(local.clone());
                }
                rewrite(&mut node.items, saved);
            }
        }
        rewrite(&mut hierarchy.items, &saved);
        Ok(())
    }
}

/// Converts parsed nodes, attaching the nodes of every referenced store that
/// was fetched and is not already an ancestor.
fn assemble(
    nodes: &[ParsedNode],
    pages: &HashMap<String, ParsedPage>,
    chain: &mut Vec<String>,
) -> Vec<HierarchyNode> {
    let mut out = Vec::with_capacity(nodes.len());
    for parsed in nodes {
        let mut node = parsed.node.clone();
        node.items = assemble(&parsed.children, pages, chain);
        for target in &parsed.store_refs {
            if chain.contains(target) {
                debug!(store = %target, "Not attaching ancestor store");
            } else if let Some(page) = pages.get(target) {
                chain.push(target.clone());
                let attached = assemble(&page.nodes, pages, chain);
                chain.pop();
                merge_items(&mut node.items, attached);
            }
        }
        out.push(node);
    }
    out
}

/// Nests `items` below one `store` node per breadcrumb entry, so trees fetched
/// from different stores share their ancestor titles.
fn wrap_in_trail(store: &ContentStore, page: &ParsedPage, items: Vec<HierarchyNode>) -> Vec<HierarchyNode> {
    let mut trail = page.breadcrumb.clone();
    if trail.is_empty() {
        trail.push(page.title.clone().unwrap_or_else(|| store.name().to_string()));
    }
    let last = trail.len() - 1;
    let mut items = items;
    for (index, title) in trail.into_iter().enumerate().rev() {
        let mut node = HierarchyNode::new(NodeKind::Store, title).with_items(items);
        if index == last {
            node.link_url = Some(store.path.clone());
        }
        items = vec![node];
    }
    items
}

/// `<node-slug>-<hash>--<file>`. The slug is truncated and lossy, so the hash of
/// the full node path keeps images of different nodes apart.
fn image_file_name(node_path: &str, url: &Url) -> String {
    let prefix: String = slugify(node_path).chars().take(MAX_IMAGE_PREFIX_CHARS).collect();
    let digest = Sha256::digest(node_path.as_bytes());
    let hash: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
    let original = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let sanitized: String = original
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let file = if sanitized.trim_matches(&['.', '_'][..]).is_empty() {
        "image".to_string()
    } else {
        sanitized
    };
    format!("{prefix}-{hash}--{file}")
}

/// Fetches stores over a [`SourceClient`], caching under each store's output directory.
pub struct DefaultDownloader<S> {
    client: S,
    convention: StoreConvention,
    options: FetchOptions,
}

impl<S: SourceClient> DefaultDownloader<S> {
    pub fn new(client: S, convention: StoreConvention, options: FetchOptions) -> Self {
        Self {
            client,
            convention,
            options,
        }
    }

    pub fn convention(&self) -> &StoreConvention {
        &self.convention
    }
}

#[async_trait]
impl<S: SourceClient> Downloader for DefaultDownloader<S> {
    async fn fetch_tree(
        &self,
        store: &ContentStore,
        store_dir: &Path,
    ) -> Result<FetchedTree, DownloadError> {
        let fs_cache;
        let memory_cache;
        let cache: &dyn Cache = if self.options.persist_cache {
            fs_cache = FsCache::new(store_dir.join(CACHE_DIR));
            &fs_cache
        } else {
            memory_cache = MemoryCache::new();
            &memory_cache
        };
        StoreFetcher::new(&self.client, cache, &self.convention, &self.options)
            .with_image_dir(store_dir.join(IMAGES_DIR))
            .fetch_tree(store)
            .await
    }

    async fn discover_stores(
        &self,
        store: &ContentStore,
        store_dir: &Path,
    ) -> Result<Vec<String>, DownloadError> {
        let fs_cache;
        let memory_cache;
        let cache: &dyn Cache = if self.options.persist_cache {
            fs_cache = FsCache::new(store_dir.join(CACHE_DIR));
            &fs_cache
        } else {
            memory_cache = MemoryCache::new();
            &memory_cache
        };
        StoreFetcher::new(&self.client, cache, &self.convention, &self.options)
            .discover(store)
            .await
    }
}
