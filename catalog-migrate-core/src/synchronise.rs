//! Orchestration of the migration phases over a batch of content stores.
//!
//! Every phase works store by store on isolated output directories
//! (`<output_dir>/<store-name>/`), so one store's failure never touches the
//! next. Only errors that invalidate the whole run (rejected credentials) stop
//! a batch early; they are reported through [`MigrationReport::fatal_error`].
//!
//! # Phases
//! - [`extract_stores`]: fetch each store, write `hierarchy.json` and `flat.csv`.
//! - [`discover`]: fetch store pages only and write a manifest of linked stores.
//! - [`merge_outputs`]: merge each top-level store with the stores below it,
//!   write `merged.json` and `merged.csv`.
//! - [`upload_stores`]: synthesize documents, collect images, and run the
//!   upload pipeline.

use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::contract::{Downloader, TargetStore};
use crate::download::FetchReport;
use crate::error::{DownloadError, HierarchyError};
use crate::flatten::{flatten, write_csv};
use crate::hierarchy::{read_hierarchy, write_hierarchy, Hierarchy};
use crate::merge::merge_stores;
use crate::store::{
    write_manifest, ContentStore, FLAT_FILE, HIERARCHY_FILE, IMAGES_DIR, MERGED_FILE,
    MERGED_FLAT_FILE,
};
use crate::synthesize::{synthesize, TargetLayout};
use crate::upload::{upload, TaskKind, UploadOptions, UploadSummary, UploadTask};

/// Item counts for one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PhaseReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// What happened to one store during extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreReport {
    pub store: String,
    pub fetch: Option<FetchReport>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    pub extract: PhaseReport,
    pub merge: PhaseReport,
    pub flatten: PhaseReport,
    /// Per store: whether its documents and images could be prepared.
    pub synthesize: PhaseReport,
    /// Per upload task.
    pub upload: PhaseReport,
    pub preview: PhaseReport,
    pub publish: PhaseReport,
    pub stores: Vec<StoreReport>,
    pub fatal_error: Option<String>,
}

impl MigrationReport {
    pub fn is_fatal(&self) -> bool {
        self.fatal_error.is_some()
    }

    fn absorb_upload(&mut self, summary: &UploadSummary) {
        self.upload.succeeded += summary.succeeded;
        self.upload.skipped += summary.skipped;
        self.upload.failed += summary.failed;
        self.preview.succeeded += summary.previewed;
        self.preview.failed += summary.preview_failed;
        self.publish.succeeded += summary.published;
        self.publish.failed += summary.publish_failed;
        if self.fatal_error.is_none() {
            self.fatal_error = summary.fatal_error.clone();
        }
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<10} {:>10} {:>10} {:>10}", "phase", "succeeded", "skipped", "failed")?;
        let phases = [
            ("extract", &self.extract),
            ("merge", &self.merge),
            ("flatten", &self.flatten),
            ("synthesize", &self.synthesize),
            ("upload", &self.upload),
            ("preview", &self.preview),
            ("publish", &self.publish),
        ];
        for (name, phase) in phases {
            writeln!(
                f,
                "{:<10} {:>10} {:>10} {:>10}",
                name, phase.succeeded, phase.skipped, phase.failed
            )?;
        }
        for store in self.stores.iter().filter(|s| s.error.is_some()) {
            writeln!(
                f,
                "failed store {}: {}",
                store.store,
                store.error.as_deref().unwrap_or_default()
            )?;
        }
        if let Some(fatal) = &self.fatal_error {
            writeln!(f, "aborted: {fatal}")?;
        }
        Ok(())
    }
}

/// Fetches every store into its own output directory and writes the hierarchy
/// and flat files. Stops early only on a fatal error.
pub async fn extract_stores<D>(downloader: &D, stores: &[ContentStore], output_dir: &Path) -> MigrationReport
where
    D: Downloader + ?Sized,
{
    let mut report = MigrationReport::default();
    info!(stores = stores.len(), "[EXTRACT] Starting extraction");

    for store in stores {
        let dir = store.output_dir(output_dir);
        let fetched = match downloader
            .fetch_tree(store, &dir)
            .instrument(info_span!("store", path = %store.path))
            .await
        {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(store = %store.path, error = %e, "[EXTRACT][ERROR] Store fetch failed");
                report.extract.failed += 1;
                report.stores.push(StoreReport {
                    store: store.path.clone(),
                    fetch: None,
                    error: Some(e.to_string()),
                });
                if e.is_fatal() {
                    report.fatal_error = Some(e.to_string());
                    break;
                }
                continue;
            }
        };

        let hierarchy_path = dir.join(HIERARCHY_FILE);
        if let Err(e) = write_hierarchy(&hierarchy_path, &fetched.hierarchy) {
            error!(store = %store.path, error = %e, "[EXTRACT][ERROR] Failed to write hierarchy");
            report.extract.failed += 1;
            report.stores.push(StoreReport {
                store: store.path.clone(),
                fetch: Some(fetched.report),
                error: Some(e.to_string()),
            });
            continue;
        }
        report.extract.succeeded += 1;
        info!(store = %store.path, path = %hierarchy_path.display(), "[EXTRACT] Wrote hierarchy");

        let rows = flatten(&fetched.hierarchy);
        match write_csv(&dir.join(FLAT_FILE), &rows) {
            Ok(()) => report.flatten.succeeded += 1,
            Err(e) => {
                warn!(store = %store.path, error = %e, "[EXTRACT] Failed to write flat file");
                report.flatten.failed += 1;
            }
        }
        report.stores.push(StoreReport {
            store: store.path.clone(),
            fetch: Some(fetched.report),
            error: None,
        });
    }
    report
}

/// Collects each store plus every store its page links to, and writes the
/// union to `manifest_path` in discovery order.
pub async fn discover<D>(
    downloader: &D,
    stores: &[ContentStore],
    output_dir: &Path,
    manifest_path: &Path,
) -> Result<Vec<String>, DownloadError>
where
    D: Downloader + ?Sized,
{
    let mut discovered: Vec<String> = Vec::new();
    for store in stores {
        match downloader
            .discover_stores(store, &store.output_dir(output_dir))
            .await
        {
            Ok(paths) => {
                for path in paths {
                    if !discovered.contains(&path) {
                        discovered.push(path);
                    }
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(store = %store.path, error = %e, "[DISCOVER] Skipping store"),
        }
    }
    write_manifest(manifest_path, &discovered)?;
    Ok(discovered)
}

/// Merges every store that is not below another listed store with the listed
/// stores below it (listed order), writing `merged.json` and `merged.csv` into
/// the top store's directory. Images of the merged stores are copied along.
pub fn merge_outputs(stores: &[ContentStore], output_dir: &Path) -> MigrationReport {
    let mut report = MigrationReport::default();
    let tops = stores
        .iter()
        .filter(|s| !stores.iter().any(|other| other.contains(s)));

    for top in tops {
        let dir = top.output_dir(output_dir);
        let main = match read_hierarchy(&dir.join(HIERARCHY_FILE)) {
            Ok(h) => h,
            Err(e) => {
                error!(store = %top.path, error = %e, "[MERGE][ERROR] Missing store hierarchy");
                report.merge.failed += 1;
                continue;
            }
        };

        let mut subs: Vec<Hierarchy> = Vec::new();
        for sub in stores.iter().filter(|s| top.contains(s)) {
            let sub_dir = sub.output_dir(output_dir);
            match read_hierarchy(&sub_dir.join(HIERARCHY_FILE)) {
                Ok(h) => {
                    copy_images(&sub_dir.join(IMAGES_DIR), &dir.join(IMAGES_DIR));
                    subs.push(h);
                }
                Err(e) => {
                    warn!(store = %sub.path, error = %e, "[MERGE] Skipping sub store");
                    report.merge.skipped += 1;
                }
            }
        }

        let merged_count = subs.len() + 1;
        let merged = merge_stores(main, subs);
        if let Err(e) = write_hierarchy(&dir.join(MERGED_FILE), &merged) {
            error!(store = %top.path, error = %e, "[MERGE][ERROR] Failed to write merged hierarchy");
            report.merge.failed += 1;
            continue;
        }
        report.merge.succeeded += 1;
        info!(store = %top.path, trees = merged_count, nodes = merged.count_nodes(), "[MERGE] Merged store");

        match write_csv(&dir.join(MERGED_FLAT_FILE), &flatten(&merged)) {
            Ok(()) => report.flatten.succeeded += 1,
            Err(e) => {
                warn!(store = %top.path, error = %e, "[MERGE] Failed to write merged flat file");
                report.flatten.failed += 1;
            }
        }
    }
    report
}

fn copy_images(from: &Path, to: &Path) {
    let Ok(entries) = fs::read_dir(from) else {
        return;
    };
    if let Err(e) = fs::create_dir_all(to) {
        warn!(path = %to.display(), error = %e, "Cannot create image directory");
        return;
    }
    for entry in entries.flatten() {
        let target = to.join(entry.file_name());
        if target.exists() {
            continue;
        }
        if let Err(e) = fs::copy(entry.path(), &target) {
            warn!(path = %target.display(), error = %e, "Failed to copy image");
        }
    }
}

/// Upload tasks for one store: its images, then the sheet, then the page.
/// Uses `merged.json` when the store was merged, `hierarchy.json` otherwise.
pub fn store_upload_tasks(
    store: &ContentStore,
    output_dir: &Path,
    layout: &TargetLayout,
) -> Result<Vec<UploadTask>, HierarchyError> {
    let dir = store.output_dir(output_dir);
    let merged_path = dir.join(MERGED_FILE);
    let source = if merged_path.exists() {
        merged_path
    } else {
        dir.join(HIERARCHY_FILE)
    };
    let hierarchy = read_hierarchy(&source)?;

    let mut tasks = Vec::new();
    let images_dir = dir.join(IMAGES_DIR);
    if let Ok(entries) = fs::read_dir(&images_dir) {
        let mut files: Vec<_> = entries.flatten().map(|e| e.path()).filter(|p| p.is_file()).collect();
        files.sort();
        for file in files {
            let name = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let content = fs::read(&file).map_err(|source| HierarchyError::Io {
                path: file.clone(),
                source,
            })?;
            tasks.push(UploadTask::new(layout.image_path(store, &name), TaskKind::Image, content));
        }
    }

    let documents = synthesize(&flatten(&hierarchy), store, layout);
    let sheet = documents.sheet.to_bytes().map_err(|source| HierarchyError::Json {
        path: PathBuf::from(&documents.sheet_path),
        source,
    })?;
    tasks.push(UploadTask::new(documents.sheet_path, TaskKind::JsonSheet, sheet));
    tasks.push(UploadTask::new(
        documents.page.path,
        TaskKind::HtmlPage,
        documents.page.html.into_bytes(),
    ));
    debug!(store = %store.path, tasks = tasks.len(), "Collected upload tasks");
    Ok(tasks)
}

/// Collects tasks for every store and runs the upload pipeline once over all of them.
pub async fn upload_stores<T>(
    target: Arc<T>,
    stores: &[ContentStore],
    output_dir: &Path,
    layout: &TargetLayout,
    options: &UploadOptions,
) -> MigrationReport
where
    T: TargetStore + ?Sized + 'static,
{
    let mut report = MigrationReport::default();
    let mut tasks = Vec::new();
    for store in stores {
        match store_upload_tasks(store, output_dir, layout) {
            Ok(store_tasks) => {
                report.synthesize.succeeded += 1;
                tasks.extend(store_tasks);
            }
            Err(e) => {
                error!(store = %store.path, error = %e, "[UPLOAD][ERROR] Cannot prepare store documents");
                report.synthesize.failed += 1;
                report.stores.push(StoreReport {
                    store: store.path.clone(),
                    fetch: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }
    let summary = upload(target, tasks, options).await;
    report.absorb_upload(&summary);
    report
}
