//! # catalog-migrate CLI Interface
//!
//! Command parsing and orchestration for the `catalog-migrate` binary. All
//! pipeline logic lives in `catalog-migrate-core`; this module loads config and
//! credentials, builds the HTTP clients, calls the core phases and prints the
//! final [`MigrationReport`].
//!
//! Subcommands:
//! - `extract`: fetch stores into `<path>/<store>/hierarchy.json` + `flat.csv`,
//!   or with `--fetch-store-links` only write a manifest of linked stores.
//! - `merge`: merge each main store with its sub-stores.
//! - `upload`: synthesize documents and push them to the target store.
//!
//! Per-item failures are reported in the summary and still exit 0; fatal
//! errors (credentials, missing manifest, malformed config) return `Err`.
//!
//! For programmatic use and integration tests call [`run`] with a constructed [`Cli`].

use anyhow::{anyhow, bail, Context, Result};
use catalog_migrate_core::cache::CachePolicy;
use catalog_migrate_core::download::{DefaultDownloader, FetchOptions};
use catalog_migrate_core::store::{read_manifest, ContentStore, StoreConvention};
use catalog_migrate_core::synchronise::{
    discover, extract_stores, merge_outputs, upload_stores, MigrationReport,
};
use catalog_migrate_core::upload::UploadOptions;
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info_span, Instrument};

use crate::load_config::{
    load_config, source_credential_from_env, target_token_from_env, CliConfig,
};
use crate::source::HttpSourceClient;
use crate::upload::DocumentStoreClient;

/// Manifest written by `extract --fetch-store-links` when `--manifest-out` is absent.
pub const DEFAULT_MANIFEST: &str = "stores.txt";

/// CLI for catalog-migrate: move a content-store catalog into a document store.
#[derive(Parser, Debug)]
#[command(
    name = "catalog-migrate",
    version,
    about = "Extract, merge and upload content-store catalogs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn debug(&self) -> bool {
        match &self.command {
            Commands::Extract { common, .. }
            | Commands::Merge { common, .. }
            | Commands::Upload { common, .. } => common.debug,
        }
    }
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to the YAML config file
    #[arg(long)]
    pub config: PathBuf,
    /// Output directory; overrides `output_dir` from the config
    #[arg(long)]
    pub path: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG is set
    #[arg(long)]
    pub debug: bool,
}

impl CommonArgs {
    fn output_dir(&self, config: &CliConfig) -> PathBuf {
        self.path.clone().unwrap_or_else(|| config.output_dir.clone())
    }
}

/// Which stores a run covers: one store path or a manifest of them.
#[derive(Args, Debug, Clone, Default)]
#[group(required = true, multiple = false)]
pub struct StoreSelection {
    /// A single content-store path
    #[arg(long)]
    pub store: Option<String>,
    /// Manifest file with one store path per line
    #[arg(long)]
    pub input: Option<PathBuf>,
}

impl StoreSelection {
    fn stores(&self, convention: &StoreConvention) -> Result<Vec<ContentStore>> {
        match (&self.store, &self.input) {
            (Some(store), _) => Ok(vec![convention.store(store)]),
            (None, Some(input)) => manifest_stores(input, convention),
            (None, None) => bail!("either --store or --input is required"),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch stores and write their hierarchy and flat files
    Extract {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        selection: StoreSelection,
        /// Follow links to nested content stores
        #[arg(long)]
        recursive: bool,
        /// Only collect linked store paths into a manifest
        #[arg(long)]
        fetch_store_links: bool,
        /// Ignore cached responses and fetch again
        #[arg(long)]
        refresh: bool,
        /// Keep the response cache in memory only
        #[arg(long)]
        no_cache: bool,
        /// Manifest written by --fetch-store-links
        #[arg(long)]
        manifest_out: Option<PathBuf>,
    },
    /// Merge each main store with the sub-stores listed below it
    Merge {
        #[command(flatten)]
        common: CommonArgs,
        /// Manifest file with one store path per line
        #[arg(long)]
        input: PathBuf,
    },
    /// Upload synthesized documents and images to the target store
    Upload {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        selection: StoreSelection,
        /// Preview documents after upload
        #[arg(long)]
        preview: bool,
        /// Publish documents after preview
        #[arg(long)]
        publish: bool,
        /// Upload even when the target already has the path
        #[arg(long)]
        reup: bool,
        /// Record what would happen without calling the target store
        #[arg(long)]
        dry: bool,
        /// Number of upload workers; overrides `upload.concurrency`
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Extract {
            common,
            selection,
            recursive,
            fetch_store_links,
            refresh,
            no_cache,
            manifest_out,
        } => {
            let config = load_config(&common.config)?;
            let convention = config.convention()?;
            let output_dir = common.output_dir(&config);
            let stores = selection.stores(&convention)?;
            let client = HttpSourceClient::new(source_credential_from_env()?)
                .context("failed to build source client")?;
            let options = FetchOptions {
                recursive,
                cache_policy: if refresh {
                    CachePolicy::Refresh
                } else {
                    CachePolicy::Reuse
                },
                persist_cache: !no_cache,
                retry: config.retry(),
            };
            let downloader = DefaultDownloader::new(client, convention, options);

            if fetch_store_links {
                let manifest = manifest_out.unwrap_or_else(|| output_dir.join(DEFAULT_MANIFEST));
                tracing::info!(command = "extract", stores = stores.len(), "Discovering linked stores");
                let found = discover(&downloader, &stores, &output_dir, &manifest)
                    .instrument(info_span!("discover"))
                    .await
                    .context("store discovery failed")?;
                println!(
                    "discovered {} stores, manifest written to {}",
                    found.len(),
                    manifest.display()
                );
                return Ok(());
            }

            tracing::info!(command = "extract", stores = stores.len(), recursive, "Starting extraction");
            let report = extract_stores(&downloader, &stores, &output_dir)
                .instrument(info_span!("extract"))
                .await;
            finish("extract", &output_dir, report)
        }
        Commands::Merge { common, input } => {
            let config = load_config(&common.config)?;
            let convention = config.convention()?;
            let output_dir = common.output_dir(&config);
            let stores = manifest_stores(&input, &convention)?;
            tracing::info!(command = "merge", stores = stores.len(), "Starting merge");
            let report = info_span!("merge").in_scope(|| merge_outputs(&stores, &output_dir));
            finish("merge", &output_dir, report)
        }
        Commands::Upload {
            common,
            selection,
            preview,
            publish,
            reup,
            dry,
            concurrency,
        } => {
            let config = load_config(&common.config)?;
            let convention = config.convention()?;
            let output_dir = common.output_dir(&config);
            let stores = selection.stores(&convention)?;
            // A dry run never talks to the target, so it does not need a token.
            let token = match target_token_from_env() {
                Ok(token) => token,
                Err(_) if dry => String::new(),
                Err(e) => return Err(e),
            };
            let target = DocumentStoreClient::new(&config.target, token)
                .context("failed to build target client")?;
            let options = UploadOptions {
                concurrency: concurrency.unwrap_or(config.upload.concurrency).max(1),
                reupload: reup,
                dry_run: dry,
                preview,
                publish,
                retry: config.retry(),
            };
            tracing::info!(
                command = "upload",
                stores = stores.len(),
                concurrency = options.concurrency,
                dry,
                "Starting upload"
            );
            let report = upload_stores(
                Arc::new(target),
                &stores,
                &output_dir,
                &config.layout(),
                &options,
            )
            .instrument(info_span!("upload"))
            .await;
            finish("upload", &output_dir, report)
        }
    }
}

fn manifest_stores(input: &Path, convention: &StoreConvention) -> Result<Vec<ContentStore>> {
    let paths = read_manifest(input)
        .with_context(|| format!("cannot read manifest {}", input.display()))?;
    Ok(paths.iter().map(|p| convention.store(p)).collect())
}

/// Prints the summary, keeps a JSON copy as `<output_dir>/<command>-report.json`
/// and turns a fatal report into an error exit.
fn finish(command: &str, output_dir: &Path, report: MigrationReport) -> Result<()> {
    println!("{report}");
    let report_path = output_dir.join(format!("{command}-report.json"));
    let written = serde_json::to_vec_pretty(&report)
        .map_err(anyhow::Error::from)
        .and_then(|json| {
            fs::create_dir_all(output_dir)?;
            fs::write(&report_path, json)?;
            Ok(())
        });
    if let Err(e) = written {
        tracing::warn!(path = %report_path.display(), error = %e, "Failed to write report");
    }
    match report.fatal_error {
        Some(fatal) => {
            tracing::error!(command, error = %fatal, "Run aborted");
            Err(anyhow!("{command} aborted: {fatal}"))
        }
        None => {
            tracing::info!(command, "Run complete");
            Ok(())
        }
    }
}
