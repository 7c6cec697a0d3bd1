//! `load_config`: reads the static YAML config and the secrets from the environment.
//!
//! This is the only place where untrusted YAML is parsed and turned into the
//! typed values the core pipelines take ([`StoreConvention`], [`TargetLayout`],
//! [`RetryPolicy`]). Secrets never live in the YAML file:
//!
//! - `SOURCE_AUTH_COOKIE` or `SOURCE_AUTH_TOKEN`: source repository credential.
//! - `TARGET_AUTH_TOKEN`: bearer token for the target document store.
//!
//! All errors are `anyhow::Error` with context and are surfaced at the CLI boundary.

use anyhow::{anyhow, Context, Result};
use catalog_migrate_core::retry::RetryPolicy;
use catalog_migrate_core::store::StoreConvention;
use catalog_migrate_core::synthesize::TargetLayout;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use url::Url;

pub const SOURCE_AUTH_COOKIE: &str = "SOURCE_AUTH_COOKIE";
pub const SOURCE_AUTH_TOKEN: &str = "SOURCE_AUTH_TOKEN";
pub const TARGET_AUTH_TOKEN: &str = "TARGET_AUTH_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    pub source: SourceSection,
    pub target: TargetSection,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub upload: UploadSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    pub base_url: String,
    pub stores_root: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetSection {
    pub org: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub destination: String,
    #[serde(default = "default_sub_folder")]
    pub sub_folder: String,
    #[serde(default = "default_content_url")]
    pub content_url: String,
    #[serde(default = "default_admin_url")]
    pub admin_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./out")
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_sub_folder() -> String {
    "sub-catalogs".to_string()
}

fn default_content_url() -> String {
    "https://admin.da.live".to_string()
}

fn default_admin_url() -> String {
    "https://admin.hlx.page".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    RetryPolicy::default().max_attempts
}

fn default_base_delay_ms() -> u64 {
    RetryPolicy::default().base_delay_ms
}

impl CliConfig {
    pub fn convention(&self) -> Result<StoreConvention> {
        let base_url = Url::parse(&self.source.base_url)
            .with_context(|| format!("invalid source.base_url {:?}", self.source.base_url))?;
        Ok(StoreConvention::new(base_url, &self.source.stores_root))
    }

    pub fn layout(&self) -> TargetLayout {
        TargetLayout::new(&self.target.destination, &self.target.sub_folder)
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.upload.max_attempts.max(1),
            base_delay_ms: self.upload.base_delay_ms,
        }
    }
}

/// Loads and validates a static YAML config file (no secrets).
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    // A bad base URL would otherwise only show up on the first request.
    config.convention()?;
    info!(
        config_path = ?path_ref,
        source = %config.source.base_url,
        org = %config.target.org,
        repo = %config.target.repo,
        "Parsed config YAML successfully"
    );
    Ok(config)
}

/// Credential attached to every source request.
#[derive(Clone, PartialEq, Eq)]
pub enum SourceCredential {
    Cookie(String),
    Bearer(String),
}

impl std::fmt::Debug for SourceCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceCredential::Cookie(_) => f.write_str("Cookie(***)"),
            SourceCredential::Bearer(_) => f.write_str("Bearer(***)"),
        }
    }
}

/// Reads the source credential; a cookie wins over a token when both are set.
pub fn source_credential_from_env() -> Result<SourceCredential> {
    if let Some(cookie) = non_empty_var(SOURCE_AUTH_COOKIE) {
        return Ok(SourceCredential::Cookie(cookie));
    }
    if let Some(token) = non_empty_var(SOURCE_AUTH_TOKEN) {
        return Ok(SourceCredential::Bearer(token));
    }
    error!("No source credential in environment");
    Err(anyhow!(
        "missing source credential: set {SOURCE_AUTH_COOKIE} or {SOURCE_AUTH_TOKEN}"
    ))
}

pub fn target_token_from_env() -> Result<String> {
    non_empty_var(TARGET_AUTH_TOKEN).ok_or_else(|| {
        error!("No target token in environment");
        anyhow!("missing target credential: set {TARGET_AUTH_TOKEN}")
    })
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
