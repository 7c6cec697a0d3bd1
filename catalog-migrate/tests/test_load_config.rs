use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

use catalog_migrate::load_config::{
    load_config, source_credential_from_env, target_token_from_env, SourceCredential,
    SOURCE_AUTH_COOKIE, SOURCE_AUTH_TOKEN, TARGET_AUTH_TOKEN,
};
use catalog_migrate_core::store::StoreKind;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

fn clear_credentials() {
    env::remove_var(SOURCE_AUTH_COOKIE);
    env::remove_var(SOURCE_AUTH_TOKEN);
    env::remove_var(TARGET_AUTH_TOKEN);
}

#[test]
fn full_config_loads_every_section() {
    let file = config_file(
        r#"
source:
  base_url: "https://author.example.com"
  stores_root: /content/stores
target:
  org: acme
  repo: site
  branch: stage
  destination: /catalogs
  sub_folder: regional
  content_url: "https://content.example.com"
  admin_url: "https://admin.example.com"
output_dir: ./tmp/exports
upload:
  concurrency: 8
  max_attempts: 5
  base_delay_ms: 10
"#,
    );

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.output_dir, PathBuf::from("./tmp/exports"));
    assert_eq!(config.target.branch, "stage");
    assert_eq!(config.upload.concurrency, 8);
    let retry = config.retry();
    assert_eq!(retry.max_attempts, 5);
    assert_eq!(retry.base_delay_ms, 10);

    let convention = config.convention().unwrap();
    let sub = convention.store("/content/stores/shop/deals");
    assert_eq!(sub.kind, StoreKind::Sub);
    assert_eq!(
        config.layout().sheet_path(&sub),
        "catalogs/regional/shop-deals.json"
    );
}

#[test]
fn optional_fields_take_defaults() {
    let file = config_file(
        r#"
source:
  base_url: "https://author.example.com"
  stores_root: /content/stores
target:
  org: acme
  repo: site
  destination: catalogs
"#,
    );

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.output_dir, PathBuf::from("./out"));
    assert_eq!(config.target.branch, "main");
    assert_eq!(config.target.sub_folder, "sub-catalogs");
    assert_eq!(config.target.content_url, "https://admin.da.live");
    assert_eq!(config.target.admin_url, "https://admin.hlx.page");
    assert_eq!(config.upload.concurrency, 4);
    assert_eq!(config.retry().max_attempts, 3);
    assert_eq!(config.retry().base_delay_ms, 250);
}

#[test]
fn malformed_base_url_is_rejected() {
    let file = config_file(
        r#"
source:
  base_url: "not a url"
  stores_root: /content/stores
target:
  org: acme
  repo: site
  destination: catalogs
"#,
    );

    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("invalid source.base_url"));
}

#[test]
fn missing_target_section_is_rejected() {
    let file = config_file(
        r#"
source:
  base_url: "https://author.example.com"
  stores_root: /content/stores
"#,
    );

    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));
}

#[test]
fn missing_file_is_rejected() {
    let err = load_config("does/not/exist.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
#[serial]
fn source_cookie_wins_over_token() {
    clear_credentials();
    env::set_var(SOURCE_AUTH_COOKIE, "login-token=abc");
    env::set_var(SOURCE_AUTH_TOKEN, "xyz");

    let credential = source_credential_from_env().unwrap();

    assert_eq!(credential, SourceCredential::Cookie("login-token=abc".into()));
    assert_eq!(format!("{credential:?}"), "Cookie(***)");
    clear_credentials();
}

#[test]
#[serial]
fn source_token_is_used_without_cookie() {
    clear_credentials();
    env::set_var(SOURCE_AUTH_COOKIE, "   ");
    env::set_var(SOURCE_AUTH_TOKEN, "xyz");

    assert_eq!(
        source_credential_from_env().unwrap(),
        SourceCredential::Bearer("xyz".into())
    );
    clear_credentials();
}

#[test]
#[serial]
fn missing_credentials_are_fatal() {
    clear_credentials();

    let source = source_credential_from_env().unwrap_err();
    let target = target_token_from_env().unwrap_err();

    assert!(source.to_string().contains(SOURCE_AUTH_TOKEN));
    assert!(target.to_string().contains(TARGET_AUTH_TOKEN));

    env::set_var(TARGET_AUTH_TOKEN, "secret");
    assert_eq!(target_token_from_env().unwrap(), "secret");
    clear_credentials();
}
