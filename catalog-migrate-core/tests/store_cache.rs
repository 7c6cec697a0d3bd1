use std::fs;
use std::path::Path;
use tempfile::tempdir;
use url::Url;

use catalog_migrate_core::cache::{cache_file_stem, cache_key, Cache, FsCache, MemoryCache};
use catalog_migrate_core::error::ManifestError;
use catalog_migrate_core::store::{
    read_manifest, slugify, write_manifest, StoreConvention, StoreKind,
};

fn convention() -> StoreConvention {
    StoreConvention::new(Url::parse("https://source.test").unwrap(), "content/stores/")
}

#[test]
fn store_links_follow_the_convention() {
    let c = convention();
    assert_eq!(c.stores_root(), "/content/stores");
    assert_eq!(c.store_link("/content/stores/a.html").as_deref(), Some("/content/stores/a"));
    assert_eq!(
        c.store_link("https://source.test/content/stores/a/sub.html?x=1#top").as_deref(),
        Some("/content/stores/a/sub")
    );
    assert_eq!(c.store_link("/content/stores/a/").as_deref(), Some("/content/stores/a"));
    assert_eq!(c.store_link("https://other.test/content/stores/a.html"), None);
    assert_eq!(c.store_link("/content/stores.html"), None);
    assert_eq!(c.store_link("/shop/a.html"), None);
    assert_eq!(c.store_link("#anchor"), None);
    assert_eq!(c.store_link("mailto:x@source.test"), None);
    assert_eq!(
        c.page_url("/content/stores/a").unwrap().as_str(),
        "https://source.test/content/stores/a.html"
    );
}

#[test]
fn store_names_and_kinds() {
    let c = convention();
    let main = c.store("/content/stores/Big Shop");
    assert_eq!(main.kind, StoreKind::Main);
    assert_eq!(main.name(), "big-shop");
    assert_eq!(main.output_dir(Path::new("out")), Path::new("out").join("big-shop"));

    let sub = c.store("/content/stores/Big Shop/sub.html");
    assert_eq!(sub.kind, StoreKind::Sub);
    assert_eq!(sub.name(), "big-shop-sub");
    assert!(main.contains(&sub));
    assert!(!sub.contains(&main));
    assert!(!main.contains(&c.store("/content/stores/Big Shopping")));

    let outside = c.store("/elsewhere/thing");
    assert_eq!(outside.kind, StoreKind::Main);
    assert_eq!(outside.name(), "thing");
    assert_eq!(c.store("/content/stores/!!!").name(), "store");
    assert_eq!(slugify("--Hello,  World--"), "hello-world");
}

#[test]
fn manifest_round_trip_skips_blanks_and_duplicates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("manifest.txt");
    fs::write(&path, "/content/stores/a\n\n  /content/stores/a/sub  \n/content/stores/a\n").unwrap();

    let paths = read_manifest(&path).unwrap();
    assert_eq!(paths, vec!["/content/stores/a", "/content/stores/a/sub"]);

    let out = dir.path().join("nested").join("out.txt");
    write_manifest(&out, &paths).unwrap();
    assert_eq!(read_manifest(&out).unwrap(), paths);
}

#[test]
fn large_manifest_keeps_first_occurrence_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("manifest.txt");
    let lines: Vec<String> = (0..6000)
        .map(|i| format!("/content/stores/s{}", (i * 7) % 1500))
        .collect();
    fs::write(&path, lines.join("\n")).unwrap();

    let paths = read_manifest(&path).unwrap();
    assert_eq!(paths.len(), 1500);
    assert_eq!(paths[0], "/content/stores/s0");
    assert_eq!(paths[1], "/content/stores/s7");
    assert_eq!(&paths[..2], &lines[..2]);
}

#[test]
fn missing_manifest_is_reported_as_not_found() {
    let dir = tempdir().unwrap();
    let err = read_manifest(&dir.path().join("absent.txt")).unwrap_err();
    assert!(matches!(err, ManifestError::NotFound { .. }));
}

#[test]
fn cache_keys_ignore_fragments_and_stems_are_stable() {
    let a = Url::parse("https://source.test/content/stores/a.html#top").unwrap();
    let b = Url::parse("https://source.test/content/stores/a.html").unwrap();
    assert_eq!(cache_key(&a), cache_key(&b));

    let stem = cache_file_stem(&cache_key(&b));
    assert_eq!(stem, cache_file_stem(&cache_key(&b)));
    assert!(stem.starts_with("source_test_content_stores_a_html-"));
    assert_ne!(stem, cache_file_stem("https://source.test/content/stores/a_html"));
}

#[test]
fn fs_cache_persists_entries_across_instances() {
    let dir = tempdir().unwrap();
    let cache_dir = dir.path().join("store").join("cache");
    let key = "https://source.test/content/stores/a.html";

    assert!(FsCache::new(&cache_dir).get(key).unwrap().is_none());
    FsCache::new(&cache_dir).put(key, b"<html></html>").unwrap();

    let entry = FsCache::new(&cache_dir).get(key).unwrap().unwrap();
    assert_eq!(entry.body, b"<html></html>");
    assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 2);
}

#[test]
fn memory_cache_overwrites_entries() {
    let cache = MemoryCache::new();
    assert!(cache.is_empty());
    cache.put("k", b"one").unwrap();
    cache.put("k", b"two").unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("k").unwrap().unwrap().body, b"two");
}
