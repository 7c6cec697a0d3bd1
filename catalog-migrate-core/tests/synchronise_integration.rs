mod common;

use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use catalog_migrate_core::contract::{MockDownloader, MockTargetStore};
use catalog_migrate_core::download::{DefaultDownloader, FetchOptions, FetchReport, FetchedTree};
use catalog_migrate_core::error::{DownloadError, SourceError};
use catalog_migrate_core::flatten::read_csv;
use catalog_migrate_core::hierarchy::{
    read_hierarchy, write_hierarchy, Hierarchy, HierarchyNode, NodeKind,
};
use catalog_migrate_core::retry::RetryPolicy;
use catalog_migrate_core::store::{
    read_manifest, ContentStore, FLAT_FILE, HIERARCHY_FILE, MERGED_FILE, MERGED_FLAT_FILE,
};
use catalog_migrate_core::synchronise::{discover, extract_stores, merge_outputs, upload_stores};
use catalog_migrate_core::synthesize::TargetLayout;
use catalog_migrate_core::upload::UploadOptions;

use common::{convention, FakeSource, STORE_A, STORE_SUB};

fn tree_for(store: &ContentStore) -> FetchedTree {
    FetchedTree {
        hierarchy: Hierarchy::new(vec![HierarchyNode::new(NodeKind::Store, store.name())
            .with_items(vec![HierarchyNode::new(NodeKind::Tab, "Overview")])]),
        report: FetchReport::default(),
    }
}

fn stores(paths: &[&str]) -> Vec<ContentStore> {
    let convention = convention();
    paths.iter().map(|p| convention.store(p)).collect()
}

#[tokio::test]
async fn one_failing_store_does_not_stop_the_batch() {
    let out = tempdir().unwrap();
    let mut downloader = MockDownloader::new();
    downloader
        .expect_fetch_tree()
        .times(3)
        .returning(|store, _dir| {
            if store.name() == "b" {
                Err(DownloadError::Source(SourceError::NotFound {
                    url: store.path.clone(),
                }))
            } else {
                Ok(tree_for(store))
            }
        });
    let batch = stores(&["/content/stores/a", "/content/stores/b", "/content/stores/c"]);

    let report = extract_stores(&downloader, &batch, out.path()).await;

    assert_eq!(report.extract.succeeded, 2);
    assert_eq!(report.extract.failed, 1);
    assert_eq!(report.flatten.succeeded, 2);
    assert!(!report.is_fatal());
    assert!(out.path().join("a").join(HIERARCHY_FILE).exists());
    assert!(out.path().join("c").join(FLAT_FILE).exists());
    assert!(!out.path().join("b").join(HIERARCHY_FILE).exists());
    assert_eq!(report.stores[1].error.as_deref(), Some("not found: /content/stores/b"));
    assert!(report.to_string().contains("failed store /content/stores/b"));
}

#[tokio::test]
async fn rejected_credentials_abort_the_batch() {
    let out = tempdir().unwrap();
    let mut downloader = MockDownloader::new();
    downloader
        .expect_fetch_tree()
        .times(1)
        .returning(|store, _dir| {
            Err(DownloadError::Source(SourceError::Unauthorized {
                url: store.path.clone(),
                status: 401,
            }))
        });
    let batch = stores(&["/content/stores/a", "/content/stores/b"]);

    let report = extract_stores(&downloader, &batch, out.path()).await;

    assert!(report.is_fatal());
    assert_eq!(report.extract.failed, 1);
    assert!(report.to_string().contains("aborted"));
}

#[tokio::test]
async fn discovery_writes_union_of_linked_stores() {
    let out = tempdir().unwrap();
    let manifest = out.path().join("stores.txt");
    let mut downloader = MockDownloader::new();
    downloader
        .expect_discover_stores()
        .returning(|store, _dir| {
            Ok(vec![store.path.clone(), "/content/stores/shared".to_string()])
        });
    let batch = stores(&["/content/stores/a", "/content/stores/b"]);

    let found = discover(&downloader, &batch, out.path(), &manifest).await.unwrap();

    let expected = vec![
        "/content/stores/a".to_string(),
        "/content/stores/shared".to_string(),
        "/content/stores/b".to_string(),
    ];
    assert_eq!(found, expected);
    assert_eq!(read_manifest(&manifest).unwrap(), expected);
}

#[tokio::test]
async fn full_pipeline_extracts_merges_and_uploads() {
    let out = tempdir().unwrap();
    let options = FetchOptions {
        retry: RetryPolicy::none(),
        ..FetchOptions::default()
    };
    let downloader = DefaultDownloader::new(FakeSource::catalog(), convention(), options);
    let manifest = out.path().join("manifest.txt");

    let found = discover(&downloader, &stores(&[STORE_A]), out.path(), &manifest)
        .await
        .unwrap();
    assert_eq!(found, vec![STORE_A.to_string(), STORE_SUB.to_string()]);

    let batch: Vec<ContentStore> = {
        let convention = downloader.convention();
        read_manifest(&manifest)
            .unwrap()
            .iter()
            .map(|p| convention.store(p))
            .collect()
    };
    let extracted = extract_stores(&downloader, &batch, out.path()).await;
    assert_eq!(extracted.extract.succeeded, 2);

    let merged_report = merge_outputs(&batch, out.path());
    assert_eq!(merged_report.merge.succeeded, 1);
    assert_eq!(merged_report.flatten.succeeded, 1);

    let merged = read_hierarchy(&out.path().join("a").join(MERGED_FILE)).unwrap();
    let a = merged.find(&["Catalog", "A"]).unwrap();
    assert_eq!(a.items.iter().filter(|n| n.title == "Sub").count(), 1);
    assert!(merged.find(&["Catalog", "A", "Sub", "Accessories"]).is_some());
    let rows = read_csv(&out.path().join("a").join(MERGED_FLAT_FILE)).unwrap();
    assert_eq!(rows.len(), merged.count_nodes() - 1);

    let uploaded = Arc::new(Mutex::new(Vec::new()));
    let mut target = MockTargetStore::new();
    target.expect_exists().returning(|_| Ok(false));
    let sink = Arc::clone(&uploaded);
    target.expect_put().returning(move |path, _, content_type| {
        sink.lock()
            .unwrap()
            .push((path.to_string(), content_type.to_string()));
        Ok(())
    });
    target.expect_preview().returning(|_| Ok(()));
    let layout = TargetLayout::new("catalogs", "sub-catalogs");
    let options = UploadOptions {
        preview: true,
        retry: RetryPolicy::none(),
        ..UploadOptions::default()
    };

    let report = upload_stores(Arc::new(target), &batch, out.path(), &layout, &options).await;

    assert_eq!(report.synthesize.succeeded, 2);
    assert_eq!(report.upload.failed, 0);
    assert_eq!(report.preview.succeeded, 4);
    let mut paths: Vec<_> = uploaded.lock().unwrap().iter().map(|(p, _)| p.clone()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            "catalogs/a.html",
            "catalogs/a.json",
            "catalogs/a/images/catalog-a-products-phones-phone-x-bffba9cf--phone.png",
            "catalogs/sub-catalogs/a-sub.html",
            "catalogs/sub-catalogs/a-sub.json",
        ]
    );
    assert!(uploaded
        .lock()
        .unwrap()
        .iter()
        .any(|(p, t)| p.ends_with(".png") && t == "image/png"));
    assert_eq!(report.upload.succeeded, 5);
}

#[tokio::test]
async fn unprepared_store_is_counted_apart_from_upload_tasks() {
    let out = tempdir().unwrap();
    let batch = stores(&[STORE_A, STORE_SUB]);
    let tree = tree_for(&batch[0]);
    write_hierarchy(&out.path().join("a").join(HIERARCHY_FILE), &tree.hierarchy).unwrap();

    let mut target = MockTargetStore::new();
    target.expect_exists().returning(|_| Ok(false));
    target.expect_put().returning(|_, _, _| Ok(()));
    let layout = TargetLayout::new("catalogs", "sub-catalogs");
    let options = UploadOptions {
        retry: RetryPolicy::none(),
        ..UploadOptions::default()
    };

    let report = upload_stores(Arc::new(target), &batch, out.path(), &layout, &options).await;

    // The sub-store has no hierarchy on disk.
    assert_eq!(report.synthesize.succeeded, 1);
    assert_eq!(report.synthesize.failed, 1);
    assert_eq!(report.upload.succeeded, 2);
    assert_eq!(report.upload.failed, 0);
    assert_eq!(report.stores.len(), 1);
    assert_eq!(report.stores[0].store, STORE_SUB);
    let row = format!("{:<10} {:>10} {:>10} {:>10}", "synthesize", 1, 0, 1);
    assert!(report.to_string().contains(&row));
}

#[test]
fn merge_reports_missing_main_hierarchy() {
    let out = tempdir().unwrap();
    fs::create_dir_all(out.path().join("a")).unwrap();

    let report = merge_outputs(&stores(&[STORE_A, STORE_SUB]), out.path());

    assert_eq!(report.merge.failed, 1);
    assert_eq!(report.merge.succeeded, 0);
}
