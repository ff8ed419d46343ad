//! End-to-end pipeline tests over the in-memory registry: ingest with
//! fixity verification, asynchronous normalization, manifest generation,
//! and preservation export.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tessella_core::constants::PLACEHOLDER_CANVAS_DIM;
use tessella_core::{meta, AppError, Asset, AssetStatus};
use tessella_pipeline::{
    build_manifest, ConversionQueue, ConversionQueueConfig, CopyRasterEngine, Exporter,
    IngestService, ResolvedBases, Submission,
};
use tessella_registry::{AssetRegistry, MemoryRegistry};
use tessella_storage::LocalStore;

const HELLO_SHA256: &str = "7509e5bda0c762d2bac7f90d758b5b2263fa01ccbc542ab5e3df163be08e6ca9";

struct Fixture {
    registry: Arc<MemoryRegistry>,
    ingest: IngestService,
    _dir: tempfile::TempDir,
    root: std::path::PathBuf,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let store = LocalStore::new(dir.path()).await.unwrap();
    let registry = Arc::new(MemoryRegistry::new());
    let ingest = IngestService::new(registry.clone(), store);

    Fixture {
        registry,
        ingest,
        _dir: dir,
        root,
    }
}

fn submission(filename: &str, declared: &str) -> Submission {
    Submission {
        filename: filename.to_string(),
        content_type: "application/octet-stream".to_string(),
        declared_sha256: declared.to_string(),
        declared_metadata: json!({"collection": "test"}),
    }
}

async fn wait_for_terminal(registry: &MemoryRegistry, id: uuid::Uuid) -> Asset {
    for _ in 0..300 {
        let asset = registry.get_by_id(id).await.unwrap().unwrap();
        if asset.status != AssetStatus::Processing {
            return asset;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("asset stuck in processing");
}

#[tokio::test]
async fn ingest_with_correct_digest_succeeds() {
    let fx = fixture().await;

    let mut reader = std::io::Cursor::new(b"hello world!".to_vec());
    let receipt = fx
        .ingest
        .accept(&mut reader, &submission("hello.bin", HELLO_SHA256))
        .await
        .unwrap();

    assert_eq!(receipt.status, AssetStatus::Ready);
    assert_eq!(receipt.fixity_check, "PASS");
    assert_eq!(receipt.sha256, HELLO_SHA256);
    assert_eq!(receipt.file_size, 12);

    let asset = fx
        .registry
        .get_by_id(receipt.asset_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(asset.meta_str(meta::FIXITY_SHA256), Some(HELLO_SHA256));
    assert_eq!(asset.meta_str(meta::INGEST_METHOD), Some("sip_bagit"));
    assert!(Path::new(&asset.file_path).exists());
}

#[tokio::test]
async fn declared_digest_is_compared_case_insensitively() {
    let fx = fixture().await;

    let mut reader = std::io::Cursor::new(b"hello world!".to_vec());
    let receipt = fx
        .ingest
        .accept(
            &mut reader,
            &submission("hello.bin", &HELLO_SHA256.to_uppercase()),
        )
        .await
        .unwrap();

    // The stored digest is the server-computed lowercase hex.
    assert_eq!(receipt.sha256, HELLO_SHA256);
}

#[tokio::test]
async fn fixity_mismatch_leaves_no_trace() {
    let fx = fixture().await;

    let mut reader = std::io::Cursor::new(b"hello world!".to_vec());
    let err = fx
        .ingest
        .accept(&mut reader, &submission("hello.bin", "deadbeef"))
        .await
        .unwrap_err();

    match err {
        AppError::FixityMismatch { declared, computed } => {
            assert_eq!(declared, "deadbeef");
            assert_eq!(computed, HELLO_SHA256);
        }
        other => panic!("expected FixityMismatch, got {:?}", other),
    }

    // No registry record, no canonical file, no staging leftovers.
    assert_eq!(fx.registry.count().await.unwrap(), 0);
    assert!(!fx.root.join("hello.bin").exists());
    let mut staging = tokio::fs::read_dir(fx.root.join(".staging")).await.unwrap();
    assert!(staging.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn missing_declared_digest_is_a_validation_error() {
    let fx = fixture().await;

    let mut reader = std::io::Cursor::new(b"hello world!".to_vec());
    let err = fx
        .ingest
        .accept(&mut reader, &submission("hello.bin", ""))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(fx.registry.count().await.unwrap(), 0);
}

#[tokio::test]
async fn non_raster_payload_gets_placeholder_manifest_dimensions() {
    let fx = fixture().await;

    let mut reader = std::io::Cursor::new(b"hello world!".to_vec());
    let receipt = fx
        .ingest
        .accept(&mut reader, &submission("hello.bin", HELLO_SHA256))
        .await
        .unwrap();

    let asset = fx
        .registry
        .get_by_id(receipt.asset_id)
        .await
        .unwrap()
        .unwrap();
    // 12 bytes of text: no raster dimensions were extractable.
    assert_eq!(asset.dimensions(), None);

    let bases = ResolvedBases {
        api_base: "http://localhost:8000".to_string(),
        image_service_base: "http://localhost:8182/iiif/2".to_string(),
    };
    let manifest = build_manifest(&asset, &bases);
    assert_eq!(
        manifest["items"][0]["width"],
        json!(PLACEHOLDER_CANVAS_DIM)
    );
    assert_eq!(
        manifest["items"][0]["height"],
        json!(PLACEHOLDER_CANVAS_DIM)
    );
}

#[tokio::test]
async fn ingest_convert_manifest_export_round_trip() {
    let fx = fixture().await;

    let mut reader = std::io::Cursor::new(b"hello world!".to_vec());
    let receipt = fx
        .ingest
        .accept(&mut reader, &submission("page.psb", HELLO_SHA256))
        .await
        .unwrap();

    let queue = ConversionQueue::new(
        fx.registry.clone(),
        Arc::new(CopyRasterEngine::new(2400, 1800)),
        ConversionQueueConfig::default(),
    );

    let asset = fx
        .registry
        .get_by_id(receipt.asset_id)
        .await
        .unwrap()
        .unwrap();
    assert!(queue.maybe_enqueue(&asset).await.unwrap());

    let settled = wait_for_terminal(&fx.registry, receipt.asset_id).await;
    assert_eq!(settled.status, AssetStatus::Ready);
    assert!(settled.file_path.ends_with("page.tif"));
    assert_eq!(settled.dimensions(), Some((2400, 1800)));
    // Fixity still describes the master even after the locator rewrite.
    assert_eq!(settled.meta_str(meta::FIXITY_SHA256), Some(HELLO_SHA256));

    // The manifest follows the derivative filename.
    let bases = ResolvedBases {
        api_base: "http://localhost:8000".to_string(),
        image_service_base: "http://localhost:8182/iiif/2".to_string(),
    };
    let manifest = build_manifest(&settled, &bases);
    let service_id = manifest["items"][0]["items"][0]["items"][0]["body"]["service"][0]["id"]
        .as_str()
        .unwrap();
    assert!(service_id.ends_with("/page.tif"));

    // The export packages derivative and master, reusing the stored digest
    // for the master.
    let exporter = Exporter::new(fx.registry.clone(), "Test Organization");
    let artifact = exporter.export(receipt.asset_id).await.unwrap();

    let decoder = flate2::read::GzDecoder::new(artifact.bytes.as_slice());
    let mut archive = tar::Archive::new(decoder);
    let mut manifest_contents = String::new();
    let mut saw_master = false;
    let mut saw_derivative = false;
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = entry.path().unwrap().to_string_lossy().into_owned();
        match path.as_str() {
            "manifest-sha256.txt" => {
                use std::io::Read;
                entry.read_to_string(&mut manifest_contents).unwrap();
            }
            "data/page.psb" => saw_master = true,
            "data/page.tif" => saw_derivative = true,
            _ => {}
        }
    }

    assert!(saw_master);
    assert!(saw_derivative);
    assert!(manifest_contents.contains(&format!("{}  data/page.psb", HELLO_SHA256)));
    assert_eq!(manifest_contents.lines().count(), 2);
}

#[tokio::test]
async fn concurrent_ingests_use_independent_staging_files() {
    let fx = fixture().await;

    let ingest = Arc::new(fx.ingest);
    let mut handles = Vec::new();
    for i in 0..4 {
        let ingest = ingest.clone();
        handles.push(tokio::spawn(async move {
            let body = b"hello world!".to_vec();
            let mut reader = std::io::Cursor::new(body);
            ingest
                .accept(&mut reader, &submission(&format!("copy-{}.bin", i), HELLO_SHA256))
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(fx.registry.count().await.unwrap(), 4);
}
