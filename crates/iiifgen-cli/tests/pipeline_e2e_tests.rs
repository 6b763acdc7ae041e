//! End-to-end tests for the manifest generation pipeline
//!
//! These tests validate the full workflow against a mock IIIF Image
//! Service:
//! - resolution accounting and error isolation
//! - canvas ordering under reordered probe latencies
//! - full-mode idempotence
//! - partial-mode change detection
//! - retry-budget exhaustion on timeouts

use iiifgen_cli::config::{ManifestSection, PipelineConfig};
use iiifgen_cli::{Pipeline, RunMode};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to write an occurrence TSV with the standard header
fn write_occurrences(dir: &TempDir, rows: &str) -> PathBuf {
    let csv_path = dir.path().join("occurrence.tsv");
    let content = format!("catalogNumber\tfamily\tgenus\timage\timage2\n{}", rows);
    std::fs::write(&csv_path, content).expect("Failed to write occurrence file");
    csv_path
}

/// Helper to build a run configuration against the mock service
fn test_config(dir: &TempDir, server_url: &str, csv: PathBuf) -> PipelineConfig {
    PipelineConfig {
        image_service_base_url: server_url.to_string(),
        manifest_base_url: "https://collections.example.org/manifests".to_string(),
        occurrence_csv: csv,
        separator: "\t".to_string(),
        manifest_dir: dir.path().join("manifests"),
        error_log_file: dir.path().join("errors.log"),
        default_language: "en".to_string(),
        metadata_keys: vec!["family".to_string(), "genus".to_string()],
        media_columns: vec!["image".to_string(), "image2".to_string()],
        manifest: ManifestSection {
            rights: "http://creativecommons.org/licenses/by/4.0/".to_string(),
        },
        concurrency: 4,
        probe_timeout_secs: 1,
    }
}

/// Helper to mount a successful info.json response
async fn mount_info(server: &MockServer, identifier: &str, width: u32, height: u32) {
    mount_info_delayed(server, identifier, width, height, Duration::ZERO).await;
}

async fn mount_info_delayed(
    server: &MockServer,
    identifier: &str,
    width: u32,
    height: u32,
    delay: Duration,
) {
    Mock::given(method("GET"))
        .and(path(format!("/{}/info.json", identifier)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(delay)
                .set_body_json(serde_json::json!({
                    "@context": "http://iiif.io/api/image/3/context.json",
                    "id": format!("https://img.example/iiif/{}", identifier),
                    "width": width,
                    "height": height
                })),
        )
        .mount(server)
        .await;
}

async fn run_pipeline(config: &PipelineConfig, mode: RunMode) -> iiifgen_cli::RunReport {
    let pipeline = Pipeline::new(config.clone(), mode).expect("pipeline construction failed");
    pipeline.run().await.expect("pipeline run failed")
}

#[tokio::test]
async fn resolution_counts_cover_every_media_uri() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_info(&server, "a.jpg", 100, 100).await;
    Mock::given(method("GET"))
        .and(path("/b.jpg/info.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let csv = write_occurrences(
        &dir,
        "INS-001\tFormicidae\tCamponotus\thttps://img.example/a.jpg\thttps://img.example/b.jpg\n",
    );
    let config = test_config(&dir, &server.uri(), csv);
    let report = run_pipeline(&config, RunMode::Full).await;

    // resolved + failed + skipped == total media URIs
    assert_eq!(report.images_resolved, 1);
    assert_eq!(report.images_failed, 1);
    assert_eq!(report.images_skipped, 0);
    assert_eq!(
        report.images_resolved + report.images_failed + report.images_skipped,
        2
    );
    // One usable image is enough for a manifest
    assert_eq!(report.manifests_written, 1);
}

#[tokio::test]
async fn canvas_order_is_independent_of_probe_completion_order() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    // The first image answers much more slowly than the second
    mount_info_delayed(&server, "slow.jpg", 1111, 2222, Duration::from_millis(400)).await;
    mount_info(&server, "fast.jpg", 3333, 4444).await;

    let csv = write_occurrences(
        &dir,
        "INS-001\tFormicidae\t\thttps://img.example/slow.jpg\thttps://img.example/fast.jpg\n",
    );
    let config = test_config(&dir, &server.uri(), csv);
    run_pipeline(&config, RunMode::Full).await;

    let manifest: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(config.manifest_dir.join("INS-001.json")).unwrap(),
    )
    .unwrap();

    let canvases = manifest["items"].as_array().unwrap();
    assert_eq!(canvases.len(), 2);
    // Source order, not completion order
    assert_eq!(canvases[0]["width"], 1111);
    assert_eq!(canvases[1]["width"], 3333);
}

#[tokio::test]
async fn missing_catalog_number_is_rejected_without_output() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_info(&server, "a.jpg", 100, 100).await;

    let csv = write_occurrences(
        &dir,
        "\tFormicidae\t\thttps://img.example/a.jpg\t\n\
         INS-002\tApidae\t\thttps://img.example/a.jpg\t\n",
    );
    let config = test_config(&dir, &server.uri(), csv);
    let report = run_pipeline(&config, RunMode::Full).await;

    assert_eq!(report.records_read, 2);
    assert_eq!(report.records_rejected, 1);
    assert_eq!(report.rejected_missing_catalog_number, 1);
    assert_eq!(report.manifests_written, 1);

    let files: Vec<String> = std::fs::read_dir(&config.manifest_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files, vec!["INS-002.json"]);
}

#[tokio::test]
async fn partial_rerun_with_no_changes_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_info(&server, "a.jpg", 100, 100).await;
    mount_info(&server, "b.jpg", 200, 200).await;

    let csv = write_occurrences(
        &dir,
        "INS-001\tFormicidae\t\thttps://img.example/a.jpg\t\n\
         INS-002\tApidae\t\thttps://img.example/b.jpg\t\n",
    );
    let config = test_config(&dir, &server.uri(), csv);

    let first = run_pipeline(&config, RunMode::Partial).await;
    assert_eq!(first.manifests_written, 2);
    assert_eq!(first.manifests_skipped, 0);

    let second = run_pipeline(&config, RunMode::Partial).await;
    assert_eq!(second.manifests_written, 0);
    assert_eq!(second.manifests_skipped, 2);
}

#[tokio::test]
async fn partial_rerun_rewrites_only_the_changed_record() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_info(&server, "a.jpg", 100, 100).await;
    mount_info(&server, "b.jpg", 200, 200).await;

    let csv = write_occurrences(
        &dir,
        "INS-001\tFormicidae\t\thttps://img.example/a.jpg\t\n\
         INS-002\tApidae\t\thttps://img.example/b.jpg\t\n",
    );
    let config = test_config(&dir, &server.uri(), csv);
    run_pipeline(&config, RunMode::Partial).await;

    let untouched = std::fs::read(config.manifest_dir.join("INS-002.json")).unwrap();

    // Alter one field of one record upstream
    write_occurrences(
        &dir,
        "INS-001\tMyrmicinae\t\thttps://img.example/a.jpg\t\n\
         INS-002\tApidae\t\thttps://img.example/b.jpg\t\n",
    );

    let report = run_pipeline(&config, RunMode::Partial).await;
    assert_eq!(report.manifests_written, 1);
    assert_eq!(report.manifests_skipped, 1);

    let changed = std::fs::read_to_string(config.manifest_dir.join("INS-001.json")).unwrap();
    assert!(changed.contains("Myrmicinae"));
    assert_eq!(
        std::fs::read(config.manifest_dir.join("INS-002.json")).unwrap(),
        untouched
    );
}

#[tokio::test]
async fn full_mode_is_idempotent_byte_for_byte() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_info(&server, "a.jpg", 4000, 3000).await;

    let csv = write_occurrences(
        &dir,
        "INS-001\tFormicidae\tCamponotus\thttps://img.example/a.jpg\t\n",
    );
    let config = test_config(&dir, &server.uri(), csv);

    run_pipeline(&config, RunMode::Full).await;
    let first = std::fs::read(config.manifest_dir.join("INS-001.json")).unwrap();

    run_pipeline(&config, RunMode::Full).await;
    let second = std::fs::read(config.manifest_dir.join("INS-001.json")).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn resolved_record_yields_canvas_and_metadata() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_info(&server, "ins001.jpg", 4000, 3000).await;

    let csv = write_occurrences(
        &dir,
        "INS-001\tFormicidae\t\thttps://img.example/ins001.jpg\t\n",
    );
    let config = test_config(&dir, &server.uri(), csv);
    let report = run_pipeline(&config, RunMode::Full).await;

    assert_eq!(report.manifests_written, 1);

    let manifest: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(config.manifest_dir.join("INS-001.json")).unwrap(),
    )
    .unwrap();

    assert_eq!(
        manifest["@context"],
        "http://iiif.io/api/presentation/3/context.json"
    );
    assert_eq!(manifest["type"], "Manifest");
    assert_eq!(manifest["label"]["en"][0], "INS-001");
    assert_eq!(manifest["rights"], "http://creativecommons.org/licenses/by/4.0/");

    let canvases = manifest["items"].as_array().unwrap();
    assert_eq!(canvases.len(), 1);
    assert_eq!(canvases[0]["width"], 4000);
    assert_eq!(canvases[0]["height"], 3000);
    assert_eq!(
        canvases[0]["items"][0]["items"][0]["body"]["service"]["id"],
        "https://img.example/iiif/ins001.jpg"
    );

    let metadata = manifest["metadata"].as_array().unwrap();
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata[0]["label"]["en"][0], "family");
    assert_eq!(metadata[0]["value"]["en"][0], "Formicidae");
}

#[tokio::test]
async fn timeout_past_retry_budget_yields_no_output() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    // Slower than the 1s client timeout on every attempt; the probe
    // is tried once plus two retries
    Mock::given(method("GET"))
        .and(path("/stuck.jpg/info.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(1500))
                .set_body_json(serde_json::json!({"id": "x", "width": 1, "height": 1})),
        )
        .expect(3)
        .mount(&server)
        .await;

    let csv = write_occurrences(
        &dir,
        "INS-001\tFormicidae\t\thttps://img.example/stuck.jpg\t\n",
    );
    let config = test_config(&dir, &server.uri(), csv);
    let report = run_pipeline(&config, RunMode::Full).await;

    assert_eq!(report.images_failed, 1);
    assert_eq!(report.manifests_written, 0);
    assert!(!config.manifest_dir.join("INS-001.json").exists());
}
