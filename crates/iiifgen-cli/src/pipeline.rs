//! Pipeline orchestration
//!
//! Streams records through validate → resolve → map → write. Records
//! pipeline across each other with a bounded window while the
//! resolver's shared semaphore keeps the probe bound global, so the
//! image service never sees more than the configured number of
//! outstanding requests. Failures at any stage for one record are
//! isolated, logged, and recorded in the summary; only configuration
//! errors abort the run.

use crate::config::{PipelineConfig, RunMode};
use crate::error::Result;
use crate::iiif::{ManifestMapper, NoUsableImages};
use crate::record::{validate, RecordReader, SpecimenRecord, RejectReason};
use crate::resolver::DimensionResolver;
use crate::summary::{RunReport, RunSummary};
use crate::writer::{ManifestWriter, WriteOutcome};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Records allowed to be in flight simultaneously
///
/// Kept small: the real resource bound is the resolver's probe
/// semaphore; this only controls how many records overlap stages.
pub const RECORD_PIPELINE_WIDTH: usize = 4;

/// Orchestrates one manifest-generation run
pub struct Pipeline {
    config: PipelineConfig,
    mode: RunMode,
    resolver: DimensionResolver,
    mapper: ManifestMapper,
    writer: ManifestWriter,
    summary: Arc<RunSummary>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Build the pipeline, failing fast on configuration problems
    pub fn new(config: PipelineConfig, mode: RunMode) -> Result<Self> {
        let resolver = DimensionResolver::new(&config)?;
        let mapper = ManifestMapper::new(&config);
        let writer = ManifestWriter::new(&config, mode)?;

        Ok(Self {
            config,
            mode,
            resolver,
            mapper,
            writer,
            summary: Arc::new(RunSummary::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Token for requesting graceful early termination
    ///
    /// Cancelling stops new records from starting; in-flight probes
    /// finish or time out, and the run still returns a summary of the
    /// work completed.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the run to completion (or cancellation)
    pub async fn run(&self) -> Result<RunReport> {
        info!(
            mode = %self.mode,
            occurrence_csv = %self.config.occurrence_csv.display(),
            manifest_dir = %self.config.manifest_dir.display(),
            concurrency = self.config.concurrency,
            "starting manifest generation"
        );

        let reader = RecordReader::open(&self.config)?;

        let progress = ProgressBar::new_spinner();
        progress.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {pos} records processed ({msg})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        stream::iter(reader)
            .take_while(|_| futures::future::ready(!self.cancel.is_cancelled()))
            .for_each_concurrent(RECORD_PIPELINE_WIDTH, |item| {
                let progress = progress.clone();
                async move {
                    self.process(item).await;
                    progress.inc(1);
                }
            })
            .await;

        progress.finish_and_clear();

        if self.cancel.is_cancelled() {
            warn!("run cancelled; summary reflects work completed so far");
        }

        let report = self.summary.snapshot();
        info!(
            records_read = report.records_read,
            records_rejected = report.records_rejected,
            images_resolved = report.images_resolved,
            images_failed = report.images_failed,
            manifests_written = report.manifests_written,
            manifests_skipped = report.manifests_skipped,
            write_errors = report.write_errors,
            "manifest generation finished"
        );

        Ok(report)
    }

    /// Take one record through its stages; never propagates an error
    async fn process(&self, item: std::result::Result<SpecimenRecord, RejectReason>) {
        self.summary.record_read();

        let record = match item {
            Ok(record) => record,
            Err(reason) => {
                warn!(
                    stage = "extract",
                    kind = reason.kind(),
                    "record rejected: {}",
                    reason
                );
                self.summary.record_rejected(&reason);
                return;
            },
        };

        if let Err(reason) = validate(&record, &self.config) {
            warn!(
                catalog_number = %record.catalog_number,
                stage = "validate",
                kind = reason.kind(),
                "record rejected: {}",
                reason
            );
            self.summary.record_rejected(&reason);
            return;
        }

        let descriptors = self
            .resolver
            .resolve(&record.catalog_number, &record.media_uris, &self.cancel)
            .await;
        self.summary.record_resolution(&descriptors);

        let manifest = match self.mapper.map(&record, &descriptors) {
            Ok(manifest) => manifest,
            Err(NoUsableImages) => {
                warn!(
                    catalog_number = %record.catalog_number,
                    stage = "map",
                    kind = "NoUsableImages",
                    "no image resolved; skipping manifest"
                );
                self.summary.record_no_usable_images();
                return;
            },
        };

        match self.writer.write(&record.catalog_number, &manifest) {
            Ok(WriteOutcome::Written) => {
                info!(catalog_number = %record.catalog_number, "manifest written");
                self.summary.manifest_written();
            },
            Ok(WriteOutcome::Skipped) => {
                self.summary.manifest_skipped();
            },
            Err(e) => {
                error!(
                    catalog_number = %record.catalog_number,
                    stage = "write",
                    kind = "WriteError",
                    "failed to persist manifest: {}",
                    e
                );
                self.summary.write_error();
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::ManifestSection;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_occurrences(dir: &TempDir, rows: &str) -> PathBuf {
        let path = dir.path().join("occurrence.tsv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"catalogNumber\tfamily\timage\n").unwrap();
        file.write_all(rows.as_bytes()).unwrap();
        path
    }

    fn test_config(dir: &TempDir, server_url: &str, csv: PathBuf) -> PipelineConfig {
        PipelineConfig {
            image_service_base_url: server_url.to_string(),
            manifest_base_url: "https://collections.example.org/manifests".to_string(),
            occurrence_csv: csv,
            separator: "\t".to_string(),
            manifest_dir: dir.path().join("manifests"),
            error_log_file: dir.path().join("errors.log"),
            default_language: "en".to_string(),
            metadata_keys: vec!["family".to_string()],
            media_columns: vec!["image".to_string()],
            manifest: ManifestSection {
                rights: "http://creativecommons.org/licenses/by/4.0/".to_string(),
            },
            concurrency: 4,
            probe_timeout_secs: 2,
        }
    }

    async fn mount_info(server: &MockServer, identifier: &str, width: u32, height: u32) {
        Mock::given(method("GET"))
            .and(path(format!("/{}/info.json", identifier)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": format!("https://img.example/iiif/{}", identifier),
                "width": width,
                "height": height
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_run_writes_manifest_per_record() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mount_info(&server, "a.jpg", 4000, 3000).await;

        let csv = write_occurrences(&dir, "INS-001\tFormicidae\thttps://img.example/a.jpg\n");
        let config = test_config(&dir, &server.uri(), csv);

        let pipeline = Pipeline::new(config.clone(), RunMode::Full).unwrap();
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.records_read, 1);
        assert_eq!(report.manifests_written, 1);
        assert!(config.manifest_dir.join("INS-001.json").exists());
    }

    #[tokio::test]
    async fn test_rejected_record_produces_no_file() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;

        let csv = write_occurrences(&dir, "\tFormicidae\thttps://img.example/a.jpg\n");
        let config = test_config(&dir, &server.uri(), csv);

        let pipeline = Pipeline::new(config.clone(), RunMode::Full).unwrap();
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.records_rejected, 1);
        assert_eq!(report.rejected_missing_catalog_number, 1);
        assert_eq!(report.manifests_written, 0);
        let written: Vec<_> = std::fs::read_dir(&config.manifest_dir).unwrap().collect();
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn test_failed_probe_isolated_from_other_records() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mount_info(&server, "good.jpg", 100, 100).await;
        Mock::given(method("GET"))
            .and(path("/bad.jpg/info.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let csv = write_occurrences(
            &dir,
            "INS-001\tFormicidae\thttps://img.example/bad.jpg\n\
             INS-002\tApidae\thttps://img.example/good.jpg\n",
        );
        let config = test_config(&dir, &server.uri(), csv);

        let pipeline = Pipeline::new(config.clone(), RunMode::Full).unwrap();
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.records_read, 2);
        assert_eq!(report.images_failed, 1);
        assert_eq!(report.images_resolved, 1);
        assert_eq!(report.manifests_written, 1);
        assert!(!config.manifest_dir.join("INS-001.json").exists());
        assert!(config.manifest_dir.join("INS-002.json").exists());
    }

    #[tokio::test]
    async fn test_cancelled_run_still_reports() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;

        let csv = write_occurrences(&dir, "INS-001\tFormicidae\thttps://img.example/a.jpg\n");
        let config = test_config(&dir, &server.uri(), csv);

        let pipeline = Pipeline::new(config, RunMode::Full).unwrap();
        pipeline.cancellation_token().cancel();

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.records_read, 0);
        assert_eq!(report.manifests_written, 0);
    }
}
