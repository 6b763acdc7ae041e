//! Manifest persistence
//!
//! Serializes manifests deterministically to
//! `{manifest_dir}/{catalogNumber}.json`. In partial mode the writer
//! fingerprints the serialized bytes and skips files whose on-disk
//! content is unchanged, which is what makes re-running large
//! collections cheap after small upstream edits.

use crate::config::{PipelineConfig, RunMode};
use crate::error::{GenError, Result};
use crate::iiif::Manifest;
use iiifgen_common::checksum;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What happened to one manifest on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// File created or overwritten
    Written,
    /// Partial mode found identical content already on disk
    Skipped,
}

/// Writes manifests to the configured output directory
pub struct ManifestWriter {
    manifest_dir: PathBuf,
    mode: RunMode,
}

impl ManifestWriter {
    /// Create the writer, ensuring the output directory exists
    ///
    /// An uncreatable manifest directory is a configuration error and
    /// fatal to the run.
    pub fn new(config: &PipelineConfig, mode: RunMode) -> Result<Self> {
        std::fs::create_dir_all(&config.manifest_dir).map_err(|e| {
            GenError::config(format!(
                "Cannot create manifest directory '{}': {}",
                config.manifest_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            manifest_dir: config.manifest_dir.clone(),
            mode,
        })
    }

    /// Output path for a specimen's manifest
    pub fn manifest_path(&self, catalog_number: &str) -> PathBuf {
        self.manifest_dir.join(format!("{}.json", catalog_number))
    }

    /// Serialize a manifest to its canonical byte form
    ///
    /// Pretty-printed JSON with struct-defined key order and a
    /// trailing newline. This is the byte form that gets fingerprinted
    /// and written, so it must stay stable across runs.
    pub fn serialize(catalog_number: &str, manifest: &Manifest) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(manifest)
            .map_err(|e| GenError::serialize(catalog_number, e))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Persist one manifest, honoring the run mode
    pub fn write(&self, catalog_number: &str, manifest: &Manifest) -> Result<WriteOutcome> {
        let bytes = Self::serialize(catalog_number, manifest)?;
        let path = self.manifest_path(catalog_number);

        if self.mode == RunMode::Partial && Self::unchanged(&path, &bytes) {
            debug!(catalog_number, path = %path.display(), "manifest unchanged, skipping write");
            return Ok(WriteOutcome::Skipped);
        }

        std::fs::write(&path, &bytes).map_err(|e| GenError::write(catalog_number, e))?;
        debug!(catalog_number, path = %path.display(), "manifest written");
        Ok(WriteOutcome::Written)
    }

    /// Whether the file on disk already holds exactly these bytes
    fn unchanged(path: &Path, bytes: &[u8]) -> bool {
        match checksum::fingerprint_file(path) {
            Ok(existing) => existing == checksum::fingerprint(bytes),
            // Missing or unreadable file: treat as changed and write
            Err(_) => false,
        }
    }
}
