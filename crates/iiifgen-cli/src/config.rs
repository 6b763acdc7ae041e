//! Run configuration (YAML)
//!
//! The pipeline consumes a single YAML configuration file describing
//! the input CSV, the image service, the output directory, and the
//! field mappings. Configuration problems are the only fatal errors in
//! the system, so everything is validated up front.

use crate::error::{GenError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default number of concurrent dimension probes.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default per-probe timeout in seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Default language tag for manifest labels and metadata.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Execution mode for a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Regenerate every manifest unconditionally
    #[default]
    Full,
    /// Skip manifests whose content is unchanged since the last run
    Partial,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Full => write!(f, "full"),
            RunMode::Partial => write!(f, "partial"),
        }
    }
}

/// Manifest-level settings copied verbatim into every output manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestSection {
    /// Rights URI (e.g., a Creative Commons license URL)
    pub rights: String,
}

/// Pipeline run configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Base URL of the IIIF Image Service queried for dimensions
    pub image_service_base_url: String,

    /// Base URL under which generated manifests are published
    pub manifest_base_url: String,

    /// Path to the occurrence CSV export
    pub occurrence_csv: PathBuf,

    /// Field separator for the occurrence CSV (single character)
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Directory receiving one JSON manifest per specimen
    pub manifest_dir: PathBuf,

    /// File receiving rejection and failure log events
    pub error_log_file: PathBuf,

    /// Language tag for labels and metadata values
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Darwin Core keys mapped into manifest metadata, in output order
    pub metadata_keys: Vec<String>,

    /// CSV columns holding media URIs, in canvas order
    #[serde(default = "default_media_columns")]
    pub media_columns: Vec<String>,

    /// Manifest-level settings
    pub manifest: ManifestSection,

    /// Concurrent probe window
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_separator() -> String {
    "\t".to_string()
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_media_columns() -> Vec<String> {
    vec!["image".to_string()]
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

impl PipelineConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GenError::FileNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)
            .map_err(|e| GenError::config(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Called by [`PipelineConfig::load`]; any failure here aborts the
    /// run before a single record is read.
    pub fn validate(&self) -> Result<()> {
        if self.image_service_base_url.is_empty() {
            return Err(GenError::config("image_service_base_url cannot be empty"));
        }

        if self.manifest_base_url.is_empty() {
            return Err(GenError::config("manifest_base_url cannot be empty"));
        }

        if self.metadata_keys.is_empty() {
            return Err(GenError::config("metadata_keys cannot be empty"));
        }

        if self.media_columns.is_empty() {
            return Err(GenError::config("media_columns cannot be empty"));
        }

        if self.manifest.rights.is_empty() {
            return Err(GenError::config("manifest.rights cannot be empty"));
        }

        if self.concurrency == 0 {
            return Err(GenError::config("concurrency must be at least 1"));
        }

        self.delimiter()?;

        Ok(())
    }

    /// The CSV delimiter as a single byte
    pub fn delimiter(&self) -> Result<u8> {
        let bytes = self.separator.as_bytes();
        if bytes.len() != 1 {
            return Err(GenError::config(format!(
                "separator must be a single character, got '{}'",
                self.separator.escape_default()
            )));
        }
        Ok(bytes[0])
    }

    /// Base URL with any trailing slash removed
    pub fn image_service_base(&self) -> &str {
        self.image_service_base_url.trim_end_matches('/')
    }

    /// Manifest base URL with any trailing slash removed
    pub fn manifest_base(&self) -> &str {
        self.manifest_base_url.trim_end_matches('/')
    }
}
