//! Error types for the iiifgen pipeline
//!
//! Only configuration-level failures abort a run. Per-record and
//! per-image problems are modeled as values ([`crate::record::RejectReason`],
//! [`crate::resolver::ProbeError`]) that flow into the run summary and the
//! error log instead of propagating as errors.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, GenError>;

/// Error type for pipeline operations
///
/// Fatal variants are checked before any record is processed; the
/// remaining variants are reported per specimen and never abort the
/// batch.
#[derive(Error, Debug)]
pub enum GenError {
    /// Configuration is missing or invalid (fatal)
    #[error("Configuration error: {0}. Check the YAML configuration file.")]
    Config(String),

    /// Occurrence CSV could not be opened or parsed (fatal)
    #[error("CSV error: {0}. Verify the occurrence file path and the configured separator.")]
    Csv(#[from] csv::Error),

    /// Required file is missing (fatal)
    #[error("File not found: '{0}'. Verify the path exists and you have read permissions.")]
    FileNotFound(String),

    /// Manifest write failed (per specimen)
    #[error("Failed to write manifest for '{catalog_number}': {source}. Check permissions and disk space on the manifest directory.")]
    Write {
        catalog_number: String,
        #[source]
        source: std::io::Error,
    },

    /// Manifest could not be serialized (per specimen; treated as a defect)
    #[error("Failed to serialize manifest for '{catalog_number}': {source}")]
    Serialize {
        catalog_number: String,
        #[source]
        source: serde_json::Error,
    },

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// YAML parsing failed
    #[error("Failed to parse YAML: {0}. Check the file syntax at the indicated line/column.")]
    YamlParse(#[from] serde_yaml::Error),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GenError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a per-specimen write error
    pub fn write(catalog_number: impl Into<String>, source: std::io::Error) -> Self {
        Self::Write {
            catalog_number: catalog_number.into(),
            source,
        }
    }

    /// Create a per-specimen serialization error
    pub fn serialize(catalog_number: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialize {
            catalog_number: catalog_number.into(),
            source,
        }
    }

    /// Whether this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GenError::Config(_)
                | GenError::Csv(_)
                | GenError::FileNotFound(_)
                | GenError::YamlParse(_)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_fatal() {
        assert!(GenError::config("missing manifest_dir").is_fatal());
        assert!(GenError::FileNotFound("occurrence.tsv".to_string()).is_fatal());
    }

    #[test]
    fn test_write_errors_are_not_fatal() {
        let err = GenError::write(
            "INS-001",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("INS-001"));
    }
}
