//! Specimen records: CSV extraction and validation
//!
//! One [`SpecimenRecord`] per occurrence row. The validator filters
//! malformed or incomplete rows before any network work happens;
//! malformed records are data, not faults, so validation never errors
//! the run.

use crate::config::PipelineConfig;
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Column holding the specimen's catalog number
pub const CATALOG_NUMBER_COLUMN: &str = "catalogNumber";

/// One row of the occurrence export
#[derive(Debug, Clone, PartialEq)]
pub struct SpecimenRecord {
    /// Unique specimen identifier; manifest identity
    pub catalog_number: String,

    /// Darwin Core field name to value; values may be empty
    pub fields: BTreeMap<String, String>,

    /// Raw media URIs in source column order
    pub media_uris: Vec<String>,
}

impl SpecimenRecord {
    /// Look up a field value, treating blank values as absent
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Why a record was rejected before resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    /// The catalog number column is absent or blank
    MissingCatalogNumber,
    /// A configured metadata column is absent from the row
    MissingRequiredField(String),
    /// No media URI column carries a value
    NoMediaUri,
    /// The CSV row itself could not be decoded
    UnreadableRow(String),
}

impl RejectReason {
    /// Short kind tag for structured log events
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::MissingCatalogNumber => "MissingCatalogNumber",
            RejectReason::MissingRequiredField(_) => "MissingRequiredField",
            RejectReason::NoMediaUri => "NoMediaUri",
            RejectReason::UnreadableRow(_) => "UnreadableRow",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::MissingCatalogNumber => write!(f, "missing catalog number"),
            RejectReason::MissingRequiredField(name) => {
                write!(f, "missing required field '{}'", name)
            },
            RejectReason::NoMediaUri => write!(f, "no media URI"),
            RejectReason::UnreadableRow(msg) => write!(f, "unreadable row: {}", msg),
        }
    }
}

/// Validate a record against the configured required fields
///
/// Required fields are the configured `metadata_keys` (the column must
/// be present; its value may be empty) plus a non-empty catalog number
/// and at least one media URI. Pure function of (record, configuration).
pub fn validate(record: &SpecimenRecord, config: &PipelineConfig) -> std::result::Result<(), RejectReason> {
    if record.catalog_number.trim().is_empty() {
        return Err(RejectReason::MissingCatalogNumber);
    }

    for key in &config.metadata_keys {
        if !record.fields.contains_key(key) {
            return Err(RejectReason::MissingRequiredField(key.clone()));
        }
    }

    if record.media_uris.is_empty() {
        return Err(RejectReason::NoMediaUri);
    }

    Ok(())
}

/// Streaming reader over the occurrence CSV
pub struct RecordReader {
    reader: csv::Reader<std::fs::File>,
    headers: Vec<String>,
    media_columns: Vec<String>,
}

impl RecordReader {
    /// Open the occurrence CSV configured for this run
    ///
    /// Failure here is fatal: an unreadable input file means the run
    /// cannot start.
    pub fn open(config: &PipelineConfig) -> Result<Self> {
        Self::open_path(&config.occurrence_csv, config.delimiter()?, &config.media_columns)
    }

    fn open_path(path: &Path, delimiter: u8, media_columns: &[String]) -> Result<Self> {
        if !path.exists() {
            return Err(crate::error::GenError::FileNotFound(
                path.display().to_string(),
            ));
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)?;

        let headers = reader.headers()?.iter().map(|h| h.to_string()).collect();

        Ok(Self {
            reader,
            headers,
            media_columns: media_columns.to_vec(),
        })
    }

    /// Header names in file order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn record_from_row(&self, row: &csv::StringRecord) -> SpecimenRecord {
        let mut fields = BTreeMap::new();
        for (i, header) in self.headers.iter().enumerate() {
            let value = row.get(i).unwrap_or_default();
            fields.insert(header.clone(), value.to_string());
        }

        let catalog_number = fields
            .get(CATALOG_NUMBER_COLUMN)
            .map(|v| v.trim().to_string())
            .unwrap_or_default();

        // Media URIs keep configured column order so canvases stay
        // deterministic
        let media_uris = self
            .media_columns
            .iter()
            .filter_map(|col| fields.get(col))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
            .collect();

        SpecimenRecord {
            catalog_number,
            fields,
            media_uris,
        }
    }
}

impl Iterator for RecordReader {
    type Item = std::result::Result<SpecimenRecord, RejectReason>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut row = csv::StringRecord::new();
        match self.reader.read_record(&mut row) {
            Ok(true) => Some(Ok(self.record_from_row(&row))),
            Ok(false) => None,
            Err(e) => Some(Err(RejectReason::UnreadableRow(e.to_string()))),
        }
    }
}
