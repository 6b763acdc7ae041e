//! iiifgen Library
//!
//! Converts tabular specimen-collection exports (Darwin Core fields
//! plus media URIs) into IIIF Presentation API v3 manifests, one
//! manifest per specimen, identified by catalog number.
//!
//! # Pipeline
//!
//! - **Validation**: reject malformed or incomplete occurrence rows
//! - **Resolution**: probe the IIIF Image Service concurrently for
//!   pixel dimensions, with bounded parallelism and retries
//! - **Mapping**: build the in-memory IIIF v3 manifest
//! - **Writing**: persist deterministically, skipping unchanged
//!   manifests in partial mode
//! - **Summary**: exact per-run counts of everything above

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod iiif;
pub mod pipeline;
pub mod record;
pub mod resolver;
pub mod summary;
pub mod writer;

// Re-export commonly used types
pub use config::{PipelineConfig, RunMode};
pub use error::{GenError, Result};
pub use pipeline::Pipeline;
pub use summary::RunReport;

use clap::Parser;
use std::path::PathBuf;

/// iiifgen - IIIF manifest generation from specimen occurrence exports
#[derive(Parser, Debug)]
#[command(name = "iiifgen")]
#[command(author, version, about = "Generate IIIF Presentation v3 manifests from specimen data")]
pub struct Cli {
    /// Path to the YAML configuration file
    pub config: PathBuf,

    /// Generation mode: 'full' regenerates everything, 'partial'
    /// skips manifests unchanged since the previous run
    #[arg(long, value_enum, default_value_t = RunMode::Full)]
    pub mode: RunMode,

    /// Override the configured number of concurrent dimension probes
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}
