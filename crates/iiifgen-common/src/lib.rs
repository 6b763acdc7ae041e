//! iiifgen Common Library
//!
//! Shared utilities for the iiifgen workspace.
//!
//! # Overview
//!
//! This crate provides functionality used across all iiifgen workspace
//! members:
//!
//! - **Logging**: tracing-based logging with console and file targets
//! - **Checksums**: SHA-256 content fingerprints for change detection

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod logging;
