//! # rust_archiver
//!
//! Per-folder archival to S3: every directory under a base path that has
//! immediate regular files is packed into its own tar archive, optionally
//! compressed and encrypted, uploaded, and removed locally.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_archiver::cipher::PassThroughCipher;
//! use rust_archiver::cloud::S3Uploader;
//! use rust_archiver::codec::TarCompressor;
//! use rust_archiver::config::RunConfig;
//! use rust_archiver::pipeline::ArchivalRun;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = RunConfig::new(Path::new("/srv/data"), "cold-archive");
//! let uploader = S3Uploader::new("cold-archive", None, Some("default"), "DEEP_ARCHIVE", None)?;
//!
//! let report = ArchivalRun::new(&config, &TarCompressor::new(), &PassThroughCipher, &uploader).execute();
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: command-line arguments
//! - [`config`]: YAML file and resolved run configuration
//! - [`discovery`]: recursive folder discovery
//! - [`codec`]: tar/gzip/zstd archives
//! - [`cipher`]: gpg, AES-256 and pass-through encryption
//! - [`cloud`]: S3 uploads and remote key derivation
//! - [`pipeline`]: folder pipeline, run driver and dry run
//! - [`report`]: run report and dry-run counts
//! - [`notify`]: encrypted email notifications
//! - [`preflight`]: external tool checks
//! - [`security`]: secret handling and credential scrubbing

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Core data models shared by the pipeline stages
pub mod models;

/// Error taxonomy
pub mod error;

/// Folder discovery under the base directory
pub mod discovery;

/// Archive creation
pub mod codec;

/// Archive encryption
pub mod cipher;

/// Cloud storage integration (S3)
pub mod cloud;

/// Configuration management
pub mod config;

/// Archival pipeline and run drivers
pub mod pipeline;

/// Run reports
pub mod report;

/// Run notifications
pub mod notify;

/// External tool checks
pub mod preflight;

/// Utility functions for hashing
pub mod utils;

/// Application constants and configuration values
pub mod constants;

/// Secret handling and credential scrubbing
pub mod security;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;
