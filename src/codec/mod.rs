//! Compression of a folder's files into a single archive.
//!
//! The codec provider takes an explicit list of file paths (never a shell
//! glob, so names with whitespace or newlines are safe) and produces one
//! tar container, optionally wrapped in gzip or zstd.
//!
//! | Kind   | Suffix     |
//! |--------|------------|
//! | `none` | `.tar`     |
//! | `tz`   | `.tar.gz`  |
//! | `zstd` | `.tar.zst` |

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::constants::{GZIP_SUFFIX, TAR_SUFFIX, ZSTD_SUFFIX};

/// Native tar/gzip/zstd implementation
pub mod archive;

/// Multi-core gzip writer
pub mod parallel_gzip;

pub use self::archive::TarCompressor;

/// Compression applied to the tar container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    /// Plain tar container
    None,
    /// Gzip compressed tar
    #[value(name = "tz", alias = "gzip")]
    #[serde(rename = "tz", alias = "gzip")]
    Gzip,
    /// Zstandard compressed tar
    Zstd,
}

impl CompressionKind {
    /// File suffix produced by this kind, without the leading dot.
    pub fn suffix(&self) -> String {
        match self {
            CompressionKind::None => TAR_SUFFIX.to_string(),
            CompressionKind::Gzip => format!("{}.{}", TAR_SUFFIX, GZIP_SUFFIX),
            CompressionKind::Zstd => format!("{}.{}", TAR_SUFFIX, ZSTD_SUFFIX),
        }
    }

    /// Archive path for a destination base such as `/stage/a/a`.
    pub fn archive_path(&self, dest_base: &Path) -> PathBuf {
        let mut name = dest_base.as_os_str().to_os_string();
        name.push(".");
        name.push(self.suffix());
        PathBuf::from(name)
    }
}

impl Default for CompressionKind {
    fn default() -> Self {
        CompressionKind::Zstd
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionKind::None => write!(f, "none"),
            CompressionKind::Gzip => write!(f, "tz"),
            CompressionKind::Zstd => write!(f, "zstd"),
        }
    }
}

/// Produces one local archive from a set of input files.
pub trait Compressor: Send + Sync {
    /// Write `files` into a new archive at `dest_base` plus the kind's suffix.
    ///
    /// The destination must not exist yet.
    fn compress(&self, files: &[PathBuf], dest_base: &Path, kind: CompressionKind) -> Result<PathBuf>;
}
