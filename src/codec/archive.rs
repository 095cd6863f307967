use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};

use crate::codec::{CompressionKind, Compressor};
use crate::codec::parallel_gzip::ParallelGzEncoder;
use crate::constants::{COMPRESSION_CHUNK_SIZE, GZIP_CHUNK_SIZE, MAX_COMPRESSION_WORKERS, ZSTD_LEVEL};

/// Builds tar archives natively, wrapping them in gzip or zstd as requested.
///
/// Both compressors use up to `workers` threads.
#[derive(Debug, Clone)]
pub struct TarCompressor {
    workers: usize,
}

impl Default for TarCompressor {
    fn default() -> Self {
        TarCompressor {
            workers: std::cmp::min(num_cpus::get(), MAX_COMPRESSION_WORKERS),
        }
    }
}

impl TarCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of compression threads; `1` compresses on the calling thread.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

impl Compressor for TarCompressor {
    fn compress(&self, files: &[PathBuf], dest_base: &Path, kind: CompressionKind) -> Result<PathBuf> {
        let start = Instant::now();
        let archive_path = kind.archive_path(dest_base);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&archive_path)
            .context(format!("Failed to create archive {}", archive_path.display()))?;
        let writer = BufWriter::with_capacity(COMPRESSION_CHUNK_SIZE, file);

        let writer = match kind {
            CompressionKind::None => write_tar(writer, files)?,
            CompressionKind::Gzip if self.workers > 1 => {
                let encoder = ParallelGzEncoder::new(writer, Compression::default(), self.workers, GZIP_CHUNK_SIZE);
                write_tar(encoder, files)?
                    .finish()
                    .context("Failed to finish gzip stream")?
            }
            CompressionKind::Gzip => {
                let encoder = GzEncoder::new(writer, Compression::default());
                write_tar(encoder, files)?
                    .finish()
                    .context("Failed to finish gzip stream")?
            }
            CompressionKind::Zstd => {
                let mut encoder = zstd::stream::write::Encoder::new(writer, ZSTD_LEVEL)
                    .context("Failed to create zstd encoder")?;
                if self.workers > 1 {
                    encoder
                        .multithread(self.workers as u32)
                        .context("Failed to enable zstd worker threads")?;
                }
                write_tar(encoder, files)?
                    .finish()
                    .context("Failed to finish zstd stream")?
            }
        };

        let file = writer
            .into_inner()
            .map_err(|e| anyhow!("Failed to flush {}: {}", archive_path.display(), e.error()))?;
        file.sync_all()
            .context(format!("Failed to sync {}", archive_path.display()))?;

        let size = fs::metadata(&archive_path).map(|m| m.len()).unwrap_or(0);
        info!(
            "Created {} ({} files, {} bytes) in {:?}",
            archive_path.display(),
            files.len(),
            size,
            start.elapsed()
        );

        Ok(archive_path)
    }
}

/// Append every file under its bare file name and return the finished writer.
fn write_tar<W: Write>(writer: W, files: &[PathBuf]) -> Result<W> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);

    for path in files {
        let name = path
            .file_name()
            .ok_or_else(|| anyhow!("Invalid file path - no filename component: {}", path.display()))?;
        let mut file = File::open(path).context(format!("Failed to open {}", path.display()))?;
        builder
            .append_file(name, &mut file)
            .context(format!("Failed to add {} to archive", path.display()))?;
        debug!("Archived {}", path.display());
    }

    builder.into_inner().context("Failed to finalize tar archive")
}
