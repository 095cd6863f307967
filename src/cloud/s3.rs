use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use futures::future;
use log::{debug, info};
use rusoto_core::ByteStream;
use rusoto_s3::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, CompletedMultipartUpload, CompletedPart,
    CreateMultipartUploadRequest, PutObjectRequest, S3Client, UploadPartRequest, S3,
};
use tokio::fs::File as AsyncFile;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::runtime::Runtime;

use crate::cloud::client::create_s3_client;
use crate::cloud::Uploader;
use crate::constants::{LARGE_FILE_THRESHOLD, S3_UPLOAD_CHUNK_SIZE as UPLOAD_CHUNK_SIZE, SHA256_METADATA_KEY};
use crate::error::{ArchiveError, Stage};
use crate::utils::hash::calculate_sha256;

/// Blocking S3 uploader backed by its own tokio runtime.
///
/// Objects below [`LARGE_FILE_THRESHOLD`] go up in a single `PutObject`;
/// larger ones use a multipart upload that is aborted if any part fails.
/// Every object is written with the configured storage class and carries
/// its SHA-256 digest as user metadata.
pub struct S3Uploader {
    bucket: String,
    storage_class: String,
    timeout: Option<Duration>,
    client: Arc<S3Client>,
    runtime: Runtime,
}

impl S3Uploader {
    /// Create an uploader for `bucket`.
    ///
    /// # Arguments
    ///
    /// * `bucket` - S3 bucket name
    /// * `region_name` - Optional AWS region, defaults to the SDK default
    /// * `profile` - AWS profile used for credentials
    /// * `storage_class` - Storage class applied to every object, e.g. `DEEP_ARCHIVE`
    /// * `timeout` - Optional bound on a single upload
    pub fn new(
        bucket: &str,
        region_name: Option<&str>,
        profile: Option<&str>,
        storage_class: &str,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let runtime = Runtime::new().context("Failed to create Tokio runtime")?;
        let client = create_s3_client(region_name, profile)?;

        Ok(S3Uploader {
            bucket: bucket.to_string(),
            storage_class: storage_class.to_string(),
            timeout,
            client,
            runtime,
        })
    }

    async fn upload_async(&self, local: &Path, key: &str) -> Result<()> {
        let metadata = tokio::fs::metadata(local)
            .await
            .context(format!("Failed to get metadata for {}", local.display()))?;
        let file_size = metadata.len();

        let digest = calculate_sha256(local).context(format!("Failed to hash {}", local.display()))?;
        let mut user_metadata = HashMap::new();
        user_metadata.insert(SHA256_METADATA_KEY.to_string(), digest);

        debug!(
            "Starting upload of {} ({} bytes) to s3://{}/{} [{}]",
            local.display(),
            file_size,
            self.bucket,
            key,
            self.storage_class
        );
        let start_time = Instant::now();

        if file_size > LARGE_FILE_THRESHOLD {
            self.upload_large_file(local, key, file_size, user_metadata).await?;
        } else {
            self.upload_small_file(local, key, user_metadata).await?;
        }

        let elapsed = start_time.elapsed();
        let throughput = if elapsed.as_secs() > 0 {
            file_size / elapsed.as_secs()
        } else {
            file_size
        };
        info!(
            "Uploaded {} to s3://{}/{} in {:?} ({} KB/s)",
            local.display(),
            self.bucket,
            key,
            elapsed,
            throughput / 1024
        );
        Ok(())
    }

    /// Upload a small file using PutObject
    async fn upload_small_file(&self, local: &Path, key: &str, metadata: HashMap<String, String>) -> Result<()> {
        let contents = tokio::fs::read(local)
            .await
            .context(format!("Failed to read {} for S3 upload", local.display()))?;

        let request = PutObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            body: Some(ByteStream::from(contents)),
            storage_class: Some(self.storage_class.clone()),
            metadata: Some(metadata),
            ..Default::default()
        };

        self.client
            .put_object(request)
            .await
            .map_err(|e| anyhow!("PutObject failed for s3://{}/{}: {}", self.bucket, key, e))?;
        Ok(())
    }

    /// Upload a large file using multipart upload
    async fn upload_large_file(
        &self,
        local: &Path,
        key: &str,
        file_size: u64,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let create_result = self
            .client
            .create_multipart_upload(CreateMultipartUploadRequest {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                storage_class: Some(self.storage_class.clone()),
                metadata: Some(metadata),
                ..Default::default()
            })
            .await
            .context("Failed to initialize multipart upload")?;

        let upload_id = create_result
            .upload_id
            .ok_or_else(|| anyhow!("No upload ID returned from S3"))?;

        debug!("Started multipart upload with ID: {} for {}", upload_id, local.display());

        match self.upload_parts(local, key, file_size, &upload_id).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload(CompleteMultipartUploadRequest {
                        bucket: self.bucket.clone(),
                        key: key.to_string(),
                        upload_id: upload_id.clone(),
                        multipart_upload: Some(CompletedMultipartUpload { parts: Some(parts) }),
                        ..Default::default()
                    })
                    .await
                    .context("Failed to complete multipart upload")?;
                debug!("Completed multipart upload for {}", local.display());
                Ok(())
            }
            Err(e) => {
                let _ = self
                    .client
                    .abort_multipart_upload(AbortMultipartUploadRequest {
                        bucket: self.bucket.clone(),
                        key: key.to_string(),
                        upload_id,
                        ..Default::default()
                    })
                    .await;
                Err(e.context("Part upload failed, aborted multipart upload"))
            }
        }
    }

    async fn upload_parts(
        &self,
        local: &Path,
        key: &str,
        file_size: u64,
        upload_id: &str,
    ) -> Result<Vec<CompletedPart>> {
        let num_parts = part_count(file_size);
        debug!("Uploading {} parts for {}", num_parts, local.display());

        let mut completed_parts = Vec::with_capacity(num_parts as usize);
        let concurrency_limit = std::cmp::min(4, num_cpus::get()) as u64;

        for chunk_start in (1..=num_parts).step_by(concurrency_limit as usize) {
            let chunk_end = std::cmp::min(chunk_start + concurrency_limit - 1, num_parts);

            let chunk_futures = (chunk_start..=chunk_end).map(|part_number| {
                let start_byte = (part_number - 1) * UPLOAD_CHUNK_SIZE as u64;
                let end_byte = std::cmp::min(part_number * UPLOAD_CHUNK_SIZE as u64, file_size);
                self.upload_part(local, key, upload_id, part_number, start_byte, (end_byte - start_byte) as usize)
            });

            for result in future::join_all(chunk_futures).await {
                completed_parts.push(result?);
            }
        }

        completed_parts.sort_by_key(|part| part.part_number.unwrap_or_default());
        Ok(completed_parts)
    }

    async fn upload_part(
        &self,
        local: &Path,
        key: &str,
        upload_id: &str,
        part_number: u64,
        start_byte: u64,
        part_size: usize,
    ) -> Result<CompletedPart> {
        let mut file = AsyncFile::open(local).await?;
        file.seek(std::io::SeekFrom::Start(start_byte)).await?;
        let mut buffer = vec![0u8; part_size];
        file.read_exact(&mut buffer).await?;

        let output = self
            .client
            .upload_part(UploadPartRequest {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                upload_id: upload_id.to_string(),
                part_number: part_number as i64,
                body: Some(ByteStream::from(buffer)),
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow!("Failed to upload part {}: {}", part_number, e))?;

        let e_tag = output
            .e_tag
            .ok_or_else(|| anyhow!("No ETag in upload part response"))?;

        Ok(CompletedPart {
            e_tag: Some(e_tag),
            part_number: Some(part_number as i64),
        })
    }
}

impl Uploader for S3Uploader {
    fn upload(&self, local: &Path, key: &str) -> Result<()> {
        self.runtime.block_on(async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, self.upload_async(local, key)).await {
                    Ok(result) => result,
                    Err(_) => Err(ArchiveError::Timeout {
                        stage: Stage::Upload,
                        path: local.to_path_buf(),
                        after: limit,
                    }
                    .into()),
                },
                None => self.upload_async(local, key).await,
            }
        })
    }
}

/// Number of multipart parts needed for `file_size` bytes.
fn part_count(file_size: u64) -> u64 {
    (file_size + UPLOAD_CHUNK_SIZE as u64 - 1) / UPLOAD_CHUNK_SIZE as u64
}
