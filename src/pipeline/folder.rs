use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;

use crate::cipher::Cipher;
use crate::cloud::{RemoteTarget, Uploader};
use crate::codec::{CompressionKind, Compressor};
use crate::error::{ArchiveError, Stage};
use crate::models::{ArchiveArtifact, ArtifactState, FolderOutcome, FolderTask};

/// Runs one folder through compress, encrypt, upload and cleanup.
///
/// Stages are strictly sequential. A failed stage returns immediately and
/// leaves whatever artifact exists on disk for inspection.
pub struct FolderPipeline<'a> {
    compressor: &'a dyn Compressor,
    compression: CompressionKind,
    cipher: &'a dyn Cipher,
    uploader: &'a dyn Uploader,
    remote: &'a RemoteTarget,
    staging_root: PathBuf,
    created_dirs: Mutex<Vec<PathBuf>>,
}

impl<'a> FolderPipeline<'a> {
    pub fn new(
        compressor: &'a dyn Compressor,
        compression: CompressionKind,
        cipher: &'a dyn Cipher,
        uploader: &'a dyn Uploader,
        remote: &'a RemoteTarget,
        staging_root: &Path,
    ) -> Self {
        FolderPipeline {
            compressor,
            compression,
            cipher,
            uploader,
            remote,
            staging_root: staging_root.to_path_buf(),
            created_dirs: Mutex::new(Vec::new()),
        }
    }

    /// Staging directory for a folder, mirroring its place under the base directory.
    pub fn staging_dir(&self, task: &FolderTask) -> PathBuf {
        self.staging_root.join(&task.relative)
    }

    /// Staging directories this pipeline created, deepest first.
    pub fn created_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.created_dirs.lock().unwrap_or_else(|e| e.into_inner()).clone();
        dirs.sort_by(|a, b| b.components().count().cmp(&a.components().count()).then_with(|| a.cmp(b)));
        dirs.dedup();
        dirs
    }

    pub fn process(&self, task: &FolderTask) -> Result<FolderOutcome, ArchiveError> {
        if task.is_empty() {
            return Ok(FolderOutcome::Skipped);
        }

        let stage_dir = self.staging_dir(task);
        self.create_stage_dir(&stage_dir)
            .map_err(|e| ArchiveError::stage(Stage::Staging, &stage_dir, e.into()))?;

        let dest_base = stage_dir.join(task.archive_stem());
        let mut artifact = ArchiveArtifact::staged(self.compression.archive_path(&dest_base));
        debug!("{}: {} -> {}", task.display_relative(), artifact.state, artifact.path.display());

        let archive = self
            .compressor
            .compress(&task.files, &dest_base, self.compression)
            .map_err(|e| into_stage_error(Stage::Compress, &artifact.path, e))?;
        artifact.advance(ArtifactState::Compressed, Some(archive));

        let encrypted = self
            .cipher
            .encrypt(&artifact.path)
            .map_err(|e| into_stage_error(Stage::Encrypt, &artifact.path, e))?;
        if !self.cipher.is_pass_through() {
            artifact.advance(ArtifactState::Encrypted, Some(encrypted));
        }

        let bytes = fs::metadata(&artifact.path)
            .map_err(|e| ArchiveError::stage(Stage::Upload, &artifact.path, e.into()))?
            .len();
        let key = self.remote.object_key(&task.relative, &artifact.file_name());
        self.uploader
            .upload(&artifact.path, &key)
            .map_err(|e| into_stage_error(Stage::Upload, &artifact.path, e))?;
        artifact.advance(ArtifactState::Uploaded, None);

        fs::remove_file(&artifact.path).map_err(|e| ArchiveError::stage(Stage::Cleanup, &artifact.path, e.into()))?;
        artifact.advance(ArtifactState::Removed, None);

        Ok(FolderOutcome::Archived {
            remote_uri: self.remote.uri(&key),
            file_count: task.files.len(),
            bytes,
        })
    }

    /// Create `dir` and remember which of its ancestors did not exist yet.
    fn create_stage_dir(&self, dir: &Path) -> std::io::Result<()> {
        let mut created = self.created_dirs.lock().unwrap_or_else(|e| e.into_inner());
        let missing: Vec<PathBuf> = dir
            .ancestors()
            .take_while(|p| !p.exists() && p.starts_with(&self.staging_root))
            .map(Path::to_path_buf)
            .collect();
        fs::create_dir_all(dir)?;
        created.extend(missing);
        Ok(())
    }
}

/// Keep typed errors raised by a provider, wrap everything else as a
/// failure of `stage` on `path`.
fn into_stage_error(stage: Stage, path: &Path, err: anyhow::Error) -> ArchiveError {
    match err.downcast::<ArchiveError>() {
        Ok(typed @ ArchiveError::Configuration(_)) | Ok(typed @ ArchiveError::Timeout { .. }) => typed,
        Ok(other) => ArchiveError::stage(stage, path, other.into()),
        Err(err) => ArchiveError::stage(stage, path, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{cipher_for, EncryptionKind, PassThroughCipher};
    use crate::codec::TarCompressor;
    use crate::test_utils::{create_sample_tree, files_under, MemoryUploader};
    use crate::cloud::MockUploader;
    use crate::discovery::list_immediate_files;
    use anyhow::anyhow;
    use std::time::Duration;
    use tempfile::TempDir;

    fn task(base: &Path, relative: &str) -> FolderTask {
        let path = base.join(relative);
        FolderTask {
            files: list_immediate_files(&path).unwrap(),
            path,
            relative: PathBuf::from(relative),
        }
    }

    #[test]
    fn test_happy_path_uploads_and_cleans() {
        let tree = create_sample_tree().unwrap();
        let staging = TempDir::new().unwrap();
        let uploader = MemoryUploader::new();
        let remote = RemoteTarget::new("bucket", Some("nightly"));
        let compressor = TarCompressor::new();
        let pipeline = FolderPipeline::new(
            &compressor,
            CompressionKind::Zstd,
            &PassThroughCipher,
            &uploader,
            &remote,
            staging.path(),
        );

        let outcome = pipeline.process(&task(tree.path(), "a")).unwrap();

        match outcome {
            FolderOutcome::Archived { remote_uri, file_count, bytes } => {
                assert_eq!(remote_uri, "s3://bucket/nightly/a/a.tar.zst");
                assert_eq!(file_count, 2);
                assert!(bytes > 0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(uploader.keys(), vec!["nightly/a/a.tar.zst"]);
        assert!(files_under(staging.path()).is_empty());
    }

    #[test]
    fn test_empty_folder_is_skipped_without_output() {
        let tree = create_sample_tree().unwrap();
        let staging = TempDir::new().unwrap();
        let mut uploader = MockUploader::new();
        uploader.expect_upload().times(0);
        let remote = RemoteTarget::new("bucket", None);
        let compressor = TarCompressor::new();
        let pipeline = FolderPipeline::new(
            &compressor,
            CompressionKind::None,
            &PassThroughCipher,
            &uploader,
            &remote,
            staging.path(),
        );

        let outcome = pipeline.process(&task(tree.path(), "b")).unwrap();

        assert_eq!(outcome, FolderOutcome::Skipped);
        assert!(!staging.path().join("b").exists());
    }

    #[test]
    fn test_upload_failure_keeps_artifact() {
        let tree = create_sample_tree().unwrap();
        let staging = TempDir::new().unwrap();
        let mut uploader = MockUploader::new();
        uploader
            .expect_upload()
            .times(1)
            .returning(|_, _| Err(anyhow!("connection reset")));
        let remote = RemoteTarget::new("bucket", None);
        let compressor = TarCompressor::new();
        let pipeline = FolderPipeline::new(
            &compressor,
            CompressionKind::Gzip,
            &PassThroughCipher,
            &uploader,
            &remote,
            staging.path(),
        );

        let err = pipeline.process(&task(tree.path(), "c")).unwrap_err();

        assert_eq!(err.failed_stage(), Some(Stage::Upload));
        assert!(err.to_string().contains("connection reset"));
        assert!(staging.path().join("c/c.tar.gz").exists());
    }

    #[test]
    fn test_upload_timeout_is_kept_typed() {
        let tree = create_sample_tree().unwrap();
        let staging = TempDir::new().unwrap();
        let mut uploader = MockUploader::new();
        uploader.expect_upload().returning(|local, _| {
            Err(ArchiveError::Timeout {
                stage: Stage::Upload,
                path: local.to_path_buf(),
                after: Duration::from_secs(5),
            }
            .into())
        });
        let remote = RemoteTarget::new("bucket", None);
        let compressor = TarCompressor::new();
        let pipeline = FolderPipeline::new(
            &compressor,
            CompressionKind::None,
            &PassThroughCipher,
            &uploader,
            &remote,
            staging.path(),
        );

        let err = pipeline.process(&task(tree.path(), "c")).unwrap_err();
        assert!(matches!(err, ArchiveError::Timeout { .. }));
    }

    #[test]
    fn test_missing_passphrase_surfaces_as_configuration() {
        let tree = create_sample_tree().unwrap();
        let staging = TempDir::new().unwrap();
        let mut uploader = MockUploader::new();
        uploader.expect_upload().times(0);
        let remote = RemoteTarget::new("bucket", None);
        let compressor = TarCompressor::new();
        let cipher = cipher_for(EncryptionKind::Aes256, None, None);
        let pipeline = FolderPipeline::new(
            &compressor,
            CompressionKind::None,
            cipher.as_ref(),
            &uploader,
            &remote,
            staging.path(),
        );

        let err = pipeline.process(&task(tree.path(), "a")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_aes_artifact_name() {
        let tree = create_sample_tree().unwrap();
        let staging = TempDir::new().unwrap();
        let uploader = MemoryUploader::new();
        let remote = RemoteTarget::new("bucket", None);
        let compressor = TarCompressor::new();
        let cipher = cipher_for(EncryptionKind::Aes256, None, Some("passphrase"));
        let pipeline = FolderPipeline::new(
            &compressor,
            CompressionKind::Zstd,
            cipher.as_ref(),
            &uploader,
            &remote,
            staging.path(),
        );

        pipeline.process(&task(tree.path(), "a/nested")).unwrap();
        assert_eq!(uploader.keys(), vec!["a/nested/nested.tar.zst.enc"]);
        assert!(files_under(staging.path()).is_empty());
    }

    #[test]
    fn test_base_directory_task_uses_base_name() {
        let base = TempDir::new().unwrap();
        fs::write(base.path().join("top.txt"), b"top").unwrap();
        let staging = TempDir::new().unwrap();
        let uploader = MemoryUploader::new();
        let remote = RemoteTarget::new("bucket", None);
        let compressor = TarCompressor::new();
        let pipeline = FolderPipeline::new(
            &compressor,
            CompressionKind::None,
            &PassThroughCipher,
            &uploader,
            &remote,
            staging.path(),
        );

        let root = FolderTask {
            path: base.path().to_path_buf(),
            relative: PathBuf::new(),
            files: list_immediate_files(base.path()).unwrap(),
        };
        pipeline.process(&root).unwrap();

        let expected = format!("{}.tar", root.archive_stem());
        assert_eq!(uploader.keys(), vec![expected]);
    }

    #[test]
    fn test_created_dirs_excludes_existing() {
        let tree = create_sample_tree().unwrap();
        let staging = TempDir::new().unwrap();
        fs::create_dir(staging.path().join("a")).unwrap();
        let uploader = MemoryUploader::new();
        let remote = RemoteTarget::new("bucket", None);
        let compressor = TarCompressor::new();
        let pipeline = FolderPipeline::new(
            &compressor,
            CompressionKind::None,
            &PassThroughCipher,
            &uploader,
            &remote,
            staging.path(),
        );

        pipeline.process(&task(tree.path(), "a")).unwrap();
        pipeline.process(&task(tree.path(), "a/nested")).unwrap();
        pipeline.process(&task(tree.path(), "c")).unwrap();

        assert_eq!(
            pipeline.created_dirs(),
            vec![staging.path().join("a/nested"), staging.path().join("c")]
        );
    }
}
