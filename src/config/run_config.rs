use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

use crate::cipher::EncryptionKind;
use crate::cli::Args;
use crate::cloud::RemoteTarget;
use crate::codec::CompressionKind;
use crate::config::FileConfig;
use crate::constants::{DEFAULT_AWS_PROFILE, DEFAULT_STAGING_PREFIX, DEFAULT_STORAGE_CLASS, STAGING_TIMESTAMP_FORMAT};
use crate::error::ArchiveError;
use crate::notify::NotifyOn;
use crate::security::Secret;

/// What the run does after a folder fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failed folder; nothing after it is started
    #[default]
    Abort,
    /// Record the failure and carry on with the remaining folders
    Continue,
}

/// Who gets the encrypted run report and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub recipient: String,
    pub gpg_key: String,
    pub notify_on: NotifyOn,
}

/// Immutable configuration for one run, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_dir: PathBuf,
    pub staging_root: PathBuf,
    pub compression: CompressionKind,
    pub encryption: EncryptionKind,
    pub gpg_key: Option<String>,
    pub aes_passphrase: Option<Secret>,
    pub remote: RemoteTarget,
    pub aws_profile: String,
    pub region: Option<String>,
    pub storage_class: String,
    pub dry_run: bool,
    pub notification: Option<NotificationSettings>,
    pub jobs: usize,
    pub failure_policy: FailurePolicy,
    pub upload_timeout: Option<Duration>,
    pub preflight: bool,
}

impl RunConfig {
    /// Configuration with defaults for everything but the base directory and bucket.
    pub fn new(base_dir: &Path, bucket: &str) -> Self {
        RunConfig {
            base_dir: base_dir.to_path_buf(),
            staging_root: default_staging_root(),
            compression: CompressionKind::default(),
            encryption: EncryptionKind::default(),
            gpg_key: None,
            aes_passphrase: None,
            remote: RemoteTarget::new(bucket, None),
            aws_profile: DEFAULT_AWS_PROFILE.to_string(),
            region: None,
            storage_class: DEFAULT_STORAGE_CLASS.to_string(),
            dry_run: false,
            notification: None,
            jobs: 1,
            failure_policy: FailurePolicy::Abort,
            upload_timeout: None,
            preflight: true,
        }
    }

    /// Merge command-line arguments over the optional YAML file and validate.
    ///
    /// Nothing is written to disk here; any problem is a
    /// [`ArchiveError::Configuration`].
    pub fn resolve(args: &Args) -> Result<Self, ArchiveError> {
        let file = match &args.config {
            Some(path) => FileConfig::from_yaml_file(path).map_err(|e| ArchiveError::config(format!("{:#}", e)))?,
            None => FileConfig::default(),
        };

        let base_dir = args
            .base_dir
            .clone()
            .or(file.base_dir)
            .ok_or_else(|| ArchiveError::config("base directory (-b) is required"))?;
        let bucket = args
            .s3_bucket
            .clone()
            .or(file.s3_bucket)
            .ok_or_else(|| ArchiveError::config("S3 bucket (-s) is required"))?;
        let folder = args.s3_folder.clone().or(file.s3_folder);

        let recipient = args.email_recipient.clone().or(file.email_recipient);
        let email_key = args.email_gpg_key.clone().or(file.email_gpg_key);
        let notify_on = args.notify_on.or(file.notify_on).unwrap_or_default();
        let notification = match (non_empty(recipient), non_empty(email_key)) {
            (Some(recipient), Some(gpg_key)) => Some(NotificationSettings {
                recipient,
                gpg_key,
                notify_on,
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ArchiveError::config(
                    "an email recipient (-r) requires a key (-g) to encrypt the notification",
                ))
            }
            (None, Some(_)) => {
                return Err(ArchiveError::config("a notification key (-g) requires an email recipient (-r)"))
            }
        };

        let keep_going = args.keep_going || file.keep_going.unwrap_or(false);

        let config = RunConfig {
            base_dir,
            staging_root: args.output_dir.clone().or(file.output_dir).unwrap_or_else(default_staging_root),
            compression: args.compression.or(file.compression).unwrap_or_default(),
            encryption: args.encryption.or(file.encryption).unwrap_or_default(),
            gpg_key: non_empty(args.gpg_key.clone().or(file.gpg_key)),
            aes_passphrase: non_empty(args.aes_passphrase.clone().or(file.aes_passphrase)).map(Secret::new),
            remote: RemoteTarget::new(&bucket, folder.as_deref()),
            aws_profile: args
                .aws_profile
                .clone()
                .or(file.aws_profile)
                .unwrap_or_else(|| DEFAULT_AWS_PROFILE.to_string()),
            region: args.region.clone().or(file.region),
            storage_class: args
                .storage_class
                .clone()
                .or(file.storage_class)
                .unwrap_or_else(|| DEFAULT_STORAGE_CLASS.to_string()),
            dry_run: args.dry_run,
            notification,
            jobs: args.jobs.or(file.jobs).unwrap_or(1),
            failure_policy: if keep_going {
                FailurePolicy::Continue
            } else {
                FailurePolicy::Abort
            },
            upload_timeout: args.upload_timeout.or(file.upload_timeout_secs).map(Duration::from_secs),
            preflight: !args.no_preflight,
        };

        config.validate()?;
        debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }

    /// Check every invariant the run relies on.
    pub fn validate(&self) -> Result<(), ArchiveError> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(ArchiveError::config("base directory (-b) is required"));
        }
        if !self.base_dir.is_dir() {
            return Err(ArchiveError::config(format!(
                "base directory {} does not exist or is not a directory",
                self.base_dir.display()
            )));
        }
        fs::read_dir(&self.base_dir).map_err(|e| {
            ArchiveError::config(format!("base directory {} is not readable: {}", self.base_dir.display(), e))
        })?;

        if let (Some(base), Some(staging)) = (absolute(&self.base_dir), absolute(&self.staging_root)) {
            if base.starts_with(&staging) {
                return Err(ArchiveError::config(format!(
                    "staging root {} must not be the base directory or one of its parents",
                    self.staging_root.display()
                )));
            }
        }

        if self.remote.bucket.is_empty() {
            return Err(ArchiveError::config("S3 bucket (-s) is required"));
        }

        match self.encryption {
            EncryptionKind::Gpg if self.gpg_key.as_deref().unwrap_or("").is_empty() => {
                return Err(ArchiveError::config("gpg encryption requires a key identifier (-k)"));
            }
            EncryptionKind::Aes256 if self.aes_passphrase.as_ref().map_or(true, |p| p.is_empty()) => {
                return Err(ArchiveError::config("aes256 encryption requires a passphrase (-p)"));
            }
            _ => {}
        }

        if self.jobs == 0 {
            return Err(ArchiveError::config("--jobs must be at least 1"));
        }
        if self.upload_timeout == Some(Duration::ZERO) {
            return Err(ArchiveError::config("--upload-timeout must be greater than zero"));
        }

        Ok(())
    }

    /// Staging root is under the base directory.
    pub fn stages_inside_base(&self) -> bool {
        match (fs::canonicalize(&self.base_dir), absolute(&self.staging_root)) {
            (Ok(base), Some(staging)) => staging.starts_with(base),
            _ => false,
        }
    }
}

fn default_staging_root() -> PathBuf {
    let timestamp = chrono::Local::now().format(STAGING_TIMESTAMP_FORMAT);
    env::temp_dir().join(format!("{}-{}", DEFAULT_STAGING_PREFIX, timestamp))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Absolute form of `path`, resolving the nearest existing ancestor.
fn absolute(path: &Path) -> Option<PathBuf> {
    let mut existing = path;
    let mut tail = Vec::new();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            let mut result = canonical;
            for part in tail.iter().rev() {
                result.push(part);
            }
            return Some(result);
        }
        tail.push(existing.file_name()?.to_os_string());
        existing = existing.parent()?;
        if existing.as_os_str().is_empty() {
            existing = Path::new(".");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["rust_archiver"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let base = TempDir::new().unwrap();
        let base_str = base.path().to_str().unwrap();
        let config = RunConfig::resolve(&args(&["-b", base_str, "-s", "bucket", "-k", "KEY"])).unwrap();

        assert_eq!(config.compression, CompressionKind::Zstd);
        assert_eq!(config.encryption, EncryptionKind::Gpg);
        assert_eq!(config.aws_profile, "default");
        assert_eq!(config.storage_class, "DEEP_ARCHIVE");
        assert_eq!(config.jobs, 1);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert!(config.notification.is_none());
        assert!(config
            .staging_root
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("archive-"));
    }

    #[test]
    fn test_missing_base_dir() {
        let err = RunConfig::resolve(&args(&["-s", "bucket", "-e", "none"])).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("base directory"));
    }

    #[test]
    fn test_missing_bucket() {
        let base = TempDir::new().unwrap();
        let err = RunConfig::resolve(&args(&["-b", base.path().to_str().unwrap(), "-e", "none"])).unwrap_err();
        assert!(err.to_string().contains("bucket"));
    }

    #[test]
    fn test_nonexistent_base_dir() {
        let base = TempDir::new().unwrap();
        let missing = base.path().join("missing");
        let err = RunConfig::resolve(&args(&["-b", missing.to_str().unwrap(), "-s", "b", "-e", "none"])).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_gpg_requires_key() {
        let base = TempDir::new().unwrap();
        let err = RunConfig::resolve(&args(&["-b", base.path().to_str().unwrap(), "-s", "b"])).unwrap_err();
        assert!(err.to_string().contains("key identifier"));
    }

    #[test]
    fn test_aes_requires_passphrase() {
        let base = TempDir::new().unwrap();
        let err = RunConfig::resolve(&args(&["-b", base.path().to_str().unwrap(), "-s", "b", "-e", "aes256"]))
            .unwrap_err();
        assert!(err.to_string().contains("passphrase"));

        let ok = RunConfig::resolve(&args(&[
            "-b", base.path().to_str().unwrap(), "-s", "b", "-e", "aes256", "-p", "secret",
        ]))
        .unwrap();
        assert_eq!(ok.aes_passphrase.unwrap().expose(), "secret");
    }

    #[test]
    fn test_notification_requires_both_parts() {
        let base = TempDir::new().unwrap();
        let b = base.path().to_str().unwrap();

        let err = RunConfig::resolve(&args(&["-b", b, "-s", "x", "-e", "none", "-r", "ops@example.com"])).unwrap_err();
        assert!(err.to_string().contains("requires a key"));

        let err = RunConfig::resolve(&args(&["-b", b, "-s", "x", "-e", "none", "-g", "KEY"])).unwrap_err();
        assert!(err.to_string().contains("requires an email recipient"));

        let config = RunConfig::resolve(&args(&[
            "-b", b, "-s", "x", "-e", "none", "-r", "ops@example.com", "-g", "KEY", "-n", "success",
        ]))
        .unwrap();
        let notification = config.notification.unwrap();
        assert_eq!(notification.recipient, "ops@example.com");
        assert_eq!(notification.notify_on, NotifyOn::Success);
    }

    #[test]
    fn test_cli_overrides_file() {
        let base = TempDir::new().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "base_dir: {}\ns3_bucket: from-file\ncompression: none\nencryption: none\nstorage_class: GLACIER\nkeep_going: true",
            base.path().display()
        )
        .unwrap();

        let config = RunConfig::resolve(&args(&[
            "--config", file.path().to_str().unwrap(),
            "-s", "from-cli",
            "-c", "tz",
        ]))
        .unwrap();

        assert_eq!(config.remote.bucket, "from-cli");
        assert_eq!(config.compression, CompressionKind::Gzip);
        assert_eq!(config.encryption, EncryptionKind::None);
        assert_eq!(config.storage_class, "GLACIER");
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
    }

    #[test]
    fn test_zero_jobs_rejected() {
        let base = TempDir::new().unwrap();
        let mut config = RunConfig::new(base.path(), "bucket");
        config.encryption = EncryptionKind::None;
        config.jobs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_staging_root_equal_to_base_rejected() {
        let base = TempDir::new().unwrap();
        let b = base.path().to_str().unwrap();
        let err = RunConfig::resolve(&args(&["-b", b, "-o", b, "-s", "x", "-e", "none"])).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("must not be the base directory"));

        let dotted = base.path().join("sub/..");
        fs::create_dir(base.path().join("sub")).unwrap();
        let err = RunConfig::resolve(&args(&["-b", b, "-o", dotted.to_str().unwrap(), "-s", "x", "-e", "none"]))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_staging_root_above_base_rejected() {
        let parent = TempDir::new().unwrap();
        let base = parent.path().join("data");
        fs::create_dir(&base).unwrap();

        let mut config = RunConfig::new(&base, "bucket");
        config.encryption = EncryptionKind::None;
        config.staging_root = parent.path().to_path_buf();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("one of its parents"));

        config.staging_root = base.join("stage");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stages_inside_base() {
        let base = TempDir::new().unwrap();
        let mut config = RunConfig::new(base.path(), "bucket");
        config.staging_root = base.path().join("stage/not-yet-created");
        assert!(config.stages_inside_base());

        let elsewhere = TempDir::new().unwrap();
        config.staging_root = elsewhere.path().join("stage");
        assert!(!config.stages_inside_base());
    }
}
