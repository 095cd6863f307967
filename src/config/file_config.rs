use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::cipher::EncryptionKind;
use crate::codec::CompressionKind;
use crate::notify::NotifyOn;

/// Optional YAML configuration file.
///
/// Every field mirrors a command-line option; values given on the command
/// line win.
///
/// ```yaml
/// base_dir: /srv/data
/// s3_bucket: cold-archive
/// s3_folder: nightly
/// compression: zstd
/// encryption: gpg
/// gpg_key: 0xDEADBEEF
/// storage_class: DEEP_ARCHIVE
/// email_recipient: ops@example.com
/// email_gpg_key: ops@example.com
/// notify_on: failure
/// ```
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub base_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub gpg_key: Option<String>,
    pub encryption: Option<EncryptionKind>,
    pub aes_passphrase: Option<String>,
    pub compression: Option<CompressionKind>,
    pub s3_bucket: Option<String>,
    pub s3_folder: Option<String>,
    pub aws_profile: Option<String>,
    pub region: Option<String>,
    pub storage_class: Option<String>,
    pub email_recipient: Option<String>,
    pub email_gpg_key: Option<String>,
    pub notify_on: Option<NotifyOn>,
    pub jobs: Option<usize>,
    pub keep_going: Option<bool>,
    pub upload_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: FileConfig = serde_yaml::from_str(&content)
            .context(format!("Failed to parse YAML config {}", path.display()))?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}
