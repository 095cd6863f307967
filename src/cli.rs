use clap::Parser;
use std::path::PathBuf;

use crate::cipher::EncryptionKind;
use crate::codec::CompressionKind;
use crate::notify::NotifyOn;

/// Command-line arguments for the archiver.
///
/// Every immediate subfolder of the base directory (recursively) is packed
/// into its own archive, optionally encrypted, and uploaded to S3. Values
/// left unset fall back to the YAML file given with `--config`, then to the
/// built-in defaults.
#[derive(Parser, Debug)]
#[clap(
    name = "rust_archiver",
    version,
    about = "Archive, encrypt and upload every folder under a base directory to S3"
)]
pub struct Args {
    /// Root directory to scan (required)
    #[clap(short = 'b', long)]
    pub base_dir: Option<PathBuf>,

    /// Local staging root (default: time-stamped directory under the temp dir)
    #[clap(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// GPG key identifier used for asymmetric encryption
    #[clap(short = 'k', long)]
    pub gpg_key: Option<String>,

    /// Encryption applied to each archive (default: gpg)
    #[clap(short = 'e', long, value_enum)]
    pub encryption: Option<EncryptionKind>,

    /// Passphrase for aes256 encryption
    #[clap(short = 'p', long)]
    pub aes_passphrase: Option<String>,

    /// Compression applied to each archive (default: zstd)
    #[clap(short = 'c', long, value_enum)]
    pub compression: Option<CompressionKind>,

    /// S3 bucket name (required)
    #[clap(short = 's', long)]
    pub s3_bucket: Option<String>,

    /// Optional prefix inside the bucket
    #[clap(short = 'f', long)]
    pub s3_folder: Option<String>,

    /// AWS profile used for uploads (default: default)
    #[clap(short = 'a', long)]
    pub aws_profile: Option<String>,

    /// S3 storage class (default: DEEP_ARCHIVE)
    #[clap(short = 'l', long)]
    pub storage_class: Option<String>,

    /// Count folders and archives without processing anything
    #[clap(short = 'd', long)]
    pub dry_run: bool,

    /// Email recipient for the run notification
    #[clap(short = 'r', long)]
    pub email_recipient: Option<String>,

    /// GPG key identifier used to encrypt the notification body
    #[clap(short = 'g', long)]
    pub email_gpg_key: Option<String>,

    /// When to send the notification (default: always)
    #[clap(short = 'n', long, value_enum)]
    pub notify_on: Option<NotifyOn>,

    /// Path to a YAML file providing defaults for any option above
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// AWS region for S3 uploads
    #[clap(long)]
    pub region: Option<String>,

    /// Number of folders processed concurrently (default: 1)
    #[clap(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Keep processing remaining folders after a folder fails
    #[clap(long)]
    pub keep_going: bool,

    /// Abort an upload that takes longer than this many seconds
    #[clap(long)]
    pub upload_timeout: Option<u64>,

    /// Skip the check that required external tools are installed
    #[clap(long)]
    pub no_preflight: bool,

    /// Verbose logging
    #[clap(short = 'v', long)]
    pub verbose: bool,
}
