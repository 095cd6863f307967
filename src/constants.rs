//! Global constants for the archiver.
//!
//! Defaults for the command line live here alongside the size thresholds
//! used by the codec and upload paths.

// Run defaults
/// Default AWS profile used for uploads
pub const DEFAULT_AWS_PROFILE: &str = "default";

/// Default S3 storage class applied to every uploaded object
pub const DEFAULT_STORAGE_CLASS: &str = "DEEP_ARCHIVE";

/// Prefix of the time-stamped staging directory created under the system temp dir
pub const DEFAULT_STAGING_PREFIX: &str = "archive";

/// Timestamp layout for the default staging directory
pub const STAGING_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

// Archive suffixes
pub const TAR_SUFFIX: &str = "tar";
pub const GZIP_SUFFIX: &str = "gz";
pub const ZSTD_SUFFIX: &str = "zst";
pub const GPG_SUFFIX: &str = "gpg";
pub const AES_SUFFIX: &str = "enc";

// Codec tuning
/// Chunk size for streaming reads during compression and encryption (512KB)
pub const COMPRESSION_CHUNK_SIZE: usize = 512 * 1024;

/// zstd compression level (matches the zstd CLI default)
pub const ZSTD_LEVEL: i32 = 3;

/// Upper bound on gzip and zstd worker threads
pub const MAX_COMPRESSION_WORKERS: usize = 8;

/// Input bytes deflated per gzip worker (1MB)
pub const GZIP_CHUNK_SIZE: usize = 1024 * 1024;

// Symmetric cipher parameters, compatible with `openssl enc -aes-256-cbc -salt -pbkdf2`
/// Magic header written before the salt
pub const OPENSSL_SALT_MAGIC: &[u8; 8] = b"Salted__";

/// Salt length in bytes
pub const AES_SALT_LEN: usize = 8;

/// PBKDF2 iteration count (openssl default when `-pbkdf2` is given)
pub const PBKDF2_ITERATIONS: usize = 10_000;

// Cloud storage constants
/// S3 upload chunk size (8MB, S3 minimum is 5MB)
pub const S3_UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// S3 minimum part size for multipart uploads (5MB)
pub const S3_MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Large file threshold for multipart uploads (50MB)
pub const LARGE_FILE_THRESHOLD: u64 = 50 * 1024 * 1024;

/// User metadata key carrying the artifact digest
pub const SHA256_METADATA_KEY: &str = "sha256";

// External tools
pub const GPG_BINARY: &str = "gpg";
pub const MAIL_BINARY: &str = "mail";

/// Subject prefix for notification emails
pub const NOTIFICATION_SUBJECT_PREFIX: &str = "Archive run";
