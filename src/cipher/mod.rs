//! Encryption of staged archives.
//!
//! A cipher turns a local archive into the artifact that gets uploaded.
//! On success the plaintext archive is removed and the returned path carries
//! the cipher's suffix; the pass-through cipher returns its input untouched.
//!
//! - `gpg`: public-key encryption to a recipient already present in the
//!   local keyring, suffix `.gpg`
//! - `aes256`: passphrase based AES-256-CBC with a random salt, in the
//!   `openssl enc -pbkdf2` format, suffix `.enc`
//! - `none`: no encryption

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Passphrase based AES-256 encryption via OpenSSL
pub mod aes;

/// GnuPG public-key encryption
pub mod gpg;

pub use self::aes::AesCipher;
pub use self::gpg::GpgCipher;

/// Encryption applied to each archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionKind {
    /// GnuPG public-key encryption
    Gpg,
    /// Passphrase based AES-256
    Aes256,
    /// No encryption
    None,
}

impl Default for EncryptionKind {
    fn default() -> Self {
        EncryptionKind::Gpg
    }
}

impl fmt::Display for EncryptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionKind::Gpg => write!(f, "gpg"),
            EncryptionKind::Aes256 => write!(f, "aes256"),
            EncryptionKind::None => write!(f, "none"),
        }
    }
}

/// Transforms a local archive into the artifact to upload.
pub trait Cipher: Send + Sync {
    /// Encrypt `archive`, returning the path of the resulting artifact.
    ///
    /// Missing key material is reported as
    /// [`ArchiveError::Configuration`](crate::error::ArchiveError) before
    /// any backend is invoked.
    fn encrypt(&self, archive: &Path) -> Result<PathBuf>;

    /// Whether this cipher actually changes the archive.
    fn is_pass_through(&self) -> bool {
        false
    }
}

/// Leaves the archive unchanged.
#[derive(Debug, Clone, Default)]
pub struct PassThroughCipher;

impl Cipher for PassThroughCipher {
    fn encrypt(&self, archive: &Path) -> Result<PathBuf> {
        Ok(archive.to_path_buf())
    }

    fn is_pass_through(&self) -> bool {
        true
    }
}

/// Build the cipher for `kind` from the configured key material.
///
/// Key presence is checked when the cipher is used, not here.
pub fn cipher_for(kind: EncryptionKind, gpg_key: Option<&str>, passphrase: Option<&str>) -> Box<dyn Cipher> {
    match kind {
        EncryptionKind::Gpg => Box::new(GpgCipher::new(gpg_key.unwrap_or_default())),
        EncryptionKind::Aes256 => Box::new(AesCipher::new(passphrase.unwrap_or_default())),
        EncryptionKind::None => Box::new(PassThroughCipher),
    }
}

/// Append `.suffix` to the file name of `path`.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
