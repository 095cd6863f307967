use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use log::debug;

use crate::cipher::{with_suffix, Cipher};
use crate::constants::{GPG_BINARY, GPG_SUFFIX};
use crate::error::ArchiveError;

/// Public-key encryption through the `gpg` binary.
///
/// The recipient key must already be imported into the invoking user's
/// keyring; trust is not checked.
#[derive(Debug, Clone)]
pub struct GpgCipher {
    recipient: String,
}

impl GpgCipher {
    pub fn new(recipient: impl Into<String>) -> Self {
        GpgCipher {
            recipient: recipient.into(),
        }
    }
}

impl Cipher for GpgCipher {
    fn encrypt(&self, archive: &Path) -> Result<PathBuf> {
        if self.recipient.is_empty() {
            return Err(ArchiveError::config("gpg encryption requires a key identifier").into());
        }

        let output = with_suffix(archive, GPG_SUFFIX);
        let result = Command::new(GPG_BINARY)
            .arg("--batch")
            .arg("--yes")
            .arg("--trust-model")
            .arg("always")
            .arg("--encrypt")
            .arg("--recipient")
            .arg(&self.recipient)
            .arg("--output")
            .arg(&output)
            .arg(archive)
            .output()
            .context("Failed to execute gpg")?;

        if !result.status.success() {
            let error = String::from_utf8_lossy(&result.stderr);
            return Err(anyhow!("gpg exited with {}: {}", result.status, error.trim()));
        }

        fs::remove_file(archive).context(format!("Failed to remove plaintext {}", archive.display()))?;
        debug!("Encrypted {} for {}", archive.display(), self.recipient);
        Ok(output)
    }
}

/// Encrypt `plaintext` for `recipient` and return ASCII-armoured ciphertext.
pub fn encrypt_armored(recipient: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    if recipient.is_empty() {
        return Err(ArchiveError::config("gpg encryption requires a key identifier").into());
    }

    let mut child = Command::new(GPG_BINARY)
        .arg("--batch")
        .arg("--yes")
        .arg("--trust-model")
        .arg("always")
        .arg("--armor")
        .arg("--encrypt")
        .arg("--recipient")
        .arg(recipient)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to execute gpg")?;

    {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Failed to open gpg stdin"))?;
        stdin.write_all(plaintext).context("Failed to write to gpg")?;
    }

    let output = child.wait_with_output().context("Failed to wait for gpg")?;
    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("gpg exited with {}: {}", output.status, error.trim()));
    }

    Ok(output.stdout)
}
