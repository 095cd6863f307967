use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::debug;
use openssl::hash::MessageDigest;
use openssl::pkcs5::pbkdf2_hmac;
use openssl::rand::rand_bytes;
use openssl::symm::{Cipher as SymmCipher, Crypter, Mode};

use crate::cipher::{with_suffix, Cipher};
use crate::constants::{AES_SALT_LEN, AES_SUFFIX, COMPRESSION_CHUNK_SIZE, OPENSSL_SALT_MAGIC, PBKDF2_ITERATIONS};
use crate::error::ArchiveError;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// Passphrase based AES-256-CBC encryption.
///
/// Output is readable with
/// `openssl enc -d -aes-256-cbc -pbkdf2 -in <file> -pass pass:<passphrase>`.
pub struct AesCipher {
    passphrase: String,
}

impl AesCipher {
    pub fn new(passphrase: impl Into<String>) -> Self {
        AesCipher {
            passphrase: passphrase.into(),
        }
    }
}

impl std::fmt::Debug for AesCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesCipher").field("passphrase", &"<redacted>").finish()
    }
}

impl Cipher for AesCipher {
    fn encrypt(&self, archive: &Path) -> Result<PathBuf> {
        if self.passphrase.is_empty() {
            return Err(ArchiveError::config("aes256 encryption requires a passphrase").into());
        }

        let output = with_suffix(archive, AES_SUFFIX);
        encrypt_file(archive, &output, &self.passphrase)?;
        fs::remove_file(archive).context(format!("Failed to remove plaintext {}", archive.display()))?;

        debug!("Encrypted {} to {}", archive.display(), output.display());
        Ok(output)
    }
}

fn derive_key_iv(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LEN + IV_LEN]> {
    let mut key_iv = [0u8; KEY_LEN + IV_LEN];
    pbkdf2_hmac(
        passphrase.as_bytes(),
        salt,
        PBKDF2_ITERATIONS,
        MessageDigest::sha256(),
        &mut key_iv,
    )
    .context("Failed to derive key from passphrase")?;
    Ok(key_iv)
}

/// Stream `reader` through `crypter` into `writer`.
fn pump<R: Read, W: Write>(mut reader: R, writer: &mut W, crypter: &mut Crypter) -> Result<()> {
    let block_size = SymmCipher::aes_256_cbc().block_size();
    let mut buffer = vec![0u8; COMPRESSION_CHUNK_SIZE];
    let mut out = vec![0u8; COMPRESSION_CHUNK_SIZE + block_size];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        let count = crypter.update(&buffer[..bytes_read], &mut out)?;
        writer.write_all(&out[..count])?;
    }

    let count = crypter
        .finalize(&mut out)
        .context("Cipher finalization failed (wrong passphrase or corrupt input?)")?;
    writer.write_all(&out[..count])?;
    Ok(())
}

/// Encrypt `src` into a new file `dst`.
pub fn encrypt_file(src: &Path, dst: &Path, passphrase: &str) -> Result<()> {
    let reader = BufReader::new(File::open(src).context(format!("Failed to open {}", src.display()))?);
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dst)
        .context(format!("Failed to create {}", dst.display()))?;
    let mut writer = BufWriter::new(file);

    let mut salt = [0u8; AES_SALT_LEN];
    rand_bytes(&mut salt).context("Failed to generate salt")?;
    let key_iv = derive_key_iv(passphrase, &salt)?;

    let mut crypter = Crypter::new(
        SymmCipher::aes_256_cbc(),
        Mode::Encrypt,
        &key_iv[..KEY_LEN],
        Some(&key_iv[KEY_LEN..]),
    )?;

    writer.write_all(OPENSSL_SALT_MAGIC)?;
    writer.write_all(&salt)?;
    pump(reader, &mut writer, &mut crypter).context(format!("Failed to encrypt {}", src.display()))?;
    writer.flush()?;
    Ok(())
}

/// Decrypt a file produced by [`encrypt_file`] into a new file `dst`.
pub fn decrypt_file(src: &Path, dst: &Path, passphrase: &str) -> Result<()> {
    let mut reader = BufReader::new(File::open(src).context(format!("Failed to open {}", src.display()))?);

    let mut header = [0u8; 8 + AES_SALT_LEN];
    reader
        .read_exact(&mut header)
        .context(format!("{} is too short to be encrypted", src.display()))?;
    if &header[..8] != OPENSSL_SALT_MAGIC {
        return Err(anyhow!("{} is missing the salted header", src.display()));
    }
    let key_iv = derive_key_iv(passphrase, &header[8..])?;

    let mut crypter = Crypter::new(
        SymmCipher::aes_256_cbc(),
        Mode::Decrypt,
        &key_iv[..KEY_LEN],
        Some(&key_iv[KEY_LEN..]),
    )?;

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dst)
        .context(format!("Failed to create {}", dst.display()))?;
    let mut writer = BufWriter::new(file);
    pump(reader, &mut writer, &mut crypter).context(format!("Failed to decrypt {}", src.display()))?;
    writer.flush()?;
    Ok(())
}
