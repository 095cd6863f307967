//! Test utilities for the archiver
//!
//! Temporary directory trees and in-memory provider fakes shared by the
//! unit test modules.

#![cfg(test)]

use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

use crate::cloud::Uploader;

/// Creates a temporary directory that is automatically cleaned up
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates the reference tree used across tests:
///
/// ```text
/// <base>/            (no files)
/// <base>/a/x.txt
/// <base>/a/y.txt
/// <base>/a/nested/n.txt
/// <base>/b/          (empty)
/// <base>/c/z.txt
/// ```
pub fn create_sample_tree() -> Result<TempDir> {
    let temp_dir = create_temp_dir()?;
    let base_path = temp_dir.path();

    fs::create_dir_all(base_path.join("a/nested"))?;
    fs::create_dir_all(base_path.join("b"))?;
    fs::create_dir_all(base_path.join("c"))?;

    fs::write(base_path.join("a/x.txt"), b"x content")?;
    fs::write(base_path.join("a/y.txt"), b"y content")?;
    fs::write(base_path.join("a/nested/n.txt"), b"nested content")?;
    fs::write(base_path.join("c/z.txt"), b"z content")?;

    Ok(temp_dir)
}

/// One object captured by [`MemoryUploader`].
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub local: PathBuf,
    pub bytes: Vec<u8>,
}

/// Uploader that keeps object contents in memory.
///
/// With `fail_on` set, the upload whose 1-based sequence number matches
/// fails instead of storing anything.
#[derive(Debug, Default)]
pub struct MemoryUploader {
    pub objects: Mutex<Vec<StoredObject>>,
    calls: AtomicUsize,
    fail_on: Option<usize>,
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: usize) -> Self {
        MemoryUploader {
            fail_on: Some(call),
            ..Self::default()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().unwrap().iter().map(|o| o.key.clone()).collect();
        keys.sort();
        keys
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Uploader for MemoryUploader {
    fn upload(&self, local: &Path, key: &str) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(call) {
            return Err(anyhow!("simulated network failure for {}", key));
        }

        let bytes = fs::read(local)?;
        self.objects.lock().unwrap().push(StoredObject {
            key: key.to_string(),
            local: local.to_path_buf(),
            bytes,
        });
        Ok(())
    }
}

/// List every regular file below `root`, relative to it.
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }
    let mut files: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}
