//! Folder discovery.
//!
//! Walks the tree under the base directory (the base directory included)
//! and yields one [`FolderTask`] per directory, lazily and in filesystem
//! traversal order. Each task lists only the folder's immediate regular
//! files; nested directories become tasks of their own.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::error::{ArchiveError, Stage};
use crate::models::FolderTask;

/// Lazy directory walker producing folder tasks.
#[derive(Debug, Clone)]
pub struct FolderDiscovery {
    base: PathBuf,
    exclude: Option<PathBuf>,
}

impl FolderDiscovery {
    pub fn new(base: &Path) -> Self {
        FolderDiscovery {
            base: base.to_path_buf(),
            exclude: None,
        }
    }

    /// Skip `path` and everything below it, used to keep a staging root that
    /// lives inside the base directory out of the walk.
    pub fn excluding(mut self, path: &Path) -> Self {
        self.exclude = Some(path.to_path_buf());
        self
    }

    /// Iterate over every directory under the base directory.
    ///
    /// Walk errors surface as [`ArchiveError::Discovery`]; failing to list a
    /// discovered folder surfaces as a staging failure for that folder.
    pub fn tasks(&self) -> impl Iterator<Item = Result<FolderTask, ArchiveError>> + '_ {
        let exclude = self.exclude.clone();

        WalkDir::new(&self.base)
            .follow_links(false)
            .into_iter()
            .filter_entry(move |entry| match &exclude {
                Some(excluded) => !entry.path().starts_with(excluded),
                None => true,
            })
            .filter_map(move |entry| match entry {
                Ok(entry) if entry.file_type().is_dir() => Some(self.task_for(entry.path())),
                Ok(_) => None,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.base.clone());
                    Some(Err(ArchiveError::Discovery { path, source: e }))
                }
            })
    }

    fn task_for(&self, dir: &Path) -> Result<FolderTask, ArchiveError> {
        let relative = dir.strip_prefix(&self.base).unwrap_or(Path::new("")).to_path_buf();
        let files = list_immediate_files(dir).map_err(|e| ArchiveError::stage(Stage::Staging, dir, e.into()))?;

        debug!("Discovered {} ({} files)", dir.display(), files.len());
        Ok(FolderTask {
            path: dir.to_path_buf(),
            relative,
            files,
        })
    }
}

/// Immediate regular files of `dir`, sorted by path. Symlinks and
/// subdirectories are ignored.
pub fn list_immediate_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
