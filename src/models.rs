use std::fmt;
use std::path::{Path, PathBuf};

/// One unit of work: a discovered folder and its immediate regular files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderTask {
    /// Absolute path of the folder
    pub path: PathBuf,
    /// Path relative to the base directory, empty for the base directory itself
    pub relative: PathBuf,
    /// Immediate regular files, sorted by name
    pub files: Vec<PathBuf>,
}

impl FolderTask {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Relative path rendered with forward slashes, `"."` for the base directory.
    pub fn display_relative(&self) -> String {
        let rel = normalize_relative(&self.relative);
        if rel.is_empty() {
            ".".to_string()
        } else {
            rel
        }
    }

    /// Base name used for the folder's archive.
    ///
    /// Falls back to `root` when the folder has no usable file name
    /// (for example a base directory of `/`).
    pub fn archive_stem(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "root".to_string())
    }
}

/// Convert a relative path to a slash separated string with no leading or
/// trailing separators.
pub fn normalize_relative(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Transform state of a folder's local artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Staged,
    Compressed,
    Encrypted,
    Uploaded,
    Removed,
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactState::Staged => "staged",
            ArtifactState::Compressed => "compressed",
            ArtifactState::Encrypted => "encrypted",
            ArtifactState::Uploaded => "uploaded",
            ArtifactState::Removed => "removed",
        };
        write!(f, "{}", name)
    }
}

/// The local file produced for one folder as it moves through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveArtifact {
    pub path: PathBuf,
    pub state: ArtifactState,
}

impl ArchiveArtifact {
    pub fn staged(path: PathBuf) -> Self {
        ArchiveArtifact {
            path,
            state: ArtifactState::Staged,
        }
    }

    /// Move to `state`, optionally replacing the on-disk path.
    pub fn advance(&mut self, state: ArtifactState, path: Option<PathBuf>) {
        if let Some(path) = path {
            self.path = path;
        }
        self.state = state;
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Result of processing one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderOutcome {
    /// Folder had no immediate regular files
    Skipped,
    /// Artifact uploaded and removed locally
    Archived {
        remote_uri: String,
        file_count: usize,
        bytes: u64,
    },
}
