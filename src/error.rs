use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Staging,
    Compress,
    Encrypt,
    Upload,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Staging => write!(f, "staging"),
            Stage::Compress => write!(f, "compress"),
            Stage::Encrypt => write!(f, "encrypt"),
            Stage::Upload => write!(f, "upload"),
            Stage::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Errors surfaced by the archival pipeline.
///
/// `Configuration` is raised before any destructive work where possible.
/// `Stage` and `Timeout` are fatal to the whole run unless the run was
/// configured to keep going.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{stage} failed for {}: {source:#}", path.display())]
    Stage {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("{stage} timed out after {after:?} for {}", path.display())]
    Timeout {
        stage: Stage,
        path: PathBuf,
        after: Duration,
    },

    #[error("failed to walk {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

impl ArchiveError {
    pub fn config(msg: impl Into<String>) -> Self {
        ArchiveError::Configuration(msg.into())
    }

    pub fn stage(stage: Stage, path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        ArchiveError::Stage {
            stage,
            path: path.into(),
            source,
        }
    }

    /// Stage the error is attributed to, if any.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            ArchiveError::Stage { stage, .. } | ArchiveError::Timeout { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ArchiveError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_stage_error_message_names_path() {
        let err = ArchiveError::stage(Stage::Upload, "/tmp/out/a/a.tar", anyhow!("access denied"));
        let msg = err.to_string();
        assert!(msg.starts_with("upload failed for /tmp/out/a/a.tar"));
        assert!(msg.contains("access denied"));
        assert_eq!(err.failed_stage(), Some(Stage::Upload));
    }

    #[test]
    fn test_timeout_is_attributed_to_stage() {
        let err = ArchiveError::Timeout {
            stage: Stage::Upload,
            path: PathBuf::from("x.tar"),
            after: Duration::from_secs(5),
        };
        assert_eq!(err.failed_stage(), Some(Stage::Upload));
        assert!(err.to_string().contains("timed out after 5s"));
    }

    #[test]
    fn test_configuration_error() {
        let err = ArchiveError::config("base directory is required");
        assert!(err.is_configuration());
        assert_eq!(err.failed_stage(), None);
        assert_eq!(err.to_string(), "configuration error: base directory is required");
    }
}
