//! Object store uploads.
//!
//! The pipeline ships each folder's artifact through an [`Uploader`]. The
//! production implementation is [`s3::S3Uploader`]; tests substitute
//! in-memory fakes.
//!
//! Remote keys mirror the folder layout under the base directory:
//!
//! ```text
//! s3://<bucket>/<prefix>/<relative folder>/<artifact file name>
//! ```
//!
//! ## Usage Example
//!
//! ```
//! use rust_archiver::cloud::RemoteTarget;
//! use std::path::Path;
//!
//! let target = RemoteTarget::new("s3://backups/nightly", None);
//! let key = target.object_key(Path::new("photos/2024"), "2024.tar.zst.gpg");
//! assert_eq!(key, "nightly/photos/2024/2024.tar.zst.gpg");
//! assert_eq!(target.uri(&key), "s3://backups/nightly/photos/2024/2024.tar.zst.gpg");
//! ```

use std::path::Path;

use anyhow::Result;

use crate::models::normalize_relative;

/// S3 client construction
pub mod client;

/// Amazon S3 uploader
pub mod s3;

pub use self::s3::S3Uploader;

/// Ships one local artifact to a remote key.
///
/// Exactly one attempt is made per call; retries are the caller's business.
#[cfg_attr(test, mockall::automock)]
pub trait Uploader: Send + Sync {
    fn upload(&self, local: &Path, key: &str) -> Result<()>;
}

/// Bucket plus optional key prefix that all objects are written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub bucket: String,
    pub prefix: Option<String>,
}

impl RemoteTarget {
    /// Build a target from a bucket name or `s3://bucket/prefix` URI and an
    /// optional extra folder appended to the prefix.
    pub fn new(bucket: &str, folder: Option<&str>) -> Self {
        let trimmed = bucket.trim().trim_start_matches("s3://").trim_matches('/');
        let (bucket, uri_prefix) = match trimmed.split_once('/') {
            Some((bucket, rest)) => (bucket, Some(rest)),
            None => (trimmed, None),
        };

        let prefix = [uri_prefix, folder]
            .into_iter()
            .flatten()
            .flat_map(|p| p.split('/'))
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");

        RemoteTarget {
            bucket: bucket.to_string(),
            prefix: if prefix.is_empty() { None } else { Some(prefix) },
        }
    }

    /// Object key for `file_name` uploaded from the folder at `relative`.
    pub fn object_key(&self, relative: &Path, file_name: &str) -> String {
        let relative = normalize_relative(relative);
        [self.prefix.as_deref().unwrap_or(""), relative.as_str(), file_name]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_bucket() {
        let target = RemoteTarget::new("my-bucket", None);
        assert_eq!(target.bucket, "my-bucket");
        assert_eq!(target.prefix, None);
        assert_eq!(target.object_key(Path::new("a"), "a.tar"), "a/a.tar");
    }

    #[test]
    fn test_bucket_with_folder() {
        let target = RemoteTarget::new("my-bucket", Some("/backups/2024/"));
        assert_eq!(target.prefix.as_deref(), Some("backups/2024"));
        assert_eq!(
            target.object_key(Path::new("a/b"), "b.tar.zst"),
            "backups/2024/a/b/b.tar.zst"
        );
    }

    #[test]
    fn test_uri_bucket_and_folder_combine() {
        let target = RemoteTarget::new("s3://my-bucket/base/", Some("extra"));
        assert_eq!(target.bucket, "my-bucket");
        assert_eq!(target.prefix.as_deref(), Some("base/extra"));
    }

    #[test]
    fn test_doubled_slashes_collapse() {
        let target = RemoteTarget::new("bucket", Some("a//b"));
        assert_eq!(target.prefix.as_deref(), Some("a/b"));
        assert_eq!(target.object_key(Path::new("c"), "c.tar"), "a/b/c/c.tar");

        let target = RemoteTarget::new("s3://bucket/x//y/", Some("//z"));
        assert_eq!(target.bucket, "bucket");
        assert_eq!(target.prefix.as_deref(), Some("x/y/z"));

        let target = RemoteTarget::new("bucket", Some("//"));
        assert_eq!(target.prefix, None);
    }

    #[test]
    fn test_base_directory_key_has_no_empty_segment() {
        let target = RemoteTarget::new("bucket", Some("pre"));
        assert_eq!(target.object_key(Path::new(""), "data.tar"), "pre/data.tar");
        assert_eq!(target.uri("pre/data.tar"), "s3://bucket/pre/data.tar");
    }

    proptest! {
        #[test]
        fn prop_keys_never_contain_empty_segments(
            prefix in "[a-z/]{0,12}",
            segments in proptest::collection::vec("[a-z0-9]{1,6}", 0..4),
            name in "[a-z]{1,8}\\.tar",
        ) {
            let target = RemoteTarget::new("bucket", Some(&prefix));
            let relative: std::path::PathBuf = segments.iter().collect();
            let key = target.object_key(&relative, &name);

            prop_assert!(!key.starts_with('/'));
            prop_assert!(!key.contains("//"));
            prop_assert!(key.ends_with(&name));
            for segment in &segments {
                prop_assert!(key.contains(segment.as_str()));
            }
        }
    }
}
