use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::discovery::FolderDiscovery;
use crate::report::DryRunSummary;

/// Count the folders a real run would visit and the archives it would
/// create. Nothing is written and no provider is touched.
///
/// `exclude` keeps an existing staging root out of the counts.
pub fn dry_run(base: &Path, exclude: Option<&Path>) -> DryRunSummary {
    let base = fs::canonicalize(base).unwrap_or_else(|_| base.to_path_buf());
    let mut discovery = FolderDiscovery::new(&base);
    if let Some(path) = exclude {
        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        discovery = discovery.excluding(&path);
    }

    let mut summary = DryRunSummary::default();
    for item in discovery.tasks() {
        match item {
            Ok(task) => {
                summary.folders += 1;
                if !task.is_empty() {
                    summary.archives += 1;
                }
            }
            Err(e) => {
                warn!("{}", e);
                summary.unreadable += 1;
                if e.failed_stage().is_some() {
                    summary.folders += 1;
                }
            }
        }
    }

    info!("Folders to process: {}", summary.folders);
    info!("Archives to create: {}", summary.archives);
    summary
}
