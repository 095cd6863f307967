use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crossbeam::channel::bounded;
use log::{debug, info, warn};

use crate::cipher::Cipher;
use crate::cloud::Uploader;
use crate::codec::Compressor;
use crate::config::{FailurePolicy, RunConfig};
use crate::discovery::FolderDiscovery;
use crate::error::{ArchiveError, Stage};
use crate::models::{FolderOutcome, FolderTask};
use crate::pipeline::FolderPipeline;
use crate::report::RunReport;
use crate::security::scrub_credentials;

/// Top-level driver for a real (non dry-run) run.
pub struct ArchivalRun<'a> {
    config: &'a RunConfig,
    compressor: &'a dyn Compressor,
    cipher: &'a dyn Cipher,
    uploader: &'a dyn Uploader,
}

impl<'a> ArchivalRun<'a> {
    pub fn new(
        config: &'a RunConfig,
        compressor: &'a dyn Compressor,
        cipher: &'a dyn Cipher,
        uploader: &'a dyn Uploader,
    ) -> Self {
        ArchivalRun {
            config,
            compressor,
            cipher,
            uploader,
        }
    }

    /// Discover every folder and run it through the pipeline.
    ///
    /// With [`FailurePolicy::Abort`] the first failed folder stops the run:
    /// no further folders are started, folders already in flight on other
    /// workers finish. The returned report is final.
    pub fn execute(&self) -> RunReport {
        let mut report = RunReport::new();
        report.info(format!("Run {} started on {}", report.run_id, report.host));

        let staging_root = &self.config.staging_root;
        let created_root = !staging_root.exists();
        if let Err(e) = fs::create_dir_all(staging_root) {
            let err = ArchiveError::stage(Stage::Staging, staging_root, e.into());
            report.fail(err.to_string());
            report.finish();
            return report;
        }

        let base = fs::canonicalize(&self.config.base_dir).unwrap_or_else(|_| self.config.base_dir.clone());
        let staging = fs::canonicalize(staging_root).unwrap_or_else(|_| staging_root.clone());
        if self.config.stages_inside_base() {
            info!("Staging root {} is inside the base directory and will not be archived", staging.display());
        }
        let discovery = FolderDiscovery::new(&base).excluding(&staging);

        let pipeline = FolderPipeline::new(
            self.compressor,
            self.config.compression,
            self.cipher,
            self.uploader,
            &self.config.remote,
            &staging,
        );

        if self.config.jobs > 1 {
            self.run_parallel(&pipeline, &discovery, &mut report);
        } else {
            self.run_sequential(&pipeline, &discovery, &mut report);
        }

        if report.is_success() {
            prune_created_dirs(&pipeline.created_dirs(), &staging, created_root);
        }

        let summary = report.summary();
        report.info(format!("Run {} finished with {}: {}", report.run_id, report.status, summary));
        report.finish();
        report
    }

    fn run_sequential(&self, pipeline: &FolderPipeline<'_>, discovery: &FolderDiscovery, report: &mut RunReport) {
        for item in discovery.tasks() {
            let stop = match item {
                Ok(task) => {
                    report.folders_seen += 1;
                    let result = pipeline.process(&task);
                    record(report, &task.display_relative(), result)
                }
                Err(e) => record_discovery_error(report, e),
            };

            if stop && self.config.failure_policy == FailurePolicy::Abort {
                report.warn("Aborting run: remaining folders were not processed");
                break;
            }
        }
    }

    fn run_parallel(&self, pipeline: &FolderPipeline<'_>, discovery: &FolderDiscovery, report: &mut RunReport) {
        let jobs = self.config.jobs;
        let abort_on_failure = self.config.failure_policy == FailurePolicy::Abort;
        let abort = AtomicBool::new(false);
        let shared = Mutex::new(std::mem::take(report));

        debug!("Processing folders on {} worker threads", jobs);

        let scope_result = crossbeam::thread::scope(|scope| {
            let (sender, receiver) = bounded::<FolderTask>(jobs * 2);
            let abort = &abort;
            let shared = &shared;

            for worker in 0..jobs {
                let receiver = receiver.clone();
                scope.spawn(move |_| {
                    while let Ok(task) = receiver.recv() {
                        if abort.load(Ordering::SeqCst) {
                            debug!("Worker {} dropped {}", worker, task.display_relative());
                            continue;
                        }
                        let result = pipeline.process(&task);
                        let mut report = shared.lock().unwrap_or_else(|e| e.into_inner());
                        if record(&mut report, &task.display_relative(), result) && abort_on_failure {
                            abort.store(true, Ordering::SeqCst);
                        }
                    }
                });
            }
            drop(receiver);

            for item in discovery.tasks() {
                if abort.load(Ordering::SeqCst) {
                    break;
                }
                match item {
                    Ok(task) => {
                        shared.lock().unwrap_or_else(|e| e.into_inner()).folders_seen += 1;
                        if sender.send(task).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let mut report = shared.lock().unwrap_or_else(|e| e.into_inner());
                        if record_discovery_error(&mut report, e) && abort_on_failure {
                            abort.store(true, Ordering::SeqCst);
                        }
                    }
                }
            }
            drop(sender);
        });

        *report = shared.into_inner().unwrap_or_else(|e| e.into_inner());
        if scope_result.is_err() {
            report.fail("A worker thread panicked");
        }
        if abort.load(Ordering::SeqCst) {
            report.warn("Aborting run: remaining folders were not processed");
        }
    }
}

/// Fold one folder's result into the report. Returns `true` on failure.
fn record(report: &mut RunReport, folder: &str, result: Result<FolderOutcome, ArchiveError>) -> bool {
    match result {
        Ok(FolderOutcome::Skipped) => {
            report.folders_skipped += 1;
            report.info(format!("Skipping {}: no files", folder));
            false
        }
        Ok(FolderOutcome::Archived {
            remote_uri,
            file_count,
            bytes,
        }) => {
            report.archives_created += 1;
            report.uploads_succeeded += 1;
            report.bytes_uploaded += bytes;
            report.info(format!("Uploaded {} ({} files, {} bytes) to {}", folder, file_count, bytes, remote_uri));
            false
        }
        Err(e) => {
            match e.failed_stage() {
                Some(Stage::Encrypt) => report.archives_created += 1,
                Some(Stage::Cleanup) => {
                    report.archives_created += 1;
                    report.uploads_succeeded += 1;
                }
                Some(Stage::Upload) => {
                    report.archives_created += 1;
                    report.uploads_failed += 1;
                }
                _ => {}
            }
            report.fail(scrub_credentials(&format!("Folder {} failed: {}", folder, e)));
            true
        }
    }
}

/// Walk errors fail the run but never stop it; a folder that was found but
/// could not be listed is treated like any other folder failure.
fn record_discovery_error(report: &mut RunReport, err: ArchiveError) -> bool {
    match err {
        ArchiveError::Discovery { .. } => {
            report.fail(scrub_credentials(&err.to_string()));
            false
        }
        other => {
            report.folders_seen += 1;
            report.fail(scrub_credentials(&other.to_string()));
            true
        }
    }
}

/// Remove the staging directories this run created, deepest first.
/// Directories that existed before the run are never touched, and
/// `remove_dir` leaves anything non-empty in place.
fn prune_created_dirs(created: &[PathBuf], root: &Path, remove_root: bool) {
    for dir in created.iter().filter(|d| d.as_path() != root) {
        if fs::remove_dir(dir).is_ok() {
            debug!("Removed empty staging directory {}", dir.display());
        }
    }

    if remove_root && fs::remove_dir(root).is_err() {
        warn!("Staging root {} is not empty and was kept", root.display());
    }
}
