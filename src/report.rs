//! Run-level outcome accumulated while folders are processed.

use std::fmt;
use std::fmt::Write as _;

use chrono::{DateTime, Local};
use log::{error, info, warn};
use uuid::Uuid;

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failure,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failure => write!(f, "failure"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineLevel {
    Info,
    Warn,
    Error,
}

/// Aggregate outcome of one run.
///
/// Every line recorded here is also logged, so the notification body
/// mirrors what the operator saw on the terminal.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub host: String,
    pub started: DateTime<Local>,
    pub finished: Option<DateTime<Local>>,
    pub status: RunStatus,
    pub lines: Vec<String>,
    pub folders_seen: usize,
    pub folders_skipped: usize,
    pub archives_created: usize,
    pub uploads_succeeded: usize,
    pub uploads_failed: usize,
    pub bytes_uploaded: u64,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        RunReport {
            run_id: Uuid::new_v4(),
            host: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            started: Local::now(),
            finished: None,
            status: RunStatus::Success,
            lines: Vec::new(),
            folders_seen: 0,
            folders_skipped: 0,
            archives_created: 0,
            uploads_succeeded: 0,
            uploads_failed: 0,
            bytes_uploaded: 0,
        }
    }

    pub fn info(&mut self, line: impl Into<String>) {
        self.push(LineLevel::Info, line.into());
    }

    pub fn warn(&mut self, line: impl Into<String>) {
        self.push(LineLevel::Warn, line.into());
    }

    /// Record a failure line and mark the run failed.
    pub fn fail(&mut self, line: impl Into<String>) {
        self.status = RunStatus::Failure;
        self.push(LineLevel::Error, line.into());
    }

    fn push(&mut self, level: LineLevel, line: String) {
        match level {
            LineLevel::Info => info!("{}", line),
            LineLevel::Warn => warn!("{}", line),
            LineLevel::Error => error!("{}", line),
        }
        self.lines.push(line);
    }

    pub fn finish(&mut self) {
        self.finished = Some(Local::now());
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn summary(&self) -> String {
        format!(
            "{} folders seen, {} skipped, {} archives created, {} uploads succeeded, {} failed",
            self.folders_seen, self.folders_skipped, self.archives_created, self.uploads_succeeded, self.uploads_failed
        )
    }

    /// Plaintext notification body.
    pub fn render(&self) -> String {
        let mut body = String::new();
        let _ = writeln!(body, "Run:      {}", self.run_id);
        let _ = writeln!(body, "Host:     {}", self.host);
        let _ = writeln!(body, "Started:  {}", self.started.to_rfc3339());
        if let Some(finished) = self.finished {
            let _ = writeln!(body, "Finished: {}", finished.to_rfc3339());
        }
        let _ = writeln!(body, "Status:   {}", self.status);
        let _ = writeln!(body, "Summary:  {}", self.summary());
        body.push('\n');
        for line in &self.lines {
            body.push_str(line);
            body.push('\n');
        }
        body
    }
}

/// Counts produced by a dry run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DryRunSummary {
    /// Directories visited, the base directory included
    pub folders: usize,
    /// Directories with at least one immediate regular file
    pub archives: usize,
    /// Directories that could not be walked or listed
    pub unreadable: usize,
}

impl DryRunSummary {
    /// Report body for a dry-run notification.
    pub fn to_report(&self) -> RunReport {
        let mut report = RunReport::new();
        report.folders_seen = self.folders;
        report.folders_skipped = self.folders.saturating_sub(self.archives);
        report.lines.push(format!("Dry run: {} folders would be processed", self.folders));
        report.lines.push(format!("Dry run: {} archives would be created", self.archives));
        if self.unreadable > 0 {
            report
                .lines
                .push(format!("Dry run: {} folders could not be read", self.unreadable));
        }
        report.finish();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_report_is_success() {
        let report = RunReport::new();
        assert!(report.is_success());
        assert!(report.lines.is_empty());
        assert!(!report.host.is_empty());
    }

    #[test]
    fn test_fail_marks_failure_and_keeps_order() {
        let mut report = RunReport::new();
        report.info("archived a");
        report.fail("upload failed for b");
        report.info("archived c");

        assert_eq!(report.status, RunStatus::Failure);
        assert_eq!(report.lines, vec!["archived a", "upload failed for b", "archived c"]);
    }

    #[test]
    fn test_render_contains_header_and_lines() {
        let mut report = RunReport::new();
        report.folders_seen = 3;
        report.archives_created = 2;
        report.uploads_succeeded = 2;
        report.info("Uploaded s3://bucket/a/a.tar");
        report.finish();

        let body = report.render();
        assert!(body.contains(&report.run_id.to_string()));
        assert!(body.contains("Status:   success"));
        assert!(body.contains("3 folders seen"));
        assert!(body.contains("Finished:"));
        assert!(body.ends_with("Uploaded s3://bucket/a/a.tar\n"));
    }

    #[test]
    fn test_dry_run_report() {
        let summary = DryRunSummary {
            folders: 5,
            archives: 3,
            unreadable: 0,
        };
        let report = summary.to_report();
        assert!(report.is_success());
        assert_eq!(report.folders_skipped, 2);
        assert_eq!(report.lines.len(), 2);
        assert!(report.render().contains("3 archives would be created"));
    }
}
