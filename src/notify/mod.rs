//! Encrypted run notifications.
//!
//! The report body never leaves the host in the clear: it is scrubbed,
//! encrypted for the recipient's key and only then handed to the local
//! mail transport.

use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::cipher::gpg::encrypt_armored;
use crate::constants::{MAIL_BINARY, NOTIFICATION_SUBJECT_PREFIX};
use crate::report::{RunReport, RunStatus};
use crate::security::redact_literals;

/// When a notification is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyOn {
    #[default]
    Always,
    Success,
    Failure,
}

impl NotifyOn {
    pub fn should_notify(&self, status: RunStatus) -> bool {
        match self {
            NotifyOn::Always => true,
            NotifyOn::Success => status == RunStatus::Success,
            NotifyOn::Failure => status == RunStatus::Failure,
        }
    }
}

impl fmt::Display for NotifyOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyOn::Always => write!(f, "always"),
            NotifyOn::Success => write!(f, "success"),
            NotifyOn::Failure => write!(f, "failure"),
        }
    }
}

/// Delivers a finished run report.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier {
    fn notify(&self, report: &RunReport) -> Result<()>;
}

/// Encrypts the report with `gpg --armor` and pipes it to `mail`.
#[derive(Clone)]
pub struct GpgMailNotifier {
    recipient: String,
    gpg_key: String,
    secrets: Vec<String>,
}

impl fmt::Debug for GpgMailNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpgMailNotifier")
            .field("recipient", &self.recipient)
            .field("gpg_key", &self.gpg_key)
            .finish()
    }
}

impl GpgMailNotifier {
    pub fn new(recipient: impl Into<String>, gpg_key: impl Into<String>) -> Self {
        GpgMailNotifier {
            recipient: recipient.into(),
            gpg_key: gpg_key.into(),
            secrets: Vec::new(),
        }
    }

    /// Literal values removed from the body before encryption.
    pub fn redacting(mut self, secrets: impl IntoIterator<Item = String>) -> Self {
        self.secrets.extend(secrets);
        self
    }

    /// Scrubbed plaintext that would be encrypted for `report`.
    pub fn body(&self, report: &RunReport) -> String {
        let secrets: Vec<&str> = self.secrets.iter().map(String::as_str).collect();
        redact_literals(&report.render(), &secrets)
    }
}

pub fn subject(report: &RunReport) -> String {
    format!("{} {} on {}: {}", NOTIFICATION_SUBJECT_PREFIX, report.run_id, report.host, report.status)
}

impl Notifier for GpgMailNotifier {
    fn notify(&self, report: &RunReport) -> Result<()> {
        let ciphertext = encrypt_armored(&self.gpg_key, self.body(report).as_bytes())
            .context("Failed to encrypt notification")?;

        let mut child = Command::new(MAIL_BINARY)
            .arg("-s")
            .arg(subject(report))
            .arg(&self.recipient)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to execute mail")?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("Failed to open mail stdin"))?;
            stdin.write_all(&ciphertext).context("Failed to write to mail")?;
        }

        let output = child.wait_with_output().context("Failed to wait for mail")?;
        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("mail exited with {}: {}", output.status, error.trim()));
        }

        debug!("Sent {} bytes of ciphertext", ciphertext.len());
        info!("Notification sent to {}", self.recipient);
        Ok(())
    }
}

/// Send `report` if `policy` allows it. Delivery failures are logged and
/// never change the run outcome. Returns whether a notification went out.
pub fn dispatch(notifier: &dyn Notifier, policy: NotifyOn, report: &RunReport) -> bool {
    if !policy.should_notify(report.status) {
        debug!("Notification skipped: policy {} and status {}", policy, report.status);
        return false;
    }

    match notifier.notify(report) {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to send notification: {:#}", e);
            false
        }
    }
}
