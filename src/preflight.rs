//! Startup check that the external tools a configuration needs are installed.

use std::process::Command;

use log::debug;

use crate::cipher::EncryptionKind;
use crate::config::RunConfig;
use crate::constants::{GPG_BINARY, MAIL_BINARY};
use crate::error::ArchiveError;

/// External binaries required by `config`, in the order they are checked.
pub fn required_tools(config: &RunConfig) -> Vec<&'static str> {
    let mut tools = Vec::new();
    if config.encryption == EncryptionKind::Gpg || config.notification.is_some() {
        tools.push(GPG_BINARY);
    }
    if config.notification.is_some() {
        tools.push(MAIL_BINARY);
    }
    tools
}

/// Whether `tool` resolves on `PATH`.
pub fn tool_available(tool: &str) -> bool {
    Command::new("which")
        .arg(tool)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Fail with a configuration error naming every missing tool.
pub fn check_tools(config: &RunConfig) -> Result<(), ArchiveError> {
    check_with(config, tool_available)
}

fn check_with(config: &RunConfig, available: impl Fn(&str) -> bool) -> Result<(), ArchiveError> {
    let missing: Vec<&str> = required_tools(config)
        .into_iter()
        .filter(|tool| {
            let found = available(tool);
            debug!("Preflight {}: {}", tool, if found { "found" } else { "missing" });
            !found
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ArchiveError::config(format!(
            "required tools not found on PATH: {}",
            missing.join(", ")
        )))
    }
}
