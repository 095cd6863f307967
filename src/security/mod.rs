//! Keeping key material out of logs, reports and notification bodies.
//!
//! - [`Secret`] wraps passphrases so formatting never reveals them
//! - [`credential_scrubber`] rewrites free text that might contain
//!   credentials before it leaves the process

pub mod credential_scrubber;
mod secret;

pub use credential_scrubber::{redact_literals, safe_error_message, scrub_credentials};
pub use secret::Secret;
