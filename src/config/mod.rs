// Run configuration: CLI flags layered over an optional YAML file
mod file_config;
mod run_config;

// Re-export file configuration
pub use file_config::FileConfig;

// Re-export resolved run configuration
pub use run_config::{
    FailurePolicy,
    NotificationSettings,
    RunConfig,
};
