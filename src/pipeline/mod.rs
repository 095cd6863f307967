//! The per-folder archival pipeline and the drivers around it.
//!
//! - [`folder::FolderPipeline`] moves one folder through
//!   compress, encrypt, upload and cleanup
//! - [`run::ArchivalRun`] walks the base directory and feeds folders to the
//!   pipeline, sequentially or on a pool of worker threads
//! - [`dry_run::dry_run`] walks the same tree and only counts

pub mod dry_run;
pub mod folder;
pub mod run;

pub use dry_run::dry_run;
pub use folder::FolderPipeline;
pub use run::ArchivalRun;
