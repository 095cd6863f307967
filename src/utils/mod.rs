//! Small helpers shared by the providers.

/// SHA-256 digests of staged artifacts
pub mod hash;
