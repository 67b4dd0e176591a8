//! Shorts Core - Backend logic for the shorts pipeline
//!
//! This crate contains the orchestration core with zero CLI dependencies:
//! stage sequencing, the persisted status record, duplicate tracking,
//! and the adapters for the external tools the stages call.

pub mod collaborators;
pub mod config;
pub mod dedup;
pub mod logging;
pub mod models;
pub mod orchestrator;
mod persist;
pub mod sources;
pub mod status;
pub mod workspace;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
