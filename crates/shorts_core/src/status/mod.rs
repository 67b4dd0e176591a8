//! The persisted status record.
//!
//! [`StatusStore`] is the only writer of the status file. Every write
//! replaces the whole document atomically, so the dashboard process polling
//! the file always sees either the old or the new record.
//! [`RunGuard`] ties a run's lifetime to the record and finalizes it on
//! every exit path.

mod guard;
mod store;

pub use guard::RunGuard;
pub use store::{StageUpdate, StatusStore};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::{StageId, StageState};

/// Errors from the status store.
#[derive(Error, Debug)]
pub enum StatusError {
    #[error("failed to read status record {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write status record {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("stage '{stage}' cannot move from {from} to {to}")]
    InvalidTransition {
        stage: StageId,
        from: StageState,
        to: StageState,
    },

    #[error("run is already finalized")]
    Finalized,
}

pub type StatusResult<T> = Result<T, StatusError>;
