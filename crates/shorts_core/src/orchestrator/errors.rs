//! Error types for the orchestrator.
//!
//! Errors carry context that chains through layers:
//! Run → Stage → Item → Detail
//!
//! [`ErrorClass`] sorts them into per-item failures (absorbed by the stage
//! runner), stage-fatal failures, and infrastructure failures.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::dedup::DedupError;
use crate::models::StageId;
use crate::status::StatusError;
use crate::workspace::ResetError;

/// How a failure affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// One item failed; the stage continues.
    RecoverablePerItem,
    /// The stage cannot produce usable output; the run halts.
    StageFatal,
    /// The status or dedup store is unusable; the run halts.
    InfrastructureFailure,
}

/// Coarse failure kind reported for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    AlreadyAcquired,
    NotFound,
    Timeout,
    Unknown,
}

/// Typed failure of one collaborator call.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    /// The source's file is already waiting in the workspace.
    #[error("already acquired: {0}")]
    AlreadyAcquired(String),

    /// The source or input file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The call exceeded its time limit.
    #[error("{tool} timed out after {}s", .after.as_secs())]
    Timeout { tool: String, after: Duration },

    /// An external command failed.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// A remote API call failed.
    #[error("{service} request failed: {message}")]
    Http { service: String, message: String },

    /// A response could not be understood.
    #[error("invalid {what}: {message}")]
    InvalidResponse { what: String, message: String },

    /// Neither transcription nor the fallback produced enough text.
    #[error("no usable text: {0}")]
    NoUsableText(String),

    /// The item has no title/description to publish with.
    #[error("missing metadata for {0}")]
    MissingMetadata(String),

    /// A required credential is not configured.
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// The collaborator panicked.
    #[error("collaborator panicked: {0}")]
    Panicked(String),

    /// Generic failure with message.
    #[error("{0}")]
    Other(String),
}

impl CollaboratorError {
    pub fn timeout(tool: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            tool: tool.into(),
            after,
        }
    }

    pub fn command_failed(
        tool: impl Into<String>,
        exit_code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }

    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn http(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn invalid_response(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            what: what.into(),
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// The coarse kind of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AlreadyAcquired(_) => FailureKind::AlreadyAcquired,
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Timeout { .. } => FailureKind::Timeout,
            _ => FailureKind::Unknown,
        }
    }

    /// Collaborator failures never escape their item.
    pub fn class(&self) -> ErrorClass {
        ErrorClass::RecoverablePerItem
    }
}

/// Result type for collaborator calls.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// A failure that stops a stage.
#[derive(Error, Debug)]
pub enum StageError {
    /// Ingest produced nothing new and nothing was waiting from earlier runs.
    #[error("no new items ({skipped} already known, {failed} failed)")]
    NoNewWork { skipped: usize, failed: usize },

    /// Workspace reset before ingest failed.
    #[error("workspace reset failed: {0}")]
    Reset(#[from] ResetError),

    /// The stage crashed outside of any single item.
    #[error("stage crashed: {0}")]
    Crashed(String),

    /// Dedup record could not be written.
    #[error(transparent)]
    Dedup(#[from] DedupError),

    /// Status record could not be read or written.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// Stage directories could not be read or written.
    #[error("workspace I/O error in {operation}: {source}")]
    Workspace {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl StageError {
    pub fn workspace(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Workspace {
            operation: operation.into(),
            source,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoNewWork { .. } | Self::Crashed(_) => ErrorClass::StageFatal,
            Self::Reset(ResetError::RunInProgress(_)) => ErrorClass::StageFatal,
            Self::Reset(_) | Self::Dedup(_) | Self::Status(_) | Self::Workspace { .. } => {
                ErrorClass::InfrastructureFailure
            }
        }
    }
}

/// Top-level error for a run that could not be recorded.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The status record refused the run (it could not be started or closed).
    #[error("run '{run_id}' could not update the status record: {source}")]
    Status {
        run_id: String,
        #[source]
        source: StatusError,
    },

    /// Another run is marked as in progress.
    #[error("a run is already in progress (stage {stage})")]
    AlreadyRunning { stage: String },
}

impl PipelineError {
    pub fn status(run_id: impl Into<String>, source: StatusError) -> Self {
        Self::Status {
            run_id: run_id.into(),
            source,
        }
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Which stage halted and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: StageId,
    pub class: ErrorClass,
    pub message: String,
}
