//! Pipeline orchestration.
//!
//! The [`Controller`] visits the four stages in order. Each stage is run by
//! the [`StageRunner`], which calls the stage's [`Collaborator`] once per
//! item, consults and updates the dedup tracker, and relocates produced
//! items into the next stage's input directory.
//!
//! # Architecture
//!
//! ```text
//! Controller ── RunGuard (status record)
//!     ├── Ingest     SourceRef → raw/      (dedup: acquired)
//!     ├── Transform  raw/      → final/
//!     ├── Enrich     final/    → ready/    (+ .json sidecar)
//!     └── Publish    ready/    → uploaded/ (dedup: published)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use shorts_core::orchestrator::{Collaborators, Context, Controller};
//!
//! let controller = Controller::new(collaborators, status_store, dedup_tracker);
//! controller.check_idle()?;
//! let summary = controller.run(&ctx, sources)?;
//! println!("Run finished: {}", summary.outcome);
//! ```

mod collaborator;
mod errors;
mod pipeline;
mod runner;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use collaborator::{Collaborator, StageItem};
pub use errors::{
    CollaboratorError, CollaboratorResult, ErrorClass, FailureKind, PipelineError, PipelineResult,
    StageError, StageFailure,
};
pub use pipeline::{Collaborators, Controller};
pub use runner::{StagePlan, StageResult, StageRunner};
pub use types::{new_run_id, Context, RunSummary, StageSummary};
