//! The seam between the orchestrator and the tools doing the actual work.

use std::io;

use super::errors::CollaboratorResult;
use super::types::Context;
use crate::dedup::Fingerprinted;
use crate::models::WorkItem;
use crate::sources::SourceRef;

/// Something a stage iterates over.
pub trait StageItem: Fingerprinted + Clone + Send {
    /// Sort key; stages process items in lexicographic order of this name.
    fn item_name(&self) -> &str;
}

impl StageItem for SourceRef {
    fn item_name(&self) -> &str {
        &self.id
    }
}

impl StageItem for WorkItem {
    fn item_name(&self) -> &str {
        &self.name
    }
}

/// Performs one stage's work on one item.
///
/// The stage runner calls these methods per item:
///
/// 1. `process` - exactly once; returns the produced item or a typed failure
/// 2. `release_input` - after the produced item was recorded and relocated
///
/// `process` must be all-or-nothing: on failure it leaves no partial output.
///
/// # Example
///
/// ```ignore
/// struct Renamer;
///
/// impl Collaborator for Renamer {
///     type Input = WorkItem;
///
///     fn name(&self) -> &str { "renamer" }
///
///     fn process(&self, ctx: &Context, input: &WorkItem) -> CollaboratorResult<WorkItem> {
///         let target = ctx.layout.edited().join(format!("{}.mp4", input.stem()));
///         std::fs::copy(&input.path, &target)
///             .map_err(|e| CollaboratorError::io("copy", e))?;
///         Ok(input.moved_to(target))
///     }
/// }
/// ```
pub trait Collaborator: Send + Sync {
    /// What the stage feeds in.
    type Input: StageItem;

    /// Name for logs and error context.
    fn name(&self) -> &str;

    /// Do the work for one item.
    fn process(&self, ctx: &Context, input: &Self::Input) -> CollaboratorResult<WorkItem>;

    /// Dispose of the consumed input once its output was handed on.
    ///
    /// Default does nothing.
    fn release_input(&self, _ctx: &Context, _input: &Self::Input) -> io::Result<()> {
        Ok(())
    }
}
