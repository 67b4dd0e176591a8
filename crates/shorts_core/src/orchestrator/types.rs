//! Core types for the orchestrator.

use std::sync::Arc;

use chrono::Local;

use super::errors::StageFailure;
use crate::config::Settings;
use crate::logging::RunLogger;
use crate::models::{RunOutcome, StageId};
use crate::workspace::WorkspaceLayout;

/// Read-only context shared by the controller, the stage runner, and collaborators.
pub struct Context {
    /// Run identifier (also names the run log).
    pub run_id: String,
    /// Application settings.
    pub settings: Settings,
    /// Stage directories.
    pub layout: WorkspaceLayout,
    /// Per-run logger.
    pub logger: Arc<RunLogger>,
}

impl Context {
    pub fn new(
        run_id: impl Into<String>,
        settings: Settings,
        layout: WorkspaceLayout,
        logger: Arc<RunLogger>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            settings,
            layout,
            logger,
        }
    }
}

/// A fresh run identifier based on the local time.
pub fn new_run_id() -> String {
    format!("run-{}", Local::now().format("%Y%m%d-%H%M%S"))
}

/// Per-stage tallies of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSummary {
    pub stage: StageId,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deferred: usize,
    /// `(item name, error message)` for every failed item.
    pub failures: Vec<(String, String)>,
}

impl StageSummary {
    /// Status message for the stage record.
    pub fn message(&self) -> String {
        let mut message = format!(
            "{} succeeded, {} skipped, {} failed",
            self.succeeded, self.skipped, self.failed
        );
        if self.deferred > 0 {
            message.push_str(&format!(", {} deferred", self.deferred));
        }
        if let Some((name, error)) = self.failures.first() {
            message.push_str(&format!(" (first failure: {}: {})", name, error));
        }
        message
    }
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub outcome: RunOutcome,
    /// Stages that finished, in order.
    pub stages: Vec<StageSummary>,
    /// The stage that halted the run, if it aborted.
    pub halted: Option<StageFailure>,
}

impl RunSummary {
    /// Whether all four stages ran to the end.
    pub fn completed(&self) -> bool {
        self.halted.is_none()
    }

    /// Summary for one stage, if it finished.
    pub fn stage(&self, stage: StageId) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Failed items across all stages.
    pub fn total_failed(&self) -> usize {
        self.stages.iter().map(|s| s.failed).sum()
    }
}
