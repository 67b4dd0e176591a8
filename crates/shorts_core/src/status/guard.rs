//! Scoped ownership of one run in the status record.

use super::store::{StageUpdate, StatusStore};
use super::StatusResult;
use crate::models::{RunOutcome, StageId, StageState, StatusRecord};

/// Message recorded when a run is dropped without being finalized.
const INTERRUPTED: &str = "interrupted before the run finished";

/// A run in progress.
///
/// Created by [`RunGuard::begin`]. If the guard is dropped without
/// [`RunGuard::finalize`] (early return, `?`, or panic unwinding), the
/// running stage is marked as errored and the run is finalized as failed,
/// so the record never stays at `running = true`.
pub struct RunGuard<'a> {
    store: &'a StatusStore,
    run_id: String,
    finalized: bool,
}

impl<'a> RunGuard<'a> {
    /// Reset the record for a new run and take ownership of it.
    pub fn begin(store: &'a StatusStore, run_id: impl Into<String>) -> StatusResult<Self> {
        let run_id = run_id.into();
        store.begin_run(&run_id)?;
        Ok(Self {
            store,
            run_id,
            finalized: false,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn store(&self) -> &StatusStore {
        self.store
    }

    /// Mark a stage as running.
    pub fn start_stage(&self, stage: StageId, message: &str) -> StatusResult<StatusRecord> {
        self.store.update(stage, StageState::Running, message, None)
    }

    /// Apply a stage update.
    pub fn apply(&self, stage: StageId, change: StageUpdate) -> StatusResult<StatusRecord> {
        self.store.apply(stage, change)
    }

    /// Mark `stage` as errored with `message` and finalize the run as failed.
    pub fn abort(mut self, stage: StageId, message: &str) -> StatusResult<StatusRecord> {
        self.fail_stage(stage, message)?;
        let record = self.store.finalize(RunOutcome::Failed)?;
        self.finalized = true;
        Ok(record)
    }

    /// Finalize the run with `outcome`.
    pub fn finalize(mut self, outcome: RunOutcome) -> StatusResult<StatusRecord> {
        let record = self.store.finalize(outcome)?;
        self.finalized = true;
        Ok(record)
    }

    fn fail_stage(&self, stage: StageId, message: &str) -> StatusResult<()> {
        let record = self.store.read()?;
        let state = record.stage(stage).state;
        if state == StageState::Pending {
            self.store.update(stage, StageState::Running, message, None)?;
        } else if state.is_terminal() {
            return Ok(());
        }
        self.store.update(stage, StageState::Error, message, None)?;
        Ok(())
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }

        let stage = match self.store.read() {
            Ok(record) if record.is_finalized() => return,
            Ok(record) => record.run.current_stage,
            Err(e) => {
                tracing::error!("Cannot read status record to close run {}: {}", self.run_id, e);
                None
            }
        };

        if let Some(stage) = stage {
            if let Err(e) = self.fail_stage(stage, INTERRUPTED) {
                tracing::error!("Cannot record interrupted stage {}: {}", stage, e);
            }
        }
        match self.store.finalize(RunOutcome::Failed) {
            Ok(_) => tracing::warn!("Run {} ended without finalizing; marked failed", self.run_id),
            Err(e) => tracing::error!("Cannot finalize run {}: {}", self.run_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finalize_closes_run() {
        let dir = tempdir().unwrap();
        let store = StatusStore::new(dir.path().join("status.json"));

        let guard = RunGuard::begin(&store, "run-1").unwrap();
        guard.start_stage(StageId::Ingest, "starting").unwrap();
        guard
            .apply(
                StageId::Ingest,
                StageUpdate::new(StageState::Success, "done").item_count(1),
            )
            .unwrap();
        guard.finalize(RunOutcome::Success).unwrap();

        let record = store.read().unwrap();
        assert!(record.is_finalized());
        assert_eq!(record.run.outcome, RunOutcome::Success);
        assert_eq!(record.run.run_id.as_deref(), Some("run-1"));
    }

    #[test]
    fn dropping_unfinalized_guard_marks_failure() {
        let dir = tempdir().unwrap();
        let store = StatusStore::new(dir.path().join("status.json"));

        {
            let guard = RunGuard::begin(&store, "run-2").unwrap();
            guard.start_stage(StageId::Transform, "working").unwrap();
        }

        let record = store.read().unwrap();
        assert!(!record.run.running);
        assert_eq!(record.run.outcome, RunOutcome::Failed);
        assert_eq!(record.run.current_stage, Some(StageId::Transform));
        let transform = record.stage(StageId::Transform);
        assert_eq!(transform.state, StageState::Error);
        assert_eq!(transform.message, INTERRUPTED);
    }

    #[test]
    fn panic_inside_run_still_finalizes() {
        let dir = tempdir().unwrap();
        let store = StatusStore::new(dir.path().join("status.json"));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let guard = RunGuard::begin(&store, "run-3").unwrap();
            guard.start_stage(StageId::Enrich, "working").unwrap();
            panic!("collaborator blew up");
        }));
        assert!(result.is_err());

        let record = store.read().unwrap();
        assert!(record.is_finalized());
        assert_eq!(record.stage(StageId::Enrich).state, StageState::Error);
    }

    #[test]
    fn abort_records_message_on_pending_stage() {
        let dir = tempdir().unwrap();
        let store = StatusStore::new(dir.path().join("status.json"));

        let guard = RunGuard::begin(&store, "run-4").unwrap();
        guard.abort(StageId::Ingest, "reset failed").unwrap();

        let record = store.read().unwrap();
        assert_eq!(record.stage(StageId::Ingest).state, StageState::Error);
        assert_eq!(record.stage(StageId::Ingest).message, "reset failed");
        assert_eq!(record.run.outcome, RunOutcome::Failed);
    }
}
