//! Read-modify-write access to the status file.

use std::path::{Path, PathBuf};

use chrono::Local;

use super::{StatusError, StatusResult};
use crate::models::{RunOutcome, StageId, StageState, StatusRecord};
use crate::persist::{self, Loaded};

/// Fields to apply to one stage record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageUpdate {
    pub state: StageState,
    pub message: String,
    pub item_count: Option<u64>,
    pub skipped_count: Option<u64>,
    pub failed_count: Option<u64>,
}

impl StageUpdate {
    pub fn new(state: StageState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            item_count: None,
            skipped_count: None,
            failed_count: None,
        }
    }

    pub fn item_count(mut self, count: u64) -> Self {
        self.item_count = Some(count);
        self
    }

    pub fn counts(mut self, succeeded: u64, skipped: u64, failed: u64) -> Self {
        self.item_count = Some(succeeded);
        self.skipped_count = Some(skipped);
        self.failed_count = Some(failed);
        self
    }
}

/// Owner of the status file.
#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current record. A missing or corrupt file reads as the default record.
    pub fn read(&self) -> StatusResult<StatusRecord> {
        match persist::read_json::<StatusRecord>(&self.path) {
            Ok(Loaded::Present(record)) => Ok(record.normalize()),
            Ok(Loaded::Missing) => Ok(StatusRecord::default()),
            Ok(Loaded::Corrupt(reason)) => {
                tracing::warn!(
                    "Status record {} is corrupt ({}), starting from defaults",
                    self.path.display(),
                    reason
                );
                Ok(StatusRecord::default())
            }
            Err(source) => Err(StatusError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Start a new run: every stage pending, `running = true`.
    pub fn begin_run(&self, run_id: &str) -> StatusResult<StatusRecord> {
        let mut record = StatusRecord::default();
        record.run.run_id = Some(run_id.to_string());
        record.run.started_at = Some(Local::now());
        record.run.running = true;
        self.write(record)
    }

    /// Set a stage's state and message, and its item count when given.
    pub fn update(
        &self,
        stage: StageId,
        state: StageState,
        message: &str,
        count: Option<u64>,
    ) -> StatusResult<StatusRecord> {
        let mut change = StageUpdate::new(state, message);
        change.item_count = count;
        self.apply(stage, change)
    }

    /// Apply a stage update.
    ///
    /// Only the targeted stage plus `current_stage` and `running` change.
    /// Backwards transitions and writes after finalize are rejected.
    pub fn apply(&self, stage: StageId, change: StageUpdate) -> StatusResult<StatusRecord> {
        let mut record = self.read()?;
        if record.is_finalized() {
            return Err(StatusError::Finalized);
        }

        let now = Local::now();
        let slot = record.stages.get_mut(stage);
        if !slot.state.can_transition_to(change.state) {
            return Err(StatusError::InvalidTransition {
                stage,
                from: slot.state,
                to: change.state,
            });
        }

        if slot.state == StageState::Pending {
            slot.started_at = Some(now);
        }
        if change.state.is_terminal() {
            slot.ended_at = Some(now);
        }
        slot.state = change.state;
        slot.message = change.message;
        if let Some(count) = change.item_count {
            slot.item_count = count;
        }
        if let Some(count) = change.skipped_count {
            slot.skipped_count = count;
        }
        if let Some(count) = change.failed_count {
            slot.failed_count = count;
        }

        record.run.current_stage = Some(stage);
        record.run.running = true;
        self.write(record)
    }

    /// Close the run with its terminal outcome.
    ///
    /// A successful or partial run clears `current_stage`. A failed run
    /// keeps it so the halted stage stays identifiable.
    pub fn finalize(&self, outcome: RunOutcome) -> StatusResult<StatusRecord> {
        let mut record = self.read()?;
        if record.is_finalized() {
            return Err(StatusError::Finalized);
        }

        record.run.running = false;
        record.run.ended_at = Some(Local::now());
        record.run.outcome = outcome;
        if outcome != RunOutcome::Failed {
            record.run.current_stage = None;
        }
        self.write(record)
    }

    /// Put every stage back to pending and clear the run flags.
    pub fn reset_status(&self) -> StatusResult<StatusRecord> {
        self.write(StatusRecord::default())
    }

    fn write(&self, mut record: StatusRecord) -> StatusResult<StatusRecord> {
        record.updated_at = Some(Local::now());
        persist::write_json_atomic(&self.path, &record).map_err(|source| StatusError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> StatusStore {
        StatusStore::new(dir.join("pipeline_status.json"))
    }

    #[test]
    fn update_on_missing_file_creates_default_first() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let record = store
            .update(StageId::Ingest, StageState::Running, "Downloading", None)
            .unwrap();

        assert!(store.path().exists());
        assert_eq!(record.stage(StageId::Ingest).state, StageState::Running);
        assert_eq!(record.stage(StageId::Transform).state, StageState::Pending);
        assert!(record.run.running);
    }

    #[test]
    fn read_reflects_update_and_nothing_else() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.begin_run("run-1").unwrap();
        store
            .update(StageId::Ingest, StageState::Running, "go", None)
            .unwrap();
        let before = store.read().unwrap();

        store
            .update(StageId::Ingest, StageState::Success, "Downloaded 2", Some(2))
            .unwrap();
        let after = store.read().unwrap();

        let ingest = after.stage(StageId::Ingest);
        assert_eq!(ingest.state, StageState::Success);
        assert_eq!(ingest.message, "Downloaded 2");
        assert_eq!(ingest.item_count, 2);
        assert_eq!(after.run.current_stage, Some(StageId::Ingest));
        assert_eq!(after.run.run_id, before.run.run_id);
        assert_eq!(after.run.started_at, before.run.started_at);
        for stage in [StageId::Transform, StageId::Enrich, StageId::Publish] {
            assert_eq!(after.stage(stage), before.stage(stage));
        }
    }

    #[test]
    fn count_is_left_alone_when_not_given() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store
            .update(StageId::Enrich, StageState::Running, "a", Some(4))
            .unwrap();
        let record = store
            .update(StageId::Enrich, StageState::Running, "b", None)
            .unwrap();
        assert_eq!(record.stage(StageId::Enrich).item_count, 4);
    }

    #[test]
    fn transitions_never_revert() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.begin_run("run").unwrap();

        assert!(matches!(
            store.update(StageId::Publish, StageState::Success, "", None),
            Err(StatusError::InvalidTransition { .. })
        ));

        store
            .update(StageId::Publish, StageState::Running, "", None)
            .unwrap();
        store
            .update(StageId::Publish, StageState::Error, "boom", None)
            .unwrap();
        assert!(matches!(
            store.update(StageId::Publish, StageState::Running, "", None),
            Err(StatusError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn finalize_is_terminal() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.begin_run("run").unwrap();
        store
            .update(StageId::Ingest, StageState::Running, "", None)
            .unwrap();

        let record = store.finalize(RunOutcome::Success).unwrap();
        assert!(!record.run.running);
        assert!(record.run.ended_at.is_some());
        assert_eq!(record.run.current_stage, None);

        assert!(matches!(
            store.finalize(RunOutcome::Failed),
            Err(StatusError::Finalized)
        ));
        assert!(matches!(
            store.update(StageId::Transform, StageState::Running, "", None),
            Err(StatusError::Finalized)
        ));
    }

    #[test]
    fn failed_finalize_keeps_current_stage() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.begin_run("run").unwrap();
        store
            .update(StageId::Enrich, StageState::Running, "", None)
            .unwrap();
        store
            .update(StageId::Enrich, StageState::Error, "no text", None)
            .unwrap();

        let record = store.finalize(RunOutcome::Failed).unwrap();
        assert_eq!(record.run.current_stage, Some(StageId::Enrich));
        assert_eq!(record.stage(StageId::Enrich).message, "no text");
    }

    #[test]
    fn corrupt_file_reads_as_default() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.path(), "{\"running\": tru").unwrap();

        let record = store.read().unwrap();
        assert_eq!(record, StatusRecord::default());
    }

    #[test]
    fn unreadable_location_is_an_infrastructure_error() {
        let dir = tempdir().unwrap();
        let store = StatusStore::new(dir.path());
        assert!(matches!(store.read(), Err(StatusError::Read { .. })));
    }

    #[test]
    fn reset_status_clears_run() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.begin_run("run").unwrap();
        store
            .update(StageId::Ingest, StageState::Running, "", None)
            .unwrap();

        let record = store.reset_status().unwrap();
        assert!(!record.run.running);
        assert!(record
            .stages
            .iter()
            .all(|stage| stage.state == StageState::Pending));
    }
}
