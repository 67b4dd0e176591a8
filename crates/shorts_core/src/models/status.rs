//! Persisted pipeline status: the run record plus one record per stage.
//!
//! Every field carries a serde default so a status file written by an
//! older build (or hand-edited) still loads; unknown fields are ignored.
//! An unrecognized enum value falls back to that field's default instead of
//! failing the whole document.

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::stage::StageId;

/// State of a single stage within one run.
///
/// Transitions only move forward: `Pending -> Running -> {Success, Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    /// Not started in this run.
    #[default]
    Pending,
    /// Currently executing.
    #[serde(alias = "processing")]
    Running,
    /// Finished and produced its output.
    Success,
    /// Halted with an error.
    Error,
}

impl StageState {
    /// Get display string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// Whether moving from `self` to `next` is allowed within one run.
    ///
    /// `Running -> Running` is accepted so a stage can refresh its message.
    pub fn can_transition_to(&self, next: StageState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Running)
                | (Self::Running, Self::Success)
                | (Self::Running, Self::Error)
        )
    }

    /// Whether this is a terminal state for the stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// All stages completed with no failed items.
    Success,
    /// The run aborted.
    Failed,
    /// All stages completed but some items failed.
    Partial,
    /// Not finalized (running, never run, or the record was reset).
    #[default]
    Unknown,
}

impl RunOutcome {
    /// Get display string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Partial => "partial",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-level part of the status record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Identifier of the run (also names its log file).
    #[serde(default)]
    pub run_id: Option<String>,
    /// When the run started.
    #[serde(default)]
    pub started_at: Option<DateTime<Local>>,
    /// When the run was finalized.
    #[serde(default)]
    pub ended_at: Option<DateTime<Local>>,
    /// Whether a run is in progress.
    #[serde(default)]
    pub running: bool,
    /// The stage currently (or last) executing.
    #[serde(default, deserialize_with = "lenient")]
    pub current_stage: Option<StageId>,
    /// Terminal outcome.
    #[serde(default, deserialize_with = "lenient")]
    pub outcome: RunOutcome,
}

/// Status of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Which stage this record describes.
    #[serde(default = "placeholder_stage", deserialize_with = "lenient_stage")]
    pub stage_id: StageId,
    /// Current state.
    #[serde(default, deserialize_with = "lenient")]
    pub state: StageState,
    /// Last message (error text when `state == Error`).
    #[serde(default)]
    pub message: String,
    /// Number of items the stage produced.
    #[serde(default)]
    pub item_count: u64,
    /// Items skipped as already handled.
    #[serde(default)]
    pub skipped_count: u64,
    /// Items that failed individually.
    #[serde(default)]
    pub failed_count: u64,
    /// When the stage started running.
    #[serde(default)]
    pub started_at: Option<DateTime<Local>>,
    /// When the stage reached a terminal state.
    #[serde(default)]
    pub ended_at: Option<DateTime<Local>>,
}

fn placeholder_stage() -> StageId {
    StageId::Ingest
}

/// Deserialize `T`, or its default when the stored value is not one `T` knows.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn lenient_stage<'de, D>(deserializer: D) -> Result<StageId, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(StageId::deserialize(value).unwrap_or_else(|_| placeholder_stage()))
}

impl StageRecord {
    /// A pending record for `stage_id`.
    pub fn pending(stage_id: StageId) -> Self {
        Self {
            stage_id,
            state: StageState::Pending,
            message: String::new(),
            item_count: 0,
            skipped_count: 0,
            failed_count: 0,
            started_at: None,
            ended_at: None,
        }
    }
}

/// The four stage records, one named slot per stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecords {
    #[serde(default = "pending_ingest")]
    pub ingest: StageRecord,
    #[serde(default = "pending_transform")]
    pub transform: StageRecord,
    #[serde(default = "pending_enrich")]
    pub enrich: StageRecord,
    #[serde(default = "pending_publish")]
    pub publish: StageRecord,
}

fn pending_ingest() -> StageRecord {
    StageRecord::pending(StageId::Ingest)
}

fn pending_transform() -> StageRecord {
    StageRecord::pending(StageId::Transform)
}

fn pending_enrich() -> StageRecord {
    StageRecord::pending(StageId::Enrich)
}

fn pending_publish() -> StageRecord {
    StageRecord::pending(StageId::Publish)
}

impl Default for StageRecords {
    fn default() -> Self {
        Self {
            ingest: pending_ingest(),
            transform: pending_transform(),
            enrich: pending_enrich(),
            publish: pending_publish(),
        }
    }
}

impl StageRecords {
    /// Get the record for a stage.
    pub fn get(&self, stage: StageId) -> &StageRecord {
        match stage {
            StageId::Ingest => &self.ingest,
            StageId::Transform => &self.transform,
            StageId::Enrich => &self.enrich,
            StageId::Publish => &self.publish,
        }
    }

    /// Get a mutable record for a stage.
    pub fn get_mut(&mut self, stage: StageId) -> &mut StageRecord {
        match stage {
            StageId::Ingest => &mut self.ingest,
            StageId::Transform => &mut self.transform,
            StageId::Enrich => &mut self.enrich,
            StageId::Publish => &mut self.publish,
        }
    }

    /// Records in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &StageRecord> {
        [&self.ingest, &self.transform, &self.enrich, &self.publish].into_iter()
    }
}

/// The whole persisted status document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Run-level fields (flattened into the top level of the document).
    #[serde(flatten)]
    pub run: PipelineRun,
    /// Per-stage records.
    #[serde(default)]
    pub stages: StageRecords,
    /// Last time the record was written.
    #[serde(default)]
    pub updated_at: Option<DateTime<Local>>,
}

impl StatusRecord {
    /// Fix up a freshly loaded record so each slot names its own stage.
    pub fn normalize(mut self) -> Self {
        for stage in StageId::ALL {
            self.stages.get_mut(stage).stage_id = stage;
        }
        self
    }

    /// Whether the run has been finalized (no further mutation allowed).
    pub fn is_finalized(&self) -> bool {
        !self.run.running && self.run.ended_at.is_some()
    }

    /// Get the record for a stage.
    pub fn stage(&self, stage: StageId) -> &StageRecord {
        self.stages.get(stage)
    }
}
