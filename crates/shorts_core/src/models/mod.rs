//! Data models for the shorts pipeline.
//!
//! This module contains the core data structures shared across the crate:
//! - Stage identifiers
//! - The persisted status record (run + per-stage records)
//! - Work items handed from stage to stage

mod stage;
mod status;
mod work_item;

pub use stage::StageId;
pub use status::{PipelineRun, RunOutcome, StageRecord, StageRecords, StageState, StatusRecord};
pub use work_item::{sidecar_path_for, VideoMetadata, WorkItem};
