//! Pipeline stage identifiers.

use serde::{Deserialize, Serialize};

/// One of the four ordered pipeline stages.
///
/// Ordering follows execution order, so `StageId::Ingest < StageId::Publish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    /// Acquire new source items.
    Ingest,
    /// Resize/transcode acquired items.
    Transform,
    /// Transcribe and generate title/description.
    Enrich,
    /// Upload to the remote platform.
    Publish,
}

impl StageId {
    /// All stages in execution order.
    pub const ALL: [StageId; 4] = [
        StageId::Ingest,
        StageId::Transform,
        StageId::Enrich,
        StageId::Publish,
    ];

    /// Stable identifier used in the status record.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Ingest => "ingest",
            StageId::Transform => "transform",
            StageId::Enrich => "enrich",
            StageId::Publish => "publish",
        }
    }

    /// Human-readable label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            StageId::Ingest => "Ingest",
            StageId::Transform => "Transform",
            StageId::Enrich => "Enrich",
            StageId::Publish => "Publish",
        }
    }

    /// The stage that runs after this one.
    pub fn next(&self) -> Option<StageId> {
        match self {
            StageId::Ingest => Some(StageId::Transform),
            StageId::Transform => Some(StageId::Enrich),
            StageId::Enrich => Some(StageId::Publish),
            StageId::Publish => None,
        }
    }

    /// Parse from the status-record identifier.
    pub fn parse(s: &str) -> Option<StageId> {
        StageId::ALL.into_iter().find(|stage| stage.as_str() == s)
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
