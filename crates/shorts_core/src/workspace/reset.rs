//! Workspace Reset: clear in-flight items before a run.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::layout::WorkspaceLayout;
use crate::dedup::{DedupError, DedupTracker, Namespace};
use crate::models::StageId;
use crate::status::{StatusError, StatusStore};

/// Errors from a workspace reset.
#[derive(Error, Debug)]
pub enum ResetError {
    #[error("a run is in progress (stage '{0}'); reset is only allowed before ingest")]
    RunInProgress(StageId),

    #[error("failed to clear {path}: {source}")]
    Clear {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    Dedup(#[from] DedupError),
}

/// What a reset removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    /// Entries removed from the transient directories.
    pub removed_entries: usize,
    /// Dedup namespaces that were cleared.
    pub cleared_namespaces: Vec<Namespace>,
}

/// Clears stage-transient directories and optionally the dedup records.
pub struct WorkspaceReset<'a> {
    layout: &'a WorkspaceLayout,
    status: &'a StatusStore,
    dedup: &'a DedupTracker,
}

impl<'a> WorkspaceReset<'a> {
    pub fn new(layout: &'a WorkspaceLayout, status: &'a StatusStore, dedup: &'a DedupTracker) -> Self {
        Self {
            layout,
            status,
            dedup,
        }
    }

    /// Reset the workspace.
    ///
    /// Rejected once any stage of the current run has started.
    pub fn reset(&self, clear_dedup: bool) -> Result<ResetReport, ResetError> {
        let record = self.status.read()?;
        if record.run.running {
            if let Some(stage) = record.run.current_stage {
                return Err(ResetError::RunInProgress(stage));
            }
        }

        let mut report = ResetReport::default();
        for dir in self.layout.transient_dirs() {
            report.removed_entries += clear_dir(&dir).map_err(|source| ResetError::Clear {
                path: dir.clone(),
                source,
            })?;
        }

        if clear_dedup {
            for namespace in Namespace::ALL {
                self.dedup.reset(namespace)?;
                report.cleared_namespaces.push(namespace);
            }
        }

        tracing::info!(
            "Workspace reset: removed {} entries, cleared {} dedup namespaces",
            report.removed_entries,
            report.cleared_namespaces.len()
        );
        Ok(report)
    }
}

/// Remove everything inside `dir`, leaving it empty (created if missing).
fn clear_dir(dir: &std::path::Path) -> io::Result<usize> {
    let mut removed = 0;
    match fs::read_dir(dir) {
        Ok(entries) => {
            for entry in entries {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    fs::remove_dir_all(entry.path())?;
                } else {
                    fs::remove_file(entry.path())?;
                }
                removed += 1;
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)?;
    Ok(removed)
}
