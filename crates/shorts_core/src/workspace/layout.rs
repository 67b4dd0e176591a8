//! Directory layout of the workspace.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::StageId;

/// File extensions treated as videos.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov", "m4v"];

/// Stage directories under one root.
///
/// ```text
/// <root>/incoming              acquisition scratch
/// <root>/raw                   ingest output / transform input
/// <root>/edited                transform scratch
/// <root>/final                 transform output / enrich input
/// <root>/ready                 enrich output / publish input (video + .json)
/// <root>/uploaded              publish archive
/// <root>/processed/audio
/// <root>/processed/transcripts
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn incoming(&self) -> PathBuf {
        self.root.join("incoming")
    }

    pub fn raw(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn edited(&self) -> PathBuf {
        self.root.join("edited")
    }

    pub fn final_dir(&self) -> PathBuf {
        self.root.join("final")
    }

    pub fn ready(&self) -> PathBuf {
        self.root.join("ready")
    }

    pub fn uploaded(&self) -> PathBuf {
        self.root.join("uploaded")
    }

    pub fn processed_audio(&self) -> PathBuf {
        self.root.join("processed").join("audio")
    }

    pub fn processed_transcripts(&self) -> PathBuf {
        self.root.join("processed").join("transcripts")
    }

    /// Directory a stage reads file items from (`None` for ingest, which reads sources).
    pub fn stage_input(&self, stage: StageId) -> Option<PathBuf> {
        match stage {
            StageId::Ingest => None,
            StageId::Transform => Some(self.raw()),
            StageId::Enrich => Some(self.final_dir()),
            StageId::Publish => Some(self.ready()),
        }
    }

    /// Directory a stage hands its succeeded items to.
    pub fn stage_output(&self, stage: StageId) -> PathBuf {
        match stage {
            StageId::Ingest => self.raw(),
            StageId::Transform => self.final_dir(),
            StageId::Enrich => self.ready(),
            StageId::Publish => self.uploaded(),
        }
    }

    /// Directories holding in-flight items (cleared by a workspace reset).
    pub fn transient_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.incoming(),
            self.raw(),
            self.edited(),
            self.final_dir(),
            self.ready(),
        ]
    }

    /// Every directory of the layout.
    pub fn all_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.transient_dirs();
        dirs.push(self.uploaded());
        dirs.push(self.processed_audio());
        dirs.push(self.processed_transcripts());
        dirs
    }

    /// Create every directory of the layout.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in self.all_dirs() {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Whether `path` has a video extension.
pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}
