//! Work items flowing between stages.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Title/description/tags generated for an item (the `.json` sidecar).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A file moving through the pipeline plus its stage-specific sidecar data.
///
/// The stage currently processing an item owns it. When the stage's
/// collaborator succeeds the item is relocated into the next stage's input
/// directory and handed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// File name (the sort key for stage ordering).
    pub name: String,
    /// Current location on disk.
    pub path: PathBuf,
    /// Stable source id the item was acquired from, if known.
    pub source_id: Option<String>,
    /// Generated metadata (after enrich).
    pub metadata: Option<VideoMetadata>,
    /// Transcript or extracted text (after enrich).
    pub transcript: Option<String>,
    /// Remote identifier (after publish).
    pub remote_id: Option<String>,
}

impl WorkItem {
    /// Create an item for a file.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self {
            name,
            path,
            source_id: None,
            metadata: None,
            transcript: None,
            remote_id: None,
        }
    }

    /// Set the source id.
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Set the metadata.
    pub fn with_metadata(mut self, metadata: VideoMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// File name without extension.
    pub fn stem(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Path of the metadata sidecar next to the file.
    pub fn sidecar_path(&self) -> PathBuf {
        sidecar_path_for(&self.path)
    }

    /// Same item at a new location (file name may change).
    pub fn moved_to(&self, path: PathBuf) -> Self {
        let mut moved = self.clone();
        moved.name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.name.clone());
        moved.path = path;
        moved
    }
}

/// Sidecar path for a media file (`clip.mp4` -> `clip.json`).
pub fn sidecar_path_for(path: &Path) -> PathBuf {
    path.with_extension("json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_names_come_from_file_name() {
        let item = WorkItem::from_path("/work/final/abc123.mp4");
        assert_eq!(item.name, "abc123.mp4");
        assert_eq!(item.stem(), "abc123");
        assert_eq!(item.sidecar_path(), PathBuf::from("/work/final/abc123.json"));
    }

    #[test]
    fn moved_item_keeps_sidecar_data() {
        let item = WorkItem::from_path("/a/clip.webm")
            .with_source_id("clip")
            .with_metadata(VideoMetadata {
                title: "T".into(),
                ..Default::default()
            });
        let moved = item.moved_to(PathBuf::from("/b/clip.mp4"));
        assert_eq!(moved.name, "clip.mp4");
        assert_eq!(moved.source_id.as_deref(), Some("clip"));
        assert_eq!(moved.metadata.unwrap().title, "T");
    }

    #[test]
    fn legacy_sidecar_without_tags_loads() {
        let meta: VideoMetadata =
            serde_json::from_str(r#"{"title": "Hi", "description": "There #tech"}"#).unwrap();
        assert!(meta.tags.is_empty());
        assert_eq!(meta.title, "Hi");
    }
}
