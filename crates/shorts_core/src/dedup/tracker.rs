//! Durable fingerprint sets, one file per namespace.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::fingerprint::{Fingerprint, Fingerprinted};
use super::{DedupError, DedupResult, Namespace};
use crate::persist::{self, Loaded};

/// When a fingerprint was recorded and what it produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    /// `None` for entries imported from legacy id lists.
    #[serde(default)]
    pub marked_at: Option<DateTime<Local>>,
    /// Result of processing (e.g. the remote video id).
    #[serde(default)]
    pub result_ref: Option<String>,
}

/// On-disk shape of one namespace.
///
/// The flat legacy lists are still written so older readers keep counting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RecordFile {
    #[serde(default)]
    entries: BTreeMap<String, FingerprintEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    downloaded_videos: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uploaded_hashes: Option<Vec<String>>,
    #[serde(default)]
    last_updated: Option<DateTime<Local>>,
}

impl RecordFile {
    /// Fold legacy id lists into `entries`.
    fn merge_legacy(mut self) -> Self {
        let legacy = self
            .downloaded_videos
            .take()
            .into_iter()
            .chain(self.uploaded_hashes.take())
            .flatten();
        for id in legacy {
            self.entries.entry(id).or_default();
        }
        self
    }

    fn for_write(&self, namespace: Namespace) -> Self {
        let ids: Vec<String> = self.entries.keys().cloned().collect();
        let mut out = Self {
            entries: self.entries.clone(),
            downloaded_videos: None,
            uploaded_hashes: None,
            last_updated: self.last_updated,
        };
        match namespace {
            Namespace::Acquired => out.downloaded_videos = Some(ids),
            Namespace::Published => out.uploaded_hashes = Some(ids),
        }
        out
    }
}

/// Tracks which items each stage has already handled.
///
/// Reads fail open: a missing, corrupt, or unreadable record is treated as
/// empty. Writes are atomic and their failures are returned to the caller.
pub struct DedupTracker {
    state_dir: PathBuf,
    cache: Mutex<HashMap<Namespace, RecordFile>>,
}

impl DedupTracker {
    /// Tracker storing its records under `state_dir`.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Path of a namespace's record file.
    pub fn record_path(&self, namespace: Namespace) -> PathBuf {
        self.state_dir.join(namespace.file_name())
    }

    /// Whether `fingerprint` was marked in `namespace`. Never fails.
    pub fn is_known(&self, namespace: Namespace, fingerprint: &Fingerprint) -> bool {
        let mut cache = self.cache.lock();
        self.loaded(&mut cache, namespace)
            .entries
            .contains_key(fingerprint.as_str())
    }

    /// Record `fingerprint` in `namespace`.
    ///
    /// Returns `Ok(false)` without writing when it is already present.
    pub fn mark(
        &self,
        namespace: Namespace,
        fingerprint: &Fingerprint,
        result_ref: Option<&str>,
    ) -> DedupResult<bool> {
        let mut cache = self.cache.lock();
        let current = self.loaded(&mut cache, namespace);
        if current.entries.contains_key(fingerprint.as_str()) {
            return Ok(false);
        }

        let mut updated = current.clone();
        let now = Local::now();
        updated.entries.insert(
            fingerprint.as_str().to_string(),
            FingerprintEntry {
                marked_at: Some(now),
                result_ref: result_ref.map(str::to_string),
            },
        );
        updated.last_updated = Some(now);

        self.write(namespace, &updated)?;
        tracing::debug!("Marked {} in {}", fingerprint, namespace);
        cache.insert(namespace, updated);
        Ok(true)
    }

    /// Compute the fingerprint of a source or file item.
    pub fn compute_fingerprint<T: Fingerprinted + ?Sized>(&self, item: &T) -> DedupResult<Fingerprint> {
        item.fingerprint().map_err(DedupError::Fingerprint)
    }

    /// Clear every fingerprint in `namespace`.
    pub fn reset(&self, namespace: Namespace) -> DedupResult<()> {
        let mut cache = self.cache.lock();
        let empty = RecordFile {
            last_updated: Some(Local::now()),
            ..Default::default()
        };
        self.write(namespace, &empty)?;
        tracing::info!("Cleared {} fingerprints", namespace);
        cache.insert(namespace, empty);
        Ok(())
    }

    /// Number of fingerprints in `namespace`.
    pub fn count(&self, namespace: Namespace) -> usize {
        let mut cache = self.cache.lock();
        self.loaded(&mut cache, namespace).entries.len()
    }

    /// Entry recorded for `fingerprint`, if any.
    pub fn entry(&self, namespace: Namespace, fingerprint: &Fingerprint) -> Option<FingerprintEntry> {
        let mut cache = self.cache.lock();
        self.loaded(&mut cache, namespace)
            .entries
            .get(fingerprint.as_str())
            .cloned()
    }

    /// When `namespace` was last written.
    pub fn last_updated(&self, namespace: Namespace) -> Option<DateTime<Local>> {
        let mut cache = self.cache.lock();
        self.loaded(&mut cache, namespace).last_updated
    }

    fn loaded<'a>(
        &self,
        cache: &'a mut HashMap<Namespace, RecordFile>,
        namespace: Namespace,
    ) -> &'a RecordFile {
        cache
            .entry(namespace)
            .or_insert_with(|| load_record(&self.record_path(namespace), namespace))
    }

    fn write(&self, namespace: Namespace, record: &RecordFile) -> DedupResult<()> {
        let path = self.record_path(namespace);
        persist::write_json_atomic(&path, &record.for_write(namespace))
            .map_err(|source| DedupError::Write { namespace, path, source })
    }
}

fn load_record(path: &Path, namespace: Namespace) -> RecordFile {
    match persist::read_json::<RecordFile>(path) {
        Ok(Loaded::Present(record)) => record.merge_legacy(),
        Ok(Loaded::Missing) => RecordFile::default(),
        Ok(Loaded::Corrupt(reason)) => {
            tracing::warn!(
                "Dedup record {} is corrupt ({}), treating {} as empty",
                path.display(),
                reason,
                namespace
            );
            RecordFile::default()
        }
        Err(e) => {
            tracing::warn!(
                "Could not read dedup record {} ({}), treating {} as empty",
                path.display(),
                e,
                namespace
            );
            RecordFile::default()
        }
    }
}
