//! Duplicate tracking for the acquire and publish stages.
//!
//! Each [`Namespace`] is an independent, durable set of [`Fingerprint`]s.
//! A fingerprint present in a namespace means that stage must never
//! process the item again until the namespace is explicitly reset.

mod fingerprint;
mod tracker;

pub use fingerprint::{content_hash, Fingerprint, Fingerprinted};
pub use tracker::{DedupTracker, FingerprintEntry};

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An independent fingerprint set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Sources already downloaded (keyed by derived source id).
    Acquired,
    /// Files already uploaded (keyed by content hash).
    Published,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Acquired, Namespace::Published];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Acquired => "acquired",
            Namespace::Published => "published",
        }
    }

    /// Record file name inside the state directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Namespace::Acquired => "acquired.json",
            Namespace::Published => "published.json",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the dedup tracker.
#[derive(Error, Debug)]
pub enum DedupError {
    #[error("failed to write {namespace} record {path}: {source}")]
    Write {
        namespace: Namespace,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to compute fingerprint: {0}")]
    Fingerprint(#[source] io::Error),
}

pub type DedupResult<T> = Result<T, DedupError>;
