//! Fingerprints: stable identities for already-handled items.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::WorkItem;
use crate::sources::SourceRef;

/// A content hash or a derived stable id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Anything a fingerprint can be computed for.
pub trait Fingerprinted {
    fn fingerprint(&self) -> io::Result<Fingerprint>;
}

/// Sources are identified by the id derived from their URL.
impl Fingerprinted for SourceRef {
    fn fingerprint(&self) -> io::Result<Fingerprint> {
        Ok(Fingerprint::new(self.id.clone()))
    }
}

/// Files are identified by their content, so a byte-identical re-download
/// under another name still matches.
impl Fingerprinted for WorkItem {
    fn fingerprint(&self) -> io::Result<Fingerprint> {
        content_hash(&self.path)
    }
}

impl Fingerprinted for Path {
    fn fingerprint(&self) -> io::Result<Fingerprint> {
        content_hash(self)
    }
}

/// MD5 of a file's contents as lowercase hex.
pub fn content_hash(path: &Path) -> io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = [0u8; 4096];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }

    Ok(Fingerprint::new(format!("{:x}", context.compute())))
}
