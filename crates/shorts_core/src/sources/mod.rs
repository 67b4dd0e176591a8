//! Source identifiers and the source list file.
//!
//! Sources are URLs kept one per line in a text file. Each valid URL has
//! a derived stable id (its trailing path segment) that the acquired
//! dedup namespace is keyed on.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use url::Url;

use crate::config::SourceSettings;
use crate::persist;

/// Why a source line was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("not a valid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),

    #[error("host '{0}' is not in the allowed hosts")]
    HostNotAllowed(String),

    #[error("path does not contain '{0}'")]
    MissingPathMarker(String),

    #[error("URL has no trailing path segment to identify it")]
    MissingId,
}

/// Validation rules applied to source URLs.
#[derive(Debug, Clone, Default)]
pub struct SourceRules {
    /// Accepted hosts (subdomains included). Empty accepts any host.
    pub allowed_hosts: Vec<String>,
    /// Substring the URL path must contain. Empty disables the check.
    pub path_marker: String,
}

impl From<&SourceSettings> for SourceRules {
    fn from(settings: &SourceSettings) -> Self {
        Self {
            allowed_hosts: settings.allowed_hosts.clone(),
            path_marker: settings.path_marker.clone(),
        }
    }
}

/// A validated source identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef {
    /// Cleaned URL (no query string or fragment).
    pub url: String,
    /// Stable id derived from the URL.
    pub id: String,
}

impl SourceRef {
    /// Validate and clean a URL.
    pub fn parse(raw: &str, rules: &SourceRules) -> Result<Self, SourceError> {
        let raw = raw.trim();
        let mut url = Url::parse(raw).map_err(|_| SourceError::InvalidUrl(raw.to_string()))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SourceError::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if !rules.allowed_hosts.is_empty() && !rules.allowed_hosts.iter().any(|h| host_matches(&host, h)) {
            return Err(SourceError::HostNotAllowed(host));
        }

        if !rules.path_marker.is_empty() && !url.path().contains(&rules.path_marker) {
            return Err(SourceError::MissingPathMarker(rules.path_marker.clone()));
        }

        url.set_query(None);
        url.set_fragment(None);

        let id = derive_id(&url).ok_or(SourceError::MissingId)?;

        Ok(Self {
            url: url.to_string(),
            id,
        })
    }
}

/// Whether `host` is `allowed` or one of its subdomains.
fn host_matches(host: &str, allowed: &str) -> bool {
    let allowed = allowed.trim().to_ascii_lowercase();
    host == allowed || host.ends_with(&format!(".{}", allowed))
}

/// Trailing non-empty path segment of a URL.
fn derive_id(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(|segment| segment.to_string())
}

/// Strip query string and fragment from a URL string, leaving it otherwise untouched.
pub fn clean_url(raw: &str) -> String {
    let raw = raw.trim();
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    raw[..end].to_string()
}

/// A line from the source file that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedSource {
    /// 1-based line number.
    pub line: usize,
    /// The raw line.
    pub text: String,
    /// Why it was rejected.
    pub reason: SourceError,
}

/// Parsed contents of the source list file.
#[derive(Debug, Clone, Default)]
pub struct SourceList {
    /// Valid sources in file order.
    pub sources: Vec<SourceRef>,
    /// Invalid lines.
    pub rejected: Vec<RejectedSource>,
}

impl SourceList {
    /// Parse source list text (blank lines and `#` comments are ignored).
    pub fn parse(content: &str, rules: &SourceRules) -> Self {
        let mut list = SourceList::default();

        for (index, line) in content.lines().enumerate() {
            let text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            match SourceRef::parse(text, rules) {
                Ok(source) => list.sources.push(source),
                Err(reason) => list.rejected.push(RejectedSource {
                    line: index + 1,
                    text: text.to_string(),
                    reason,
                }),
            }
        }

        list
    }

    /// Load the source list file. A missing file is an empty list.
    pub fn load(path: &Path, rules: &SourceRules) -> io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content, rules)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Append valid, not-yet-listed URLs to the file.
    ///
    /// Returns the sources that were added and the inputs that were rejected.
    pub fn append(
        path: &Path,
        urls: &[String],
        rules: &SourceRules,
    ) -> io::Result<(Vec<SourceRef>, Vec<(String, SourceError)>)> {
        let existing = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        let current = Self::parse(&existing, rules);

        let mut added: Vec<SourceRef> = Vec::new();
        let mut rejected = Vec::new();
        for raw in urls {
            match SourceRef::parse(raw, rules) {
                Ok(source) => {
                    let known = current.sources.iter().chain(added.iter()).any(|s| s.url == source.url);
                    if !known {
                        added.push(source);
                    }
                }
                Err(reason) => rejected.push((raw.clone(), reason)),
            }
        }

        if !added.is_empty() {
            let mut content = existing;
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            for source in &added {
                content.push_str(&source.url);
                content.push('\n');
            }
            persist::atomic_write(path, content.as_bytes())?;
        }

        Ok((added, rejected))
    }
}
