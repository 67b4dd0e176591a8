//! Production collaborators: the external tools and services each stage calls.
//!
//! | Stage     | Collaborator          | Backend                        |
//! |-----------|-----------------------|--------------------------------|
//! | ingest    | [`YtDlpAcquirer`]     | `yt-dlp`                       |
//! | transform | [`FfmpegTranscoder`]  | `ffmpeg`                       |
//! | enrich    | [`OpenAiEnricher`]    | `ffmpeg` + transcription + LLM |
//! | publish   | [`YouTubePublisher`]  | YouTube Data API v3            |

mod acquire;
mod enrich;
pub mod metadata;
mod openai;
mod process;
mod publish;
mod transform;

pub use acquire::YtDlpAcquirer;
pub use enrich::OpenAiEnricher;
pub use openai::OpenAiClient;
pub use process::{format_command, run_tool, ToolOutput};
pub use publish::{YouTubeEndpoints, YouTubePublisher};
pub use transform::FfmpegTranscoder;

use std::time::Duration;

use crate::config::Settings;
use crate::orchestrator::{CollaboratorError, CollaboratorResult, Collaborators};

/// The production collaborator set for `settings`.
pub fn production(settings: &Settings) -> Collaborators {
    Collaborators {
        acquire: Box::new(YtDlpAcquirer::new(settings.acquire.clone())),
        transform: Box::new(FfmpegTranscoder::new(settings.transform.clone())),
        enrich: Box::new(OpenAiEnricher::new(
            settings.enrich.clone(),
            settings.transform.ffmpeg_path.clone(),
        )),
        publish: Box::new(YouTubePublisher::new(settings.publish.clone())),
    }
}

/// Read a credential from the environment variable `name`.
pub(crate) fn credential(name: &str) -> CollaboratorResult<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(CollaboratorError::MissingCredential(name.to_string())),
    }
}

/// Build a blocking HTTP client with an optional overall timeout.
pub(crate) fn http_client(
    service: &str,
    timeout: Option<Duration>,
) -> CollaboratorResult<reqwest::blocking::Client> {
    let mut builder = reqwest::blocking::Client::builder();
    if let Some(limit) = timeout {
        builder = builder.timeout(limit);
    }
    builder
        .build()
        .map_err(|e| CollaboratorError::http(service, e.to_string()))
}

/// Map a transport error, keeping timeouts distinct.
pub(crate) fn transport_error(
    service: &str,
    timeout: Option<Duration>,
    err: reqwest::Error,
) -> CollaboratorError {
    match (err.is_timeout(), timeout) {
        (true, Some(limit)) => CollaboratorError::timeout(service, limit),
        _ => CollaboratorError::http(service, err.to_string()),
    }
}

/// Turn a non-success response into an error carrying the body text.
pub(crate) fn check_status(
    service: &str,
    response: reqwest::blocking::Response,
) -> CollaboratorResult<reqwest::blocking::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let detail = body.trim();
    let message = if detail.is_empty() {
        format!("status {}", status)
    } else {
        format!("status {}: {}", status, truncate(detail, 300))
    };
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(CollaboratorError::NotFound(format!("{}: {}", service, message)));
    }
    Err(CollaboratorError::http(service, message))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
