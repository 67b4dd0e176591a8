//! Publish collaborator: resumable upload to YouTube.

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::metadata::extract_hashtags;
use super::{check_status, credential, http_client, transport_error};
use crate::config::PublishSettings;
use crate::models::{VideoMetadata, WorkItem};
use crate::orchestrator::{Collaborator, CollaboratorError, CollaboratorResult, Context};

const SERVICE: &str = "youtube";

/// YouTube caps titles at 100 characters.
const MAX_TITLE_CHARS: usize = 100;

/// Refresh tokens this close to expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// OAuth and upload URLs.
#[derive(Debug, Clone)]
pub struct YouTubeEndpoints {
    pub token_url: String,
    pub upload_url: String,
}

impl Default for YouTubeEndpoints {
    fn default() -> Self {
        Self {
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            upload_url: "https://www.googleapis.com/upload/youtube/v3/videos".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    description: String,
    tags: Vec<String>,
    category_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadStatus {
    privacy_status: String,
    self_declared_made_for_kids: bool,
}

#[derive(Debug, Serialize)]
struct VideoResource {
    snippet: Snippet,
    status: UploadStatus,
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: Option<String>,
}

/// Uploads `ready/` items with their sidecar metadata.
pub struct YouTubePublisher {
    settings: PublishSettings,
    endpoints: YouTubeEndpoints,
    token: Mutex<Option<CachedToken>>,
}

impl YouTubePublisher {
    pub fn new(settings: PublishSettings) -> Self {
        Self::with_endpoints(settings, YouTubeEndpoints::default())
    }

    pub fn with_endpoints(settings: PublishSettings, endpoints: YouTubeEndpoints) -> Self {
        Self {
            settings,
            endpoints,
            token: Mutex::new(None),
        }
    }

    /// The request body for `metadata`, with fallbacks for empty fields.
    fn resource(&self, metadata: &VideoMetadata) -> VideoResource {
        let title = metadata.title.trim();
        let title = if title.is_empty() {
            self.settings.fallback_title.clone()
        } else {
            title.chars().take(MAX_TITLE_CHARS).collect()
        };

        let mut tags = if metadata.tags.is_empty() {
            extract_hashtags(&metadata.description)
        } else {
            metadata.tags.clone()
        };
        if tags.is_empty() {
            tags = self.settings.default_tags.clone();
        }
        let tags = tags
            .iter()
            .map(|t| t.trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect();

        VideoResource {
            snippet: Snippet {
                title,
                description: metadata.description.clone(),
                tags,
                category_id: self.settings.category_id.clone(),
            },
            status: UploadStatus {
                privacy_status: self.settings.privacy_status.clone(),
                self_declared_made_for_kids: self.settings.made_for_kids,
            },
        }
    }

    /// A valid access token, refreshed through the refresh-token grant when needed.
    fn access_token(&self, http: &reqwest::blocking::Client) -> CollaboratorResult<String> {
        let mut cached = self.token.lock();
        if let Some(token) = cached.as_ref() {
            if Instant::now() + EXPIRY_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let client_id = credential(&self.settings.client_id_env)?;
        let client_secret = credential(&self.settings.client_secret_env)?;
        let refresh_token = credential(&self.settings.refresh_token_env)?;

        let response = http
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .map_err(|e| transport_error(SERVICE, self.settings.timeout(), e))?;
        let body = check_status("youtube oauth", response)?
            .text()
            .map_err(|e| transport_error(SERVICE, self.settings.timeout(), e))?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| CollaboratorError::invalid_response("token response", e.to_string()))?;

        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(3600));
        *cached = Some(CachedToken {
            value: parsed.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(parsed.access_token)
    }

    fn upload(&self, ctx: &Context, item: &WorkItem, metadata: &VideoMetadata) -> CollaboratorResult<String> {
        let http = http_client(SERVICE, self.settings.timeout())?;
        let token = self.access_token(&http)?;

        let bytes = std::fs::read(&item.path)
            .map_err(|e| CollaboratorError::io(format!("reading {}", item.path.display()), e))?;
        let resource = self.resource(metadata);
        ctx.logger.info(&format!(
            "Uploading {} as '{}' ({} tags)",
            item.name,
            resource.snippet.title,
            resource.snippet.tags.len()
        ));

        let init = http
            .post(&self.endpoints.upload_url)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&token)
            .header("X-Upload-Content-Type", "video/*")
            .header("X-Upload-Content-Length", bytes.len().to_string())
            .json(&resource)
            .send()
            .map_err(|e| transport_error(SERVICE, self.settings.timeout(), e))?;
        if init.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.token.lock().take();
        }
        let init = check_status(SERVICE, init)?;

        let session = init
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                CollaboratorError::invalid_response("upload session", "no Location header")
            })?;

        let response = http
            .put(&session)
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "video/*")
            .body(bytes)
            .send()
            .map_err(|e| transport_error(SERVICE, self.settings.timeout(), e))?;
        let body = check_status(SERVICE, response)?
            .text()
            .map_err(|e| transport_error(SERVICE, self.settings.timeout(), e))?;

        parse_video_id(&body)
    }
}

fn parse_video_id(body: &str) -> CollaboratorResult<String> {
    let video: UploadedVideo = serde_json::from_str(body)
        .map_err(|e| CollaboratorError::invalid_response("upload response", e.to_string()))?;
    video
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CollaboratorError::invalid_response("upload response", "no video id"))
}

impl Collaborator for YouTubePublisher {
    type Input = WorkItem;

    fn name(&self) -> &str {
        "youtube"
    }

    fn process(&self, ctx: &Context, input: &WorkItem) -> CollaboratorResult<WorkItem> {
        let metadata = input
            .metadata
            .as_ref()
            .ok_or_else(|| CollaboratorError::MissingMetadata(input.name.clone()))?;

        let result = self.upload(ctx, input, metadata);
        if self.settings.pacing_ms > 0 {
            thread::sleep(Duration::from_millis(self.settings.pacing_ms));
        }

        let video_id = result?;
        ctx.logger.success(&format!(
            "Uploaded {}: https://www.youtube.com/watch?v={}",
            input.name, video_id
        ));
        let mut published = input.clone();
        published.remote_id = Some(video_id);
        Ok(published)
    }
}
