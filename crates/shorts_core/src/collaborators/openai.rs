//! Minimal client for the transcription and chat completion endpoints.

use std::path::Path;

use reqwest::blocking::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use super::{check_status, credential, http_client, transport_error};
use crate::config::EnrichSettings;
use crate::orchestrator::{CollaboratorError, CollaboratorResult};

const SERVICE: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking client bound to one API key and base URL.
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    api_base: String,
    api_key: String,
    settings: EnrichSettings,
}

impl OpenAiClient {
    /// Build a client, reading the API key from the configured environment variable.
    pub fn from_settings(settings: &EnrichSettings) -> CollaboratorResult<Self> {
        let api_key = credential(&settings.api_key_env)?;
        Self::with_key(settings, api_key)
    }

    pub fn with_key(settings: &EnrichSettings, api_key: impl Into<String>) -> CollaboratorResult<Self> {
        Ok(Self {
            http: http_client(SERVICE, settings.timeout())?,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            settings: settings.clone(),
        })
    }

    /// Transcribe an audio file to plain text.
    pub fn transcribe(&self, audio: &Path) -> CollaboratorResult<String> {
        let bytes = std::fs::read(audio)
            .map_err(|e| CollaboratorError::io(format!("reading {}", audio.display()), e))?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| CollaboratorError::http(SERVICE, e.to_string()))?;
        let form = Form::new()
            .text("model", self.settings.whisper_model.clone())
            .text("response_format", "text")
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| transport_error(SERVICE, self.settings.timeout(), e))?;

        let text = check_status(SERVICE, response)?
            .text()
            .map_err(|e| transport_error(SERVICE, self.settings.timeout(), e))?;
        Ok(text.trim().to_string())
    }

    /// Send one system + user exchange and return the reply text.
    pub fn chat(&self, system: &str, prompt: &str) -> CollaboratorResult<String> {
        let request = ChatRequest {
            model: &self.settings.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.settings.temperature,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| transport_error(SERVICE, self.settings.timeout(), e))?;

        let body = check_status(SERVICE, response)?
            .text()
            .map_err(|e| transport_error(SERVICE, self.settings.timeout(), e))?;
        parse_chat_response(&body)
    }
}

/// Extract the first choice's content from a chat completion body.
fn parse_chat_response(body: &str) -> CollaboratorResult<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CollaboratorError::invalid_response("chat completion", e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| CollaboratorError::invalid_response("chat completion", "no content in reply"))
}
