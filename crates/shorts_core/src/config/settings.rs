//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Every field has a default so partial or older files still load.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Stage sequencing and reset behaviour.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Source URL validation.
    #[serde(default)]
    pub sources: SourceSettings,

    /// Acquisition tool (yt-dlp).
    #[serde(default)]
    pub acquire: AcquireSettings,

    /// Transcoding tool (ffmpeg).
    #[serde(default)]
    pub transform: TransformSettings,

    /// Transcription and text generation.
    #[serde(default)]
    pub enrich: EnrichSettings,

    /// Remote publishing.
    #[serde(default)]
    pub publish: PublishSettings,
}

/// Path configuration for the workspace, state files, and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root of the stage directories.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,

    /// Folder for dedup records.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Folder for run log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// The status record polled by the dashboard.
    #[serde(default = "default_status_file")]
    pub status_file: String,

    /// Source URL list (one per line).
    #[serde(default = "default_sources_file")]
    pub sources_file: String,
}

fn default_workspace_root() -> String {
    "videos".to_string()
}

fn default_state_dir() -> String {
    ".state".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

fn default_status_file() -> String {
    "pipeline_status.json".to_string()
}

fn default_sources_file() -> String {
    "sources.txt".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            state_dir: default_state_dir(),
            logs_folder: default_logs_folder(),
            status_file: default_status_file(),
            sources_file: default_sources_file(),
        }
    }
}

impl PathSettings {
    /// Resolve a configured path against a base directory (absolute paths are kept).
    pub fn resolve(base: &std::path::Path, value: &str) -> PathBuf {
        let path = PathBuf::from(value);
        if path.is_absolute() {
            path
        } else {
            base.join(path)
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level for the run log.
    #[serde(default)]
    pub level: LogLevel,

    /// Use compact log format (tool output only kept in the tail buffer).
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of tool output lines to show after a failure.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

fn default_progress_step() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: default_true(),
            error_tail: default_error_tail(),
            progress_step: default_progress_step(),
        }
    }
}

/// Stage sequencing behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Run Workspace Reset before ingest on every run.
    #[serde(default)]
    pub reset_on_start: bool,

    /// Workspace Reset also clears the acquired/published dedup records.
    #[serde(default)]
    pub reset_clears_dedup: bool,

    /// Upper bound on new acquisitions per run (0 = unlimited).
    #[serde(default = "default_max_acquisitions")]
    pub max_acquisitions_per_run: usize,

    /// Pick up items left in a stage's input directory by an interrupted run.
    #[serde(default = "default_true")]
    pub recover_leftovers: bool,
}

fn default_max_acquisitions() -> usize {
    5
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            reset_on_start: false,
            reset_clears_dedup: false,
            max_acquisitions_per_run: default_max_acquisitions(),
            recover_leftovers: default_true(),
        }
    }
}

/// Source URL validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Accepted hosts (subdomains included). Empty accepts any host.
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// Substring every source path must contain. Empty disables the check.
    #[serde(default = "default_path_marker")]
    pub path_marker: String,
}

fn default_allowed_hosts() -> Vec<String> {
    vec!["tiktok.com".to_string()]
}

fn default_path_marker() -> String {
    "/video/".to_string()
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            allowed_hosts: default_allowed_hosts(),
            path_marker: default_path_marker(),
        }
    }
}

/// Acquisition tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireSettings {
    /// yt-dlp executable.
    #[serde(default = "default_yt_dlp")]
    pub yt_dlp_path: String,

    /// Format selector passed to `--format`.
    #[serde(default = "default_format")]
    pub format: String,

    /// Per-download timeout in seconds (0 = none).
    #[serde(default = "default_acquire_timeout")]
    pub timeout_secs: u64,
}

fn default_yt_dlp() -> String {
    "yt-dlp".to_string()
}

fn default_format() -> String {
    "best".to_string()
}

fn default_acquire_timeout() -> u64 {
    120
}

impl Default for AcquireSettings {
    fn default() -> Self {
        Self {
            yt_dlp_path: default_yt_dlp(),
            format: default_format(),
            timeout_secs: default_acquire_timeout(),
        }
    }
}

impl AcquireSettings {
    pub fn timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.timeout_secs)
    }
}

/// Transcoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSettings {
    /// ffmpeg executable.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_preset")]
    pub preset: String,

    #[serde(default = "default_crf")]
    pub crf: u32,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Per-file timeout in seconds (0 = none).
    #[serde(default = "default_transform_timeout")]
    pub timeout_secs: u64,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_width() -> u32 {
    720
}

fn default_height() -> u32 {
    1280
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_preset() -> String {
    "fast".to_string()
}

fn default_crf() -> u32 {
    23
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_audio_bitrate() -> String {
    "128k".to_string()
}

fn default_transform_timeout() -> u64 {
    600
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            width: default_width(),
            height: default_height(),
            video_codec: default_video_codec(),
            preset: default_preset(),
            crf: default_crf(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            timeout_secs: default_transform_timeout(),
        }
    }
}

impl TransformSettings {
    pub fn timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.timeout_secs)
    }
}

/// Transcription and text generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichSettings {
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_whisper_model")]
    pub whisper_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Transcripts shorter than this many words are unusable.
    #[serde(default = "default_min_words")]
    pub min_transcript_words: usize,

    /// Optional OCR fallback command; receives the video path as its last
    /// argument and prints on-screen text to stdout. Empty disables it.
    #[serde(default)]
    pub ocr_command: String,

    /// Keep extracted audio under `processed/audio` instead of deleting it.
    #[serde(default = "default_true")]
    pub keep_audio: bool,

    /// Timeout in seconds for each API call and tool run (0 = none).
    #[serde(default = "default_enrich_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_whisper_model() -> String {
    "whisper-1".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_min_words() -> usize {
    10
}

fn default_enrich_timeout() -> u64 {
    120
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            chat_model: default_chat_model(),
            whisper_model: default_whisper_model(),
            temperature: default_temperature(),
            min_transcript_words: default_min_words(),
            ocr_command: String::new(),
            keep_audio: default_true(),
            timeout_secs: default_enrich_timeout(),
        }
    }
}

impl EnrichSettings {
    pub fn timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.timeout_secs)
    }
}

/// Remote publishing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSettings {
    /// Environment variable holding the OAuth client id.
    #[serde(default = "default_client_id_env")]
    pub client_id_env: String,

    /// Environment variable holding the OAuth client secret.
    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: String,

    /// Environment variable holding the OAuth refresh token.
    #[serde(default = "default_refresh_token_env")]
    pub refresh_token_env: String,

    #[serde(default = "default_category_id")]
    pub category_id: String,

    #[serde(default = "default_privacy")]
    pub privacy_status: String,

    #[serde(default)]
    pub made_for_kids: bool,

    /// Title used when the generated one is empty.
    #[serde(default = "default_fallback_title")]
    pub fallback_title: String,

    /// Tags used when the description has no hashtags.
    #[serde(default = "default_tags")]
    pub default_tags: Vec<String>,

    /// Pause after each upload, in milliseconds.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Timeout in seconds for each upload (0 = none).
    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,
}

fn default_client_id_env() -> String {
    "YOUTUBE_CLIENT_ID".to_string()
}

fn default_client_secret_env() -> String {
    "YOUTUBE_CLIENT_SECRET".to_string()
}

fn default_refresh_token_env() -> String {
    "YOUTUBE_REFRESH_TOKEN".to_string()
}

fn default_category_id() -> String {
    "28".to_string()
}

fn default_privacy() -> String {
    "public".to_string()
}

fn default_fallback_title() -> String {
    "Untitled Tech Short".to_string()
}

fn default_tags() -> Vec<String> {
    [
        "FYP",
        "Tech",
        "AI",
        "Innovation",
        "YouTubeShorts",
        "Gadgets",
        "Trending",
        "SmartDevices",
        "FutureTech",
        "Robotics",
        "CyberSecurity",
        "MachineLearning",
        "WearableTech",
        "TechReview",
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}

fn default_pacing_ms() -> u64 {
    1000
}

fn default_publish_timeout() -> u64 {
    600
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            client_id_env: default_client_id_env(),
            client_secret_env: default_client_secret_env(),
            refresh_token_env: default_refresh_token_env(),
            category_id: default_category_id(),
            privacy_status: default_privacy(),
            made_for_kids: false,
            fallback_title: default_fallback_title(),
            default_tags: default_tags(),
            pacing_ms: default_pacing_ms(),
            timeout_secs: default_publish_timeout(),
        }
    }
}

impl PublishSettings {
    pub fn timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.timeout_secs)
    }
}

fn secs_to_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Configuration sections (for generating the commented default file).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Logging,
    Pipeline,
    Sources,
    Acquire,
    Transform,
    Enrich,
    Publish,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 8] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Pipeline,
        ConfigSection::Sources,
        ConfigSection::Acquire,
        ConfigSection::Transform,
        ConfigSection::Enrich,
        ConfigSection::Publish,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Pipeline => "pipeline",
            ConfigSection::Sources => "sources",
            ConfigSection::Acquire => "acquire",
            ConfigSection::Transform => "transform",
            ConfigSection::Enrich => "enrich",
            ConfigSection::Publish => "publish",
        }
    }

    /// Comment written above the section.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Workspace, state, and log locations",
            ConfigSection::Logging => "Run log configuration",
            ConfigSection::Pipeline => "Stage sequencing and workspace reset",
            ConfigSection::Sources => "Source URL validation",
            ConfigSection::Acquire => "Downloader (yt-dlp)",
            ConfigSection::Transform => "Transcoder (ffmpeg)",
            ConfigSection::Enrich => "Transcription and title/description generation",
            ConfigSection::Publish => "Upload target (credentials are read from the named env vars)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[pipeline]"));
        assert!(toml.contains("workspace_root"));
    }

    #[test]
    fn settings_round_trip() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.paths.workspace_root, settings.paths.workspace_root);
        assert_eq!(parsed.publish.default_tags, settings.publish.default_tags);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[pipeline]\nmax_acquisitions_per_run = 2";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.pipeline.max_acquisitions_per_run, 2);
        assert!(parsed.pipeline.recover_leftovers);
        assert_eq!(parsed.transform.width, 720);
        assert_eq!(parsed.acquire.timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let settings = AcquireSettings {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(settings.timeout(), None);
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = std::path::Path::new("/srv/shorts");
        assert_eq!(
            PathSettings::resolve(base, "videos"),
            PathBuf::from("/srv/shorts/videos")
        );
        assert_eq!(PathSettings::resolve(base, "/tmp/x"), PathBuf::from("/tmp/x"));
    }
}
