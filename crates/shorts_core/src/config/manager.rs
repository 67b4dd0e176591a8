//! Config manager for loading, saving, and creating the settings file.
//!
//! - Missing files are created with commented defaults
//! - Missing keys fall back to defaults on load
//! - Writes are atomic (temp file, fsync, rename)

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::settings::{ConfigSection, PathSettings, Settings};
use crate::persist;

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages the pipeline configuration file.
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Directory relative paths in the settings resolve against.
    base_dir: PathBuf,
    /// Current settings loaded in memory.
    settings: Settings,
}

impl ConfigManager {
    /// Create a new config manager with the given config file path.
    ///
    /// Relative paths in the settings resolve against the config file's
    /// directory. Does not load anything; call `load()` or `load_or_create()`.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        let base_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            config_path,
            base_dir,
            settings: Settings::default(),
        }
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get a reference to the current settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get a mutable reference to the current settings.
    ///
    /// Changes stay in memory until `save()` is called.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Load config from file. Returns an error if the file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = toml::from_str(&content)?;
        Ok(())
    }

    /// Load config from file, creating it with defaults if it doesn't exist.
    ///
    /// Returns `true` when a new file was written.
    pub fn load_or_create(&mut self) -> ConfigResult<bool> {
        if self.config_path.exists() {
            self.load()?;
            Ok(false)
        } else {
            self.settings = Settings::default();
            self.save()?;
            tracing::info!("Created default config at {}", self.config_path.display());
            Ok(true)
        }
    }

    /// Load the file if present, otherwise use defaults without writing anything.
    pub fn load_or_default(&mut self) -> ConfigResult<()> {
        match self.load() {
            Err(ConfigError::NotFound(_)) => {
                tracing::debug!(
                    "No config at {}, using defaults",
                    self.config_path.display()
                );
                self.settings = Settings::default();
                Ok(())
            }
            other => other,
        }
    }

    /// Ensure the workspace root, state, and logs directories exist.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        for dir in [self.workspace_root(), self.state_dir(), self.logs_folder()] {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }

    /// Root of the stage directories.
    pub fn workspace_root(&self) -> PathBuf {
        self.resolve(&self.settings.paths.workspace_root)
    }

    /// Directory holding the dedup records.
    pub fn state_dir(&self) -> PathBuf {
        self.resolve(&self.settings.paths.state_dir)
    }

    /// Get the logs folder path.
    pub fn logs_folder(&self) -> PathBuf {
        self.resolve(&self.settings.paths.logs_folder)
    }

    /// Path of the status record.
    pub fn status_file(&self) -> PathBuf {
        self.resolve(&self.settings.paths.status_file)
    }

    /// Path of the source list.
    pub fn sources_file(&self) -> PathBuf {
        self.resolve(&self.settings.paths.sources_file)
    }

    fn resolve(&self, value: &str) -> PathBuf {
        PathSettings::resolve(&self.base_dir, value)
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        persist::atomic_write(&self.config_path, content.as_bytes())?;
        Ok(())
    }

    /// Generate config content with a comment above each section.
    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();

        output.push_str("# Shorts pipeline configuration\n");
        output.push_str("# Relative paths resolve against this file's directory.\n\n");

        for section in ConfigSection::ALL {
            let body = match section {
                ConfigSection::Paths => toml::to_string_pretty(&self.settings.paths)?,
                ConfigSection::Logging => toml::to_string_pretty(&self.settings.logging)?,
                ConfigSection::Pipeline => toml::to_string_pretty(&self.settings.pipeline)?,
                ConfigSection::Sources => toml::to_string_pretty(&self.settings.sources)?,
                ConfigSection::Acquire => toml::to_string_pretty(&self.settings.acquire)?,
                ConfigSection::Transform => toml::to_string_pretty(&self.settings.transform)?,
                ConfigSection::Enrich => toml::to_string_pretty(&self.settings.enrich)?,
                ConfigSection::Publish => toml::to_string_pretty(&self.settings.publish)?,
            };

            output.push_str(&format!("# {}\n", section.comment()));
            output.push_str(&format!("[{}]\n", section.table_name()));
            for line in body.lines() {
                output.push_str(line);
                output.push('\n');
            }
            output.push('\n');
        }

        Ok(output)
    }
}
