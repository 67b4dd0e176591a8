//! Configuration for the shorts pipeline.
//!
//! This module provides:
//! - TOML-based configuration with one table per concern
//! - Defaults for every key, so partial files load
//! - Atomic file writes (write to temp, then rename)
//!
//! # Example
//!
//! ```no_run
//! use shorts_core::config::ConfigManager;
//!
//! let mut config = ConfigManager::new("shorts.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Workspace: {}", config.workspace_root().display());
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    AcquireSettings, ConfigSection, EnrichSettings, LoggingSettings, PathSettings,
    PipelineSettings, PublishSettings, Settings, SourceSettings, TransformSettings,
};
