//! Logging for the shorts pipeline.
//!
//! - `init_tracing` installs the process-wide `tracing` subscriber
//! - `RunLogger` writes one log file per pipeline run and mirrors to `tracing`
//!
//! # Example
//!
//! ```no_run
//! use shorts_core::logging::{LogConfig, RunLogger};
//!
//! let logger = RunLogger::new("run-20240101-120000", ".logs", LogConfig::default()).unwrap();
//! logger.stage("Ingest");
//! logger.command("yt-dlp ...");
//! logger.progress(50);
//! logger.success("Ingest finished");
//! ```

mod run_logger;
mod types;

pub use run_logger::RunLogger;
pub use types::{LogConfig, LogLevel, MessagePrefix};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`, falling back to `default_level`. Output goes to
/// stderr. Calling it twice is harmless.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .with(filter)
        .try_init();
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
