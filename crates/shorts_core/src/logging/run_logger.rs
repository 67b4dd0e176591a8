//! Per-run logger.
//!
//! Each pipeline run gets its own logger that:
//! - Writes to a dedicated log file named after the run id
//! - Mirrors every line to `tracing`
//! - Filters progress updates in compact mode
//! - Keeps a tail of external tool output for failure diagnosis

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogConfig, LogLevel, MessagePrefix};

/// Logger for one pipeline run.
pub struct RunLogger {
    run_id: String,
    log_path: PathBuf,
    /// File writer (buffered). `None` after `close()`.
    file_writer: Mutex<Option<BufWriter<File>>>,
    config: LogConfig,
    /// Recent tool output lines.
    tail_buffer: Mutex<VecDeque<String>>,
    /// Last progress value logged (for compact mode filtering).
    last_progress: Mutex<u32>,
}

impl RunLogger {
    /// Create a logger writing to `<log_dir>/<run_id>.log`.
    pub fn new(
        run_id: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
    ) -> std::io::Result<Self> {
        let run_id = run_id.into();
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&run_id)));
        let file = File::create(&log_path)?;

        Ok(Self {
            run_id,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            tail_buffer: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            config,
            last_progress: Mutex::new(0),
        })
    }

    /// Get the run id.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the log file path.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }

        match level {
            LogLevel::Trace => tracing::trace!(run = %self.run_id, "{}", message),
            LogLevel::Debug => tracing::debug!(run = %self.run_id, "{}", message),
            LogLevel::Info => tracing::info!(run = %self.run_id, "{}", message),
            LogLevel::Warn => tracing::warn!(run = %self.run_id, "{}", message),
            LogLevel::Error => tracing::error!(run = %self.run_id, "{}", message),
        }

        self.write_line(message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// Log an external command about to run.
    pub fn command(&self, command: &str) {
        self.log(LogLevel::Debug, &MessagePrefix::Command.format(command));
    }

    /// Log a stage marker.
    pub fn stage(&self, label: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Stage.format(label));
    }

    /// Log the start of an item.
    pub fn item(&self, name: &str) {
        self.log(LogLevel::Debug, &MessagePrefix::Item.format(name));
    }

    /// Log an item skipped as already handled.
    pub fn skip(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Skip.format(message));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    /// Log progress (filtered to `progress_step` intervals in compact mode).
    ///
    /// Returns true if the progress was logged.
    pub fn progress(&self, percent: u32) -> bool {
        if self.config.compact {
            let mut last = self.last_progress.lock();
            let step = self.config.progress_step.max(1);

            let current_step = (percent / step) * step;
            let last_step = (*last / step) * step;
            if current_step <= last_step && percent < 100 {
                return false;
            }
            *last = percent;
        }

        self.log(LogLevel::Info, &format!("Progress: {}%", percent));
        true
    }

    /// Reset progress filtering (at the start of each stage).
    pub fn reset_progress(&self) {
        *self.last_progress.lock() = 0;
    }

    /// Record one line of external tool output.
    ///
    /// In compact mode lines only go to the tail buffer.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        {
            let mut buffer = self.tail_buffer.lock();
            if self.config.error_tail > 0 {
                if buffer.len() >= self.config.error_tail {
                    buffer.pop_front();
                }
                buffer.push_back(line.to_string());
            }
        }

        if self.config.compact {
            return;
        }

        let prefix = if is_stderr { "[stderr] " } else { "" };
        self.log(LogLevel::Debug, &format!("{}{}", prefix, line));
    }

    /// Write the tail buffer to the log (typically after a tool failure).
    pub fn show_tail(&self, header: &str) {
        let lines = self.get_tail();
        if lines.is_empty() {
            return;
        }

        self.log(LogLevel::Error, &format!("[{}/tail]", header));
        for line in lines {
            self.log(LogLevel::Error, &line);
        }
    }

    pub fn clear_tail(&self) {
        self.tail_buffer.lock().clear();
    }

    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    /// Flush the log file.
    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Close the log file. Later messages only reach `tracing`.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn write_line(&self, message: &str) {
        let line = if self.config.show_timestamps {
            format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
        } else {
            message.to_string()
        };

        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", line);
        }
    }
}

impl Drop for RunLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sanitize a string to be safe for use as a filename.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
