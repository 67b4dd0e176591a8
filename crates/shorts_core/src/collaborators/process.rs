//! Running external tools with a time limit.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::logging::RunLogger;
use crate::orchestrator::{CollaboratorError, CollaboratorResult};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a killed tool's output readers get to drain before being abandoned.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Captured output of a finished tool.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Render a command line for the log.
pub fn format_command(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().to_string()];
    parts.extend(command.get_args().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}

/// Run `command` to completion, killing it once `timeout` elapses.
///
/// Every output line is fed to the logger's tail buffer. A non-zero exit
/// becomes [`CollaboratorError::CommandFailed`] carrying stderr. On Unix the
/// tool runs in its own process group so a timeout also kills its children.
pub fn run_tool(
    logger: &RunLogger,
    tool: &str,
    command: &mut Command,
    timeout: Option<Duration>,
) -> CollaboratorResult<ToolOutput> {
    logger.command(&format_command(command));

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CollaboratorError::io(format!("executing {}", tool), e))?;

    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => return Err(CollaboratorError::io(format!("waiting for {}", tool), e)),
        }

        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                kill_tree(&mut child);
                let output = collect_available(stdout_reader, stderr_reader);
                feed_logger(logger, &output);
                return Err(CollaboratorError::timeout(tool, limit));
            }
        }

        thread::sleep(POLL_INTERVAL);
    };

    let output = collect(stdout_reader, stderr_reader);
    feed_logger(logger, &output);

    if !status.success() {
        let exit_code = status.code().unwrap_or(-1);
        return Err(CollaboratorError::command_failed(
            tool,
            exit_code,
            last_lines(&output.stderr, 5),
        ));
    }

    Ok(output)
}

fn spawn_reader<R: Read + Send + 'static>(stream: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => text.push_str(&String::from_utf8_lossy(&buf)),
            }
        }
        text
    })
}

fn collect(
    stdout: Option<thread::JoinHandle<String>>,
    stderr: Option<thread::JoinHandle<String>>,
) -> ToolOutput {
    let join = |handle: Option<thread::JoinHandle<String>>| {
        handle.and_then(|h| h.join().ok()).unwrap_or_default()
    };
    ToolOutput {
        stdout: join(stdout),
        stderr: join(stderr),
    }
}

/// Kill the tool and, on Unix, everything else in its process group.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // The child leads its group, see `process_group(0)` in `run_tool`.
            let _ = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Join readers that finish within [`DRAIN_GRACE`]; abandon the rest.
///
/// A descendant that escaped the kill can hold the pipes open indefinitely.
fn collect_available(
    stdout: Option<thread::JoinHandle<String>>,
    stderr: Option<thread::JoinHandle<String>>,
) -> ToolOutput {
    let deadline = Instant::now() + DRAIN_GRACE;
    let finished = |handle: &Option<thread::JoinHandle<String>>| {
        handle.as_ref().map_or(true, |h| h.is_finished())
    };
    while !(finished(&stdout) && finished(&stderr)) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    let join = |handle: Option<thread::JoinHandle<String>>| match handle {
        Some(h) if h.is_finished() => h.join().unwrap_or_default(),
        _ => String::new(),
    };
    ToolOutput {
        stdout: join(stdout),
        stderr: join(stderr),
    }
}

fn feed_logger(logger: &RunLogger, output: &ToolOutput) {
    for line in output.stdout.lines() {
        logger.output_line(line, false);
    }
    for line in output.stderr.lines() {
        logger.output_line(line, true);
    }
}

/// The last `count` non-empty lines of `text`, joined by newlines.
pub(crate) fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
