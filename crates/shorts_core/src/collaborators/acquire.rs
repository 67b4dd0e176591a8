//! Acquire collaborator: download a source with yt-dlp.

use std::path::PathBuf;
use std::process::Command;

use super::process::run_tool;
use crate::config::AcquireSettings;
use crate::models::WorkItem;
use crate::orchestrator::{Collaborator, CollaboratorError, CollaboratorResult, Context};
use crate::sources::SourceRef;
use crate::workspace::{files_with_prefix, is_video, remove_if_exists};

/// Stderr fragments yt-dlp prints when a video is gone or private.
const NOT_FOUND_MARKERS: &[&str] = &["404", "not found", "unavailable", "private video"];

/// Downloads `<incoming>/<id>.<ext>` for each source.
pub struct YtDlpAcquirer {
    settings: AcquireSettings,
}

impl YtDlpAcquirer {
    pub fn new(settings: AcquireSettings) -> Self {
        Self { settings }
    }

    fn build_command(&self, source: &SourceRef, template: &str) -> Command {
        let mut cmd = Command::new(&self.settings.yt_dlp_path);
        cmd.args([
            "-o",
            template,
            "--format",
            self.settings.format.as_str(),
            "--no-playlist",
            "--no-warnings",
            source.url.as_str(),
        ]);
        cmd
    }

    /// Files named `<id>.*` in `dir`.
    fn downloads_for(dir: &std::path::Path, id: &str) -> CollaboratorResult<Vec<PathBuf>> {
        files_with_prefix(dir, &format!("{}.", id))
            .map_err(|e| CollaboratorError::io(format!("listing {}", dir.display()), e))
    }

    fn discard_partials(&self, ctx: &Context, id: &str) {
        let leftovers = match Self::downloads_for(&ctx.layout.incoming(), id) {
            Ok(files) => files,
            Err(_) => return,
        };
        for path in leftovers {
            if let Err(e) = remove_if_exists(&path) {
                ctx.logger
                    .warn(&format!("Could not remove partial download {}: {}", path.display(), e));
            }
        }
    }
}

impl Collaborator for YtDlpAcquirer {
    type Input = SourceRef;

    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn process(&self, ctx: &Context, source: &SourceRef) -> CollaboratorResult<WorkItem> {
        let waiting = Self::downloads_for(&ctx.layout.raw(), &source.id)?;
        if waiting.iter().any(|p| is_video(p)) {
            return Err(CollaboratorError::AlreadyAcquired(source.id.clone()));
        }

        let incoming = ctx.layout.incoming();
        std::fs::create_dir_all(&incoming)
            .map_err(|e| CollaboratorError::io("creating incoming directory", e))?;
        self.discard_partials(ctx, &source.id);

        let template = incoming.join(format!("{}.%(ext)s", source.id));
        let mut cmd = self.build_command(source, &template.to_string_lossy());

        if let Err(e) = run_tool(&ctx.logger, self.name(), &mut cmd, self.settings.timeout()) {
            self.discard_partials(ctx, &source.id);
            return Err(classify_failure(e, &source.id));
        }

        let downloaded = Self::downloads_for(&incoming, &source.id)?
            .into_iter()
            .find(|p| is_video(p));

        match downloaded {
            Some(path) => {
                ctx.logger.success(&format!("Downloaded {}", source.id));
                Ok(WorkItem::from_path(path).with_source_id(source.id.clone()))
            }
            None => {
                self.discard_partials(ctx, &source.id);
                Err(CollaboratorError::other(format!(
                    "yt-dlp reported success but produced no video for {}",
                    source.id
                )))
            }
        }
    }
}

/// Map a failed download to `NotFound` when yt-dlp says the video is gone.
fn classify_failure(err: CollaboratorError, id: &str) -> CollaboratorError {
    match &err {
        CollaboratorError::CommandFailed { message, .. } => {
            let lower = message.to_ascii_lowercase();
            if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
                CollaboratorError::NotFound(format!("{}: {}", id, message))
            } else {
                err
            }
        }
        _ => err,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::collaborators::test_support::write_script;
    use crate::orchestrator::testing::{source, TestBed};
    use crate::orchestrator::FailureKind;
    use std::fs;

    fn acquirer(script: PathBuf) -> YtDlpAcquirer {
        YtDlpAcquirer::new(AcquireSettings {
            yt_dlp_path: script.to_string_lossy().to_string(),
            ..AcquireSettings::default()
        })
    }

    // The fake downloader resolves the `-o` template itself.
    const FAKE_OK: &str = r#"out=$(printf '%s' "$2" | sed 's/%(ext)s/mp4/'); printf 'video' > "$out""#;

    #[test]
    fn downloads_into_incoming() {
        let bed = TestBed::new();
        let script = write_script(bed.ctx.layout.root(), "yt-dlp", FAKE_OK);

        let item = acquirer(script).process(&bed.ctx, &source("7301")).unwrap();
        assert_eq!(item.name, "7301.mp4");
        assert_eq!(item.source_id.as_deref(), Some("7301"));
        assert!(bed.ctx.layout.incoming().join("7301.mp4").exists());
    }

    #[test]
    fn waiting_raw_file_is_already_acquired() {
        let bed = TestBed::new();
        fs::write(bed.ctx.layout.raw().join("7301.mp4"), "x").unwrap();
        let script = write_script(bed.ctx.layout.root(), "yt-dlp", FAKE_OK);

        let err = acquirer(script).process(&bed.ctx, &source("7301")).unwrap_err();
        assert_eq!(err.kind(), FailureKind::AlreadyAcquired);
    }

    #[test]
    fn missing_video_maps_to_not_found_and_cleans_up() {
        let bed = TestBed::new();
        let body = r#"out=$(printf '%s' "$2" | sed 's/%(ext)s/mp4.part/'); printf 'part' > "$out"; echo "ERROR: HTTP Error 404: Not Found" 1>&2; exit 1"#;
        let script = write_script(bed.ctx.layout.root(), "yt-dlp", body);

        let err = acquirer(script).process(&bed.ctx, &source("gone")).unwrap_err();
        assert_eq!(err.kind(), FailureKind::NotFound);
        assert!(fs::read_dir(bed.ctx.layout.incoming()).unwrap().next().is_none());
    }

    #[test]
    fn other_failures_stay_command_failed() {
        let bed = TestBed::new();
        let script = write_script(bed.ctx.layout.root(), "yt-dlp", "echo 'network unreachable' 1>&2; exit 2");

        let err = acquirer(script).process(&bed.ctx, &source("x1")).unwrap_err();
        assert!(matches!(err, CollaboratorError::CommandFailed { exit_code: 2, .. }));
    }

    #[test]
    fn success_without_output_is_an_error() {
        let bed = TestBed::new();
        let script = write_script(bed.ctx.layout.root(), "yt-dlp", "exit 0");

        let err = acquirer(script).process(&bed.ctx, &source("x2")).unwrap_err();
        assert!(matches!(err, CollaboratorError::Other(_)));
    }
}
