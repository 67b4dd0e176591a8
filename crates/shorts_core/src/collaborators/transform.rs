//! Transform collaborator: re-encode to the vertical short format with ffmpeg.

use std::process::Command;

use super::process::run_tool;
use crate::config::TransformSettings;
use crate::models::{StageId, WorkItem};
use crate::orchestrator::{Collaborator, CollaboratorError, CollaboratorResult, Context};
use crate::workspace::{remove_if_exists, remove_item};

/// Scales and re-encodes `raw/<name>` into `edited/<stem>.mp4`.
pub struct FfmpegTranscoder {
    settings: TransformSettings,
}

impl FfmpegTranscoder {
    pub fn new(settings: TransformSettings) -> Self {
        Self { settings }
    }

    /// Build the ffmpeg arguments for one conversion.
    fn build_args(&self, input: &str, output: &str) -> Vec<String> {
        let s = &self.settings;
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string(),
            "-vf".to_string(),
            format!("scale={}:{}", s.width, s.height),
            "-c:v".to_string(),
            s.video_codec.clone(),
            "-preset".to_string(),
            s.preset.clone(),
            "-crf".to_string(),
            s.crf.to_string(),
            "-c:a".to_string(),
            s.audio_codec.clone(),
            "-b:a".to_string(),
            s.audio_bitrate.clone(),
            output.to_string(),
        ]
    }
}

impl Collaborator for FfmpegTranscoder {
    type Input = WorkItem;

    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn process(&self, ctx: &Context, input: &WorkItem) -> CollaboratorResult<WorkItem> {
        if !input.path.exists() {
            return Err(CollaboratorError::NotFound(input.path.display().to_string()));
        }

        let file_name = format!("{}.mp4", input.stem());
        let finished = ctx.layout.stage_output(StageId::Transform).join(&file_name);
        if finished.exists() {
            return Err(CollaboratorError::other(format!(
                "{} would replace {}",
                input.name,
                finished.display()
            )));
        }

        let edited = ctx.layout.edited();
        std::fs::create_dir_all(&edited)
            .map_err(|e| CollaboratorError::io("creating edited directory", e))?;
        let output = edited.join(&file_name);

        let mut cmd = Command::new(&self.settings.ffmpeg_path);
        cmd.args(self.build_args(&input.path.to_string_lossy(), &output.to_string_lossy()));

        if let Err(e) = run_tool(&ctx.logger, self.name(), &mut cmd, self.settings.timeout()) {
            if let Err(cleanup) = remove_if_exists(&output) {
                ctx.logger
                    .warn(&format!("Could not remove partial output {}: {}", output.display(), cleanup));
            }
            return Err(e);
        }

        if !output.exists() {
            return Err(CollaboratorError::other(format!(
                "ffmpeg produced no output for {}",
                input.name
            )));
        }

        ctx.logger.success(&format!("Resized {}", input.name));
        Ok(input.moved_to(output))
    }

    fn release_input(&self, _ctx: &Context, input: &WorkItem) -> std::io::Result<()> {
        remove_item(input)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::collaborators::test_support::write_script;
    use crate::orchestrator::testing::TestBed;
    use std::fs;
    use std::path::PathBuf;

    fn transcoder(script: PathBuf) -> FfmpegTranscoder {
        FfmpegTranscoder::new(TransformSettings {
            ffmpeg_path: script.to_string_lossy().to_string(),
            ..TransformSettings::default()
        })
    }

    fn raw_item(bed: &TestBed, name: &str) -> WorkItem {
        let path = bed.ctx.layout.raw().join(name);
        fs::write(&path, "raw").unwrap();
        WorkItem::from_path(path).with_source_id("src")
    }

    // Last argument is the output path.
    const FAKE_OK: &str = r#"for last; do :; done; printf 'edited' > "$last""#;

    #[test]
    fn args_follow_settings() {
        let t = FfmpegTranscoder::new(TransformSettings::default());
        let args = t.build_args("in.webm", "out.mp4");
        assert_eq!(args[0], "-y");
        assert!(args.contains(&"scale=720:1280".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn converts_into_edited_as_mp4() {
        let bed = TestBed::new();
        let script = write_script(bed.ctx.layout.root(), "ffmpeg", FAKE_OK);
        let input = raw_item(&bed, "clip.webm");

        let out = transcoder(script).process(&bed.ctx, &input).unwrap();
        assert_eq!(out.name, "clip.mp4");
        assert_eq!(out.source_id.as_deref(), Some("src"));
        assert_eq!(fs::read_to_string(&out.path).unwrap(), "edited");
        assert!(input.path.exists());
    }

    #[test]
    fn failure_leaves_no_output() {
        let bed = TestBed::new();
        let body = r#"for last; do :; done; printf 'half' > "$last"; echo 'Invalid data found' 1>&2; exit 1"#;
        let script = write_script(bed.ctx.layout.root(), "ffmpeg", body);
        let input = raw_item(&bed, "bad.mp4");

        let err = transcoder(script).process(&bed.ctx, &input).unwrap_err();
        assert!(matches!(err, CollaboratorError::CommandFailed { .. }));
        assert!(!bed.ctx.layout.edited().join("bad.mp4").exists());
        assert!(input.path.exists());
    }

    #[test]
    fn same_stem_as_a_finished_item_is_refused() {
        let bed = TestBed::new();
        let script = write_script(bed.ctx.layout.root(), "ffmpeg", FAKE_OK);
        let finished = bed.ctx.layout.final_dir().join("a.mp4");
        fs::write(&finished, "first").unwrap();
        let input = raw_item(&bed, "a.webm");

        let err = transcoder(script).process(&bed.ctx, &input).unwrap_err();
        assert!(matches!(err, CollaboratorError::Other(_)));
        assert_eq!(fs::read_to_string(&finished).unwrap(), "first");
        assert!(!bed.ctx.layout.edited().join("a.mp4").exists());
        assert!(input.path.exists());
    }

    #[test]
    fn release_removes_raw_input() {
        let bed = TestBed::new();
        let input = raw_item(&bed, "done.mp4");
        let t = FfmpegTranscoder::new(TransformSettings::default());

        t.release_input(&bed.ctx, &input).unwrap();
        assert!(!input.path.exists());
    }

    #[test]
    fn missing_input_is_not_found() {
        let bed = TestBed::new();
        let t = FfmpegTranscoder::new(TransformSettings::default());
        let item = WorkItem::from_path(bed.ctx.layout.raw().join("ghost.mp4"));

        let err = t.process(&bed.ctx, &item).unwrap_err();
        assert!(matches!(err, CollaboratorError::NotFound(_)));
    }
}
