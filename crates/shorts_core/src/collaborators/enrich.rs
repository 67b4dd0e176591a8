//! Enrich collaborator: transcript plus generated title, description and tags.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::metadata::{build_prompt, parse_reply, word_count, SYSTEM_PROMPT};
use super::openai::OpenAiClient;
use super::process::run_tool;
use crate::config::EnrichSettings;
use crate::models::WorkItem;
use crate::orchestrator::{Collaborator, CollaboratorError, CollaboratorResult, Context};
use crate::persist;
use crate::workspace::remove_if_exists;

/// Extracts audio, transcribes it (falling back to on-screen text), and asks
/// a chat model for publishing metadata.
pub struct OpenAiEnricher {
    settings: EnrichSettings,
    ffmpeg_path: String,
}

impl OpenAiEnricher {
    pub fn new(settings: EnrichSettings, ffmpeg_path: impl Into<String>) -> Self {
        Self {
            settings,
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Extract 16 kHz mono audio next to the other processed audio.
    fn extract_audio(&self, ctx: &Context, item: &WorkItem) -> CollaboratorResult<PathBuf> {
        let audio_dir = ctx.layout.processed_audio();
        std::fs::create_dir_all(&audio_dir)
            .map_err(|e| CollaboratorError::io("creating audio directory", e))?;
        let audio = audio_dir.join(format!("{}.wav", item.stem()));

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-y")
            .arg("-i")
            .arg(&item.path)
            .args(["-ac", "1", "-ar", "16000", "-vn"])
            .arg(&audio);

        if let Err(e) = run_tool(&ctx.logger, "ffmpeg", &mut cmd, self.settings.timeout()) {
            discard(ctx, &audio);
            return Err(e);
        }
        Ok(audio)
    }

    /// Text recognized on screen by the configured OCR command, if any.
    fn screen_text(&self, ctx: &Context, item: &WorkItem) -> CollaboratorResult<Option<String>> {
        let mut parts = self.settings.ocr_command.split_whitespace();
        let program = match parts.next() {
            Some(program) => program,
            None => return Ok(None),
        };

        let mut cmd = Command::new(program);
        cmd.args(parts).arg(&item.path);
        let output = run_tool(&ctx.logger, "ocr", &mut cmd, self.settings.timeout())?;
        Ok(Some(output.stdout.trim().to_string()))
    }

    /// The transcript, or the on-screen text when speech is too sparse.
    fn usable_text(
        &self,
        ctx: &Context,
        client: &OpenAiClient,
        item: &WorkItem,
        audio: &Path,
    ) -> CollaboratorResult<String> {
        let min_words = self.settings.min_transcript_words;
        let transcript = client.transcribe(audio)?;
        if word_count(&transcript) >= min_words {
            return Ok(transcript);
        }

        ctx.logger.info(&format!(
            "Transcript for {} has {} words, trying on-screen text",
            item.name,
            word_count(&transcript)
        ));
        match self.screen_text(ctx, item) {
            Ok(Some(text)) if word_count(&text) >= min_words => Ok(text),
            Ok(_) => Err(CollaboratorError::NoUsableText(format!(
                "{} has fewer than {} words of speech or on-screen text",
                item.name, min_words
            ))),
            Err(e) => {
                ctx.logger.warn(&format!("On-screen text extraction failed: {}", e));
                Err(CollaboratorError::NoUsableText(format!(
                    "{} has fewer than {} words of speech",
                    item.name, min_words
                )))
            }
        }
    }
}

impl Collaborator for OpenAiEnricher {
    type Input = WorkItem;

    fn name(&self) -> &str {
        "openai"
    }

    fn process(&self, ctx: &Context, input: &WorkItem) -> CollaboratorResult<WorkItem> {
        if !input.path.exists() {
            return Err(CollaboratorError::NotFound(input.path.display().to_string()));
        }
        let client = OpenAiClient::from_settings(&self.settings)?;

        let audio = self.extract_audio(ctx, input)?;
        let text = match self.usable_text(ctx, &client, input, &audio) {
            Ok(text) => text,
            Err(e) => {
                discard(ctx, &audio);
                return Err(e);
            }
        };

        let transcript_path = ctx
            .layout
            .processed_transcripts()
            .join(format!("{}.txt", input.stem()));
        if let Some(parent) = transcript_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CollaboratorError::io("creating transcript directory", e))?;
        }
        persist::atomic_write(&transcript_path, text.as_bytes())
            .map_err(|e| CollaboratorError::io("saving transcript", e))?;

        let reply = client.chat(SYSTEM_PROMPT, &build_prompt(&text))?;
        let metadata = parse_reply(&reply);
        if metadata.title.is_empty() && metadata.description.is_empty() {
            return Err(CollaboratorError::invalid_response(
                "metadata reply",
                "no Title or Description line",
            ));
        }

        if !self.settings.keep_audio {
            discard(ctx, &audio);
        }

        ctx.logger.success(&format!("Generated metadata for {}: {}", input.name, metadata.title));
        let mut enriched = input.clone().with_metadata(metadata);
        enriched.transcript = Some(text);
        Ok(enriched)
    }
}

fn discard(ctx: &Context, path: &Path) {
    if let Err(e) = remove_if_exists(path) {
        ctx.logger
            .warn(&format!("Could not remove {}: {}", path.display(), e));
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::collaborators::test_support::{serve, write_script, Canned};
    use crate::orchestrator::testing::TestBed;
    use std::fs;

    const FAKE_FFMPEG: &str = r#"for last; do :; done; printf 'wav' > "$last""#;
    const LONG_SPEECH: &str = "this tiny robot folds your laundry in under ten seconds flat";
    const REPLY: &str = r#"{"choices":[{"message":{"content":"Title: Laundry Robot\nDescription: Folding made easy. #Tech #AI"}}]}"#;

    fn enricher(bed: &TestBed, base: &str, key_env: &str, ocr: &str) -> OpenAiEnricher {
        let ffmpeg = write_script(bed.ctx.layout.root(), "ffmpeg", FAKE_FFMPEG);
        OpenAiEnricher::new(
            EnrichSettings {
                api_base: base.to_string(),
                api_key_env: key_env.to_string(),
                ocr_command: ocr.to_string(),
                ..EnrichSettings::default()
            },
            ffmpeg.to_string_lossy().to_string(),
        )
    }

    fn final_item(bed: &TestBed, name: &str) -> WorkItem {
        let path = bed.ctx.layout.final_dir().join(name);
        fs::write(&path, "video").unwrap();
        WorkItem::from_path(path)
    }

    #[test]
    fn generates_metadata_and_saves_transcript() {
        std::env::set_var("SHORTS_TEST_ENRICH_KEY_A", "sk-a");
        let bed = TestBed::new();
        let (base, server) = serve(vec![Canned::text(200, LONG_SPEECH), Canned::json(200, REPLY)]);
        let enricher = enricher(&bed, &base, "SHORTS_TEST_ENRICH_KEY_A", "");
        let item = final_item(&bed, "clip.mp4");

        let out = enricher.process(&bed.ctx, &item).unwrap();
        let meta = out.metadata.unwrap();
        assert_eq!(meta.title, "Laundry Robot");
        assert_eq!(meta.tags, vec!["#Tech", "#AI"]);
        assert_eq!(out.path, item.path);

        let transcript = bed.ctx.layout.processed_transcripts().join("clip.txt");
        assert_eq!(fs::read_to_string(transcript).unwrap(), LONG_SPEECH);
        assert!(bed.ctx.layout.processed_audio().join("clip.wav").exists());

        let requests = server.join().unwrap();
        assert!(requests[1].body_text().contains(LONG_SPEECH));
    }

    #[test]
    fn sparse_speech_falls_back_to_screen_text() {
        std::env::set_var("SHORTS_TEST_ENRICH_KEY_B", "sk-b");
        let bed = TestBed::new();
        let ocr = write_script(
            bed.ctx.layout.root(),
            "ocr",
            "echo 'five gadgets you need in your kitchen this year right now'",
        );
        let (base, server) = serve(vec![Canned::text(200, "music"), Canned::json(200, REPLY)]);
        let enricher = enricher(&bed, &base, "SHORTS_TEST_ENRICH_KEY_B", &ocr.to_string_lossy());
        let item = final_item(&bed, "quiet.mp4");

        let out = enricher.process(&bed.ctx, &item).unwrap();
        assert!(out.transcript.unwrap().starts_with("five gadgets"));
        server.join().unwrap();
    }

    #[test]
    fn no_usable_text_fails_and_drops_audio() {
        std::env::set_var("SHORTS_TEST_ENRICH_KEY_C", "sk-c");
        let bed = TestBed::new();
        let (base, server) = serve(vec![Canned::text(200, "la la")]);
        let enricher = enricher(&bed, &base, "SHORTS_TEST_ENRICH_KEY_C", "");
        let item = final_item(&bed, "silent.mp4");

        let err = enricher.process(&bed.ctx, &item).unwrap_err();
        assert!(matches!(err, CollaboratorError::NoUsableText(_)));
        assert!(!bed.ctx.layout.processed_audio().join("silent.wav").exists());
        server.join().unwrap();
    }

    #[test]
    fn missing_key_fails_before_any_work() {
        let bed = TestBed::new();
        let enricher = enricher(&bed, "http://127.0.0.1:9", "SHORTS_TEST_ENRICH_KEY_UNSET", "");
        let item = final_item(&bed, "nokey.mp4");

        let err = enricher.process(&bed.ctx, &item).unwrap_err();
        assert!(matches!(err, CollaboratorError::MissingCredential(_)));
        assert!(!bed.ctx.layout.processed_audio().join("nokey.wav").exists());
    }
}
