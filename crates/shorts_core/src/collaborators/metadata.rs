//! Prompt text and reply parsing for generated titles and descriptions.

use crate::models::VideoMetadata;

/// System message for the metadata request.
pub const SYSTEM_PROMPT: &str =
    "You are a YouTube Shorts coach for tech content. Be concise and punchy.";

/// User prompt asking for a title and description for `transcript`.
pub fn build_prompt(transcript: &str) -> String {
    format!(
        "Create a Title (<=10 words) and a Description (short summary + 10-12 trending hashtags) \
         for a YouTube Short about this transcript:\n\n{}\n\n\
         Format strictly as:\nTitle: <title>\nDescription: <one short paragraph + hashtags>",
        transcript
    )
}

/// Parse a `Title: ... / Description: ...` reply.
///
/// Labels are matched case-insensitively. Once a title has been seen, any
/// other non-empty line is appended to the description.
pub fn parse_reply(reply: &str) -> VideoMetadata {
    let mut title = String::new();
    let mut description = String::new();

    for line in reply.lines() {
        let line = line.trim();
        if let Some(rest) = strip_label(line, "title:") {
            title = rest.to_string();
        } else if let Some(rest) = strip_label(line, "description:") {
            description = rest.to_string();
        } else if !title.is_empty() && !line.is_empty() {
            if !description.is_empty() {
                description.push(' ');
            }
            description.push_str(line);
        }
    }

    let tags = extract_hashtags(&description);
    VideoMetadata {
        title: title.trim_matches('"').trim().to_string(),
        description,
        tags,
    }
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if head.eq_ignore_ascii_case(label) {
        Some(line[label.len()..].trim())
    } else {
        None
    }
}

/// Whitespace-separated words of `text` that start with `#`, without duplicates.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let tag = word.trim_end_matches(|c: char| matches!(c, ',' | '.' | ';' | '!' | '?'));
        if tag.len() > 1 && tag.starts_with('#') && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Number of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
