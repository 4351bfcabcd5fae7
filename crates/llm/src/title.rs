use crate::events::TranscriptLine;

/// Title kept when summarization fails or yields nothing usable.
pub const FALLBACK_TITLE: &str = "New Chat";

const MAX_TITLE_CHARS: usize = 100;

pub fn build_title_prompt(transcript: &[TranscriptLine]) -> String {
    let conversation_text = transcript
        .iter()
        .map(|line| format!("{}: {}", line.role.as_str(), line.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Based on the following conversation, create a short, concise title (4-5 words maximum):\n\n{conversation_text}\n\nTitle:"
    )
}

/// Normalizes a raw model reply into a sidebar title.
pub fn clean_title(raw_title: &str) -> String {
    let without_quotes = raw_title.replace('"', "");
    let Some(first_line) = without_quotes
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
    else {
        return FALLBACK_TITLE.to_string();
    };

    if first_line.chars().count() > MAX_TITLE_CHARS {
        let truncated = first_line
            .chars()
            .take(MAX_TITLE_CHARS - 3)
            .collect::<String>();
        format!("{}...", truncated.trim_end())
    } else {
        first_line.to_string()
    }
}
