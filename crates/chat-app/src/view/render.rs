use std::fmt::Write as _;

use colored::Colorize;

use super::theme::Theme;
use crate::chat::{Conversation, ConversationId, Message, Role};

pub const WELCOME_TEXT: &str = "How can I help you today?";
pub const LOADING_INDICATOR: &str = "...";

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarEntry {
    pub position: usize,
    pub conversation_id: ConversationId,
    pub title: String,
    pub active: bool,
}

impl SidebarEntry {
    /// Builds rows from conversations already in newest-first order.
    pub fn from_conversations<'a>(
        conversations: impl IntoIterator<Item = &'a Conversation>,
        active: Option<&ConversationId>,
    ) -> Vec<Self> {
        conversations
            .into_iter()
            .enumerate()
            .map(|(index, conversation)| Self {
                position: index + 1,
                conversation_id: conversation.id.clone(),
                title: conversation.title.clone(),
                active: active == Some(&conversation.id),
            })
            .collect()
    }
}

pub fn render_sidebar(entries: &[SidebarEntry], theme: Theme) -> String {
    let palette = theme.palette();
    let mut output = format!("{}\n", "Conversations".color(palette.accent).bold());
    if entries.is_empty() {
        let _ = writeln!(output, "  {}", "(none yet, type a message or /new)".color(palette.muted));
        return output;
    }

    for entry in entries {
        let marker = if entry.active { "*" } else { " " };
        let line = format!("{marker} [{}] {}", entry.position, entry.title);
        if entry.active {
            let _ = writeln!(output, "{}", line.color(palette.accent).bold());
        } else {
            let _ = writeln!(output, "{line}");
        }
    }
    output
}

pub fn render_message(message: &Message, theme: Theme) -> String {
    let palette = theme.palette();
    match message.role {
        Role::User => format!("{} {}", "you:".color(palette.user).bold(), message.content),
        Role::Assistant => format!(
            "{} {}",
            "assistant:".color(palette.assistant).bold(),
            message.content
        ),
        Role::Error => format!(
            "{} {}",
            "ERROR:".color(palette.error).bold(),
            message.content.as_str().color(palette.error)
        ),
    }
}

/// Full transcript of one conversation, or the welcome screen when there is none.
pub fn render_transcript(
    conversation: Option<&Conversation>,
    is_loading: bool,
    theme: Theme,
) -> String {
    let palette = theme.palette();
    let Some(conversation) = conversation.filter(|conversation| !conversation.messages.is_empty())
    else {
        return format!("{}\n", WELCOME_TEXT.color(palette.accent).bold());
    };

    let mut output = format!("{}\n", conversation.title.as_str().color(palette.accent).bold());
    for message in &conversation.messages {
        if message.role == Role::Assistant && message.content.is_empty() {
            continue;
        }
        let _ = writeln!(output, "{}", render_message(message, theme));
    }
    if is_loading {
        let _ = writeln!(output, "{}", LOADING_INDICATOR.color(palette.muted));
    }
    output
}

pub fn render_help() -> String {
    [
        "type a message and press enter to send it",
        "/new         start a new conversation",
        "/list        show conversations, newest first",
        "/open <n>    switch to conversation n from /list",
        "/theme       toggle between dark and light",
        "/help        show this help",
        "/quit        exit",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MessageId;

    fn plain() {
        colored::control::set_override(false);
    }

    fn conversation(title: &str, messages: Vec<Message>) -> Conversation {
        Conversation {
            title: title.to_string(),
            messages,
            ..Conversation::new()
        }
    }

    #[test]
    fn empty_transcript_shows_the_welcome_text() {
        plain();
        assert_eq!(render_transcript(None, false, Theme::Dark), format!("{WELCOME_TEXT}\n"));
        let empty = conversation("New Chat", Vec::new());
        assert!(render_transcript(Some(&empty), false, Theme::Light).contains(WELCOME_TEXT));
    }

    #[test]
    fn transcript_tags_roles_and_shows_loading() {
        plain();
        let conversation = conversation(
            "Greeting",
            vec![
                Message::user("Hello"),
                Message::new(MessageId::new_v4(), Role::Assistant, "Hi there!"),
                Message::new(MessageId::new_v4(), Role::Error, "Failed"),
                Message::assistant_placeholder(),
            ],
        );

        let rendered = render_transcript(Some(&conversation), true, Theme::Dark);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                "Greeting",
                "you: Hello",
                "assistant: Hi there!",
                "ERROR: Failed",
                LOADING_INDICATOR,
            ]
        );
    }

    #[test]
    fn sidebar_marks_the_active_conversation() {
        plain();
        let first = conversation("Newest", Vec::new());
        let second = conversation("Older", Vec::new());
        let entries = SidebarEntry::from_conversations([&first, &second], Some(&second.id));

        let rendered = render_sidebar(&entries, Theme::Dark);
        assert!(rendered.contains("  [1] Newest"));
        assert!(rendered.contains("* [2] Older"));
    }

    #[test]
    fn empty_sidebar_has_a_hint() {
        plain();
        assert!(render_sidebar(&[], Theme::Light).contains("/new"));
    }
}
