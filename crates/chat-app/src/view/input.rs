/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Send(String),
    NewChat,
    List,
    /// 1-based position in the newest-first list.
    Open(usize),
    ToggleTheme,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_input(line: &str) -> InputCommand {
    let line = line.trim();
    if line.is_empty() {
        return InputCommand::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return InputCommand::Send(line.to_string());
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let argument = parts.next();
    match (name, argument) {
        ("new", None) => InputCommand::NewChat,
        ("list" | "ls", None) => InputCommand::List,
        ("open", Some(position)) => match position.parse::<usize>() {
            Ok(position) if position > 0 => InputCommand::Open(position),
            _ => InputCommand::Invalid(format!("`{position}` is not a conversation number")),
        },
        ("open", None) => InputCommand::Invalid("usage: /open <number>".to_string()),
        ("theme", None) => InputCommand::ToggleTheme,
        ("help" | "?", None) => InputCommand::Help,
        ("quit" | "exit" | "q", None) => InputCommand::Quit,
        _ => InputCommand::Invalid(format!("unknown command `/{command}`, try /help")),
    }
}

impl InputCommand {
    /// Commands that stay available while a reply is streaming.
    pub fn allowed_while_loading(&self) -> bool {
        !matches!(self, Self::Send(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_trimmed_and_sent() {
        assert_eq!(parse_input("  hello there \n"), InputCommand::Send("hello there".to_string()));
        assert_eq!(parse_input("   "), InputCommand::Empty);
    }

    #[test]
    fn commands_are_recognised() {
        assert_eq!(parse_input("/new"), InputCommand::NewChat);
        assert_eq!(parse_input("/list"), InputCommand::List);
        assert_eq!(parse_input("/open 3"), InputCommand::Open(3));
        assert_eq!(parse_input("/theme"), InputCommand::ToggleTheme);
        assert_eq!(parse_input("/help"), InputCommand::Help);
        assert_eq!(parse_input("/quit"), InputCommand::Quit);
    }

    #[test]
    fn bad_commands_are_invalid() {
        assert!(matches!(parse_input("/open"), InputCommand::Invalid(_)));
        assert!(matches!(parse_input("/open 0"), InputCommand::Invalid(_)));
        assert!(matches!(parse_input("/open two"), InputCommand::Invalid(_)));
        assert!(matches!(parse_input("/frobnicate"), InputCommand::Invalid(_)));
    }

    #[test]
    fn only_messages_wait_for_the_stream() {
        assert!(!InputCommand::Send("hi".to_string()).allowed_while_loading());
        assert!(InputCommand::Open(1).allowed_while_loading());
        assert!(InputCommand::NewChat.allowed_while_loading());
    }
}
