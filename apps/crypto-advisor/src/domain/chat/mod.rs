//! Inbound Chat Updates
//!
//! Updates arrive in batches with strictly increasing ids. Only text
//! messages are actionable; other updates still carry an id so the
//! ingestion cursor can move past them.

/// One inbound update from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUpdate {
    /// Monotonically increasing update id.
    pub update_id: i64,
    /// Text message, if the update carries one.
    pub message: Option<ChatMessage>,
}

/// A text message received in a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Chat the message was sent in; replies go back here.
    pub chat_id: i64,
    /// Raw message text.
    pub text: String,
    /// Leading `/command`, lowercased and without the `@bot` suffix.
    pub command: Option<String>,
}

impl ChatMessage {
    /// Build a message, deriving the command from the text.
    #[must_use]
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        let text = text.into();
        let command = parse_command(&text);
        Self {
            chat_id,
            text,
            command,
        }
    }
}

/// Parse a leading bot command such as `/advice@my_bot eth`.
#[must_use]
pub fn parse_command(text: &str) -> Option<String> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or_default();
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase())
}

// =============================================================================
// Intent Classification
// =============================================================================

/// What the ingestion loop should do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Greet the user.
    Start,
    /// List available commands.
    Help,
    /// Run the advisory pipeline.
    Advice,
    /// Not addressed to the bot.
    Ignore,
}

/// Localized button text for `/start`.
pub const START_TEXT: &str = "старт";
/// Localized button text for `/help`.
pub const HELP_TEXT: &str = "помощь";
/// Localized button text for `/advice`.
pub const ADVICE_TEXT: &str = "рекомендации";

impl Intent {
    /// Classify a message by its command or exact localized text.
    #[must_use]
    pub fn classify(message: &ChatMessage) -> Self {
        let command = message.command.as_deref();
        let text = message.text.as_str();

        if command == Some("start") || text == START_TEXT {
            Self::Start
        } else if command == Some("help") || text == HELP_TEXT {
            Self::Help
        } else if command == Some("advice") || text == ADVICE_TEXT {
            Self::Advice
        } else {
            Self::Ignore
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("/start", Some("start"))]
    #[test_case("/Advice eth", Some("advice"))]
    #[test_case("/help@crypto_bot", Some("help"))]
    #[test_case("  /advice", Some("advice"))]
    #[test_case("advice", None)]
    #[test_case("/", None)]
    #[test_case("/@bot", None)]
    #[test_case("", None)]
    fn parses_commands(text: &str, expected: Option<&str>) {
        assert_eq!(parse_command(text).as_deref(), expected);
    }

    #[test_case("/start", Intent::Start)]
    #[test_case("старт", Intent::Start)]
    #[test_case("/help", Intent::Help)]
    #[test_case("помощь", Intent::Help)]
    #[test_case("/advice btc", Intent::Advice)]
    #[test_case("рекомендации", Intent::Advice)]
    #[test_case("рекомендации please", Intent::Ignore; "localized text must match exactly")]
    #[test_case("what about bitcoin", Intent::Ignore)]
    #[test_case("/unknown", Intent::Ignore)]
    fn classifies_messages(text: &str, expected: Intent) {
        assert_eq!(Intent::classify(&ChatMessage::new(42, text)), expected);
    }
}
