/// Command parsing for messages sent to the bot
use std::fmt;

/// A parsed bot command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Show usage
    Start,
    /// Show usage
    Help,
    /// Submit a request. The text is trimmed and may be empty.
    Request { text: String },
}

/// Result of parsing a message for bot commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// The message is not a command
    NoCommand,
    /// A command addressed to another bot in the same chat
    OtherBot,
    /// A `/command` this bot does not know
    UnrecognizedCommand {
        /// The unrecognized command name, without the slash
        attempted: String,
        /// Whether the command carried this bot's `@username`
        addressed: bool,
    },
    /// A valid command was found
    Command(BotCommand),
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotCommand::Start => write!(f, "start"),
            BotCommand::Help => write!(f, "help"),
            BotCommand::Request { text } => write!(f, "request {}", text),
        }
    }
}

/// Parse message text for bot commands
///
/// # Command Format
///
/// The command must open the message: `/<name>[@<bot username>] [text...]`.
/// Names are case-insensitive. The `@username` suffix is what chat clients
/// append in groups; a suffix naming a different bot yields `OtherBot` so
/// that several bots can share a chat. The argument text runs to the end of
/// the message, newlines included.
///
/// # Available Commands
///
/// - `start`, `help` - usage text
/// - `request <text>` - submit a request
///
/// Example: `/request@request_bot Movie X 2020`
pub fn parse_message(text: &str, bot_username: &str) -> ParseResult {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return ParseResult::NoCommand;
    };

    let (head, argument) = match rest.split_once(|c: char| c.is_whitespace()) {
        Some((head, argument)) => (head, argument.trim()),
        None => (rest, ""),
    };

    let (name, addressed) = match head.split_once('@') {
        Some((name, addressee)) => {
            if !addressee.eq_ignore_ascii_case(bot_username) {
                return ParseResult::OtherBot;
            }
            (name, true)
        }
        None => (head, false),
    };

    if name.eq_ignore_ascii_case("start") {
        ParseResult::Command(BotCommand::Start)
    } else if name.eq_ignore_ascii_case("help") {
        ParseResult::Command(BotCommand::Help)
    } else if name.eq_ignore_ascii_case("request") {
        ParseResult::Command(BotCommand::Request {
            text: argument.to_string(),
        })
    } else {
        ParseResult::UnrecognizedCommand {
            attempted: name.to_string(),
            addressed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: &str = "request_bot";

    fn request(text: &str) -> ParseResult {
        ParseResult::Command(BotCommand::Request {
            text: text.to_string(),
        })
    }

    #[test]
    fn test_parse_request_command() {
        assert_eq!(
            parse_message("/request Movie X 2020", BOT),
            request("Movie X 2020")
        );
        assert_eq!(
            parse_message("/REQUEST Movie X 2020", BOT),
            request("Movie X 2020")
        );
        assert_eq!(
            parse_message("  /request   Movie X 2020  ", BOT),
            request("Movie X 2020")
        );
    }

    #[test]
    fn test_parse_request_keeps_inner_lines() {
        assert_eq!(
            parse_message("/request Movie X\n2020 remaster", BOT),
            request("Movie X\n2020 remaster")
        );
    }

    #[test]
    fn test_parse_request_without_text() {
        assert_eq!(parse_message("/request", BOT), request(""));
        assert_eq!(parse_message("/request   ", BOT), request(""));
    }

    #[test]
    fn test_parse_start_and_help() {
        assert_eq!(
            parse_message("/start", BOT),
            ParseResult::Command(BotCommand::Start)
        );
        assert_eq!(
            parse_message("/help me", BOT),
            ParseResult::Command(BotCommand::Help)
        );
    }

    #[test]
    fn test_addressed_to_this_bot() {
        assert_eq!(
            parse_message("/request@request_bot Movie", BOT),
            request("Movie")
        );
        assert_eq!(
            parse_message("/request@Request_Bot Movie", BOT),
            request("Movie")
        );
    }

    #[test]
    fn test_addressed_to_other_bot() {
        assert_eq!(
            parse_message("/request@other_bot Movie", BOT),
            ParseResult::OtherBot
        );
    }

    #[test]
    fn test_no_command() {
        assert_eq!(parse_message("hello there", BOT), ParseResult::NoCommand);
        assert_eq!(parse_message("", BOT), ParseResult::NoCommand);
        assert_eq!(
            parse_message("please /request this", BOT),
            ParseResult::NoCommand
        );
    }

    #[test]
    fn test_unrecognized_command() {
        assert_eq!(
            parse_message("/whisper @bob hi", BOT),
            ParseResult::UnrecognizedCommand {
                attempted: "whisper".to_string(),
                addressed: false
            }
        );
        assert_eq!(
            parse_message("/whisper@request_bot hi", BOT),
            ParseResult::UnrecognizedCommand {
                attempted: "whisper".to_string(),
                addressed: true
            }
        );
        assert_eq!(
            parse_message("/", BOT),
            ParseResult::UnrecognizedCommand {
                attempted: String::new(),
                addressed: false
            }
        );
    }

    #[test]
    fn test_requires_whitespace_boundary() {
        assert_eq!(
            parse_message("/requestMovie", BOT),
            ParseResult::UnrecognizedCommand {
                attempted: "requestMovie".to_string(),
                addressed: false
            }
        );
    }
}
