//! Chat command parsing
//!
//! Turns raw message text into a typed [`Command`]. Everything here is pure:
//! no I/O, no registry access.
//!
//! - [`parser`] - `/dl` arguments into a [`JobRequest`]
//! - [`episodes`] - episode specification expansion

mod episodes;
mod parser;

pub use episodes::expand_episodes;
pub use parser::parse_download;

use crate::error::ParseError;
use crate::sinks::SinkKind;
use crate::types::JobRequest;

/// A recognised bot command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/dl ...` - start a job
    Download(JobRequest),
    /// `/cancel` - stop this chat's job
    Cancel,
    /// `/status`, `/stats`, `/storage` - sink configuration and active jobs
    Status,
    /// `/toggle <sink> [on|off]` - flip or set a sink
    Toggle {
        /// Sink to change
        sink: SinkKind,
        /// Desired state; `None` flips the current one
        enabled: Option<bool>,
    },
    /// `/help`, `/start`
    Help,
}

/// Parse a message into a command.
///
/// Returns `None` for text that is not a command at all (or an unknown verb),
/// `Some(Err)` for a known verb with bad arguments.
pub fn parse_command(text: &str) -> Option<Result<Command, ParseError>> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let (verb, args) = match rest.split_once(char::is_whitespace) {
        Some((verb, args)) => (verb, args.trim()),
        None => (rest, ""),
    };
    // `/dl@MyBot` in group chats
    let verb = verb.split('@').next().unwrap_or(verb).to_ascii_lowercase();

    let command = match verb.as_str() {
        "dl" | "download" => parse_download(args).map(Command::Download),
        "cancel" | "stop" => Ok(Command::Cancel),
        "status" | "stats" | "storage" => Ok(Command::Status),
        "toggle" => parse_toggle(args),
        "help" | "start" => Ok(Command::Help),
        _ => return None,
    };
    Some(command)
}

fn parse_toggle(args: &str) -> Result<Command, ParseError> {
    let mut parts = args.split_whitespace();
    let sink = parts
        .next()
        .and_then(SinkKind::from_name)
        .ok_or(ParseError::InvalidToggle)?;
    let enabled = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        None => None,
        Some("on" | "enable" | "true") => Some(true),
        Some("off" | "disable" | "false") => Some(false),
        Some(_) => return Err(ParseError::InvalidToggle),
    };
    Ok(Command::Toggle { sink, enabled })
}

/// Text sent for `/help`
pub const HELP_TEXT: &str = "\
/dl -a \"Title\" -e 1,3,5-7 [-r 1080|720|360|all|best] [-o jpn|eng] [--video] [--channel|--no-channel] [--mega|--no-mega]
/cancel - stop the running job in this chat
/status - sinks and active jobs
/toggle channel|mega [on|off] - enable or disable a sink";

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_commands_are_ignored() {
        assert!(parse_command("hello there").is_none());
        assert!(parse_command("/unknown").is_none());
        assert!(parse_command("").is_none());
    }

    #[test]
    fn verbs_with_bot_suffix() {
        assert_eq!(parse_command("/cancel@AnimeBot"), Some(Ok(Command::Cancel)));
        assert_eq!(parse_command("/STATS"), Some(Ok(Command::Status)));
        assert_eq!(parse_command("/storage"), Some(Ok(Command::Status)));
        assert_eq!(parse_command("/start"), Some(Ok(Command::Help)));
    }

    #[test]
    fn download_command_parses_request() {
        let cmd = parse_command(r#"/dl -a "Naruto" -e 1-2"#).unwrap().unwrap();
        match cmd {
            Command::Download(req) => {
                assert_eq!(req.title, "Naruto");
                assert_eq!(req.episodes, vec![1, 2]);
            }
            other => panic!("expected Download, got {other:?}"),
        }
    }

    #[test]
    fn bare_download_is_usage_error() {
        assert_eq!(parse_command("/dl"), Some(Err(ParseError::Empty)));
    }

    #[test]
    fn toggle_variants() {
        assert_eq!(
            parse_command("/toggle mega on"),
            Some(Ok(Command::Toggle {
                sink: SinkKind::Offsite,
                enabled: Some(true)
            }))
        );
        assert_eq!(
            parse_command("/toggle channel"),
            Some(Ok(Command::Toggle {
                sink: SinkKind::Channel,
                enabled: None
            }))
        );
        assert_eq!(
            parse_command("/toggle dropbox"),
            Some(Err(ParseError::InvalidToggle))
        );
        assert_eq!(
            parse_command("/toggle mega sideways"),
            Some(Err(ParseError::InvalidToggle))
        );
    }
}
