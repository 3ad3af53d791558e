//! Slash command parsing for the chatloop REPL.
//!
//! Lines that start with `/` control the session instead of being sent.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// A parsed session command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Change the model.
    Model(String),

    /// Change the provider.
    Provider(String),

    /// Attach an image file to the next message.
    Attach(String),

    /// Abort the turn in flight.
    Abort,

    /// Display session statistics.
    Stats,

    /// Display help information.
    Help,

    /// Exit.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `None` if the input should be sent as a message.
///
/// # Examples
///
/// ```
/// # use chatloop::session::{SessionCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(SessionCommand::Quit));
/// assert!(parse_command("Build a todo app").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<SessionCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "model" => match argument {
            Some(model) => SessionCommand::Model(model.to_string()),
            None => SessionCommand::Invalid("/model requires a model name".to_string()),
        },
        "provider" => match argument {
            Some(provider) => SessionCommand::Provider(provider.to_string()),
            None => SessionCommand::Invalid("/provider requires a provider name".to_string()),
        },
        "attach" => match argument {
            Some(path) => SessionCommand::Attach(path.to_string()),
            None => SessionCommand::Invalid("/attach requires a file path".to_string()),
        },
        "abort" | "stop" => SessionCommand::Abort,
        "stats" | "status" => SessionCommand::Stats,
        "help" | "?" => SessionCommand::Help,
        "quit" | "exit" | "q" => SessionCommand::Quit,
        _ => SessionCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Read an image file into a `data:` URL suitable for an attachment.
pub fn attachment_data_url(path: &str) -> Result<String> {
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    let mime = match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => {
            return Err(Error::validation(
                format!("unsupported attachment type: {path}"),
                Some("path".to_string()),
            ));
        }
    };
    let bytes =
        std::fs::read(path).map_err(|err| Error::io(format!("failed to read {path}"), err))?;
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /model <name>          Change the model
  /provider <name>       Change the provider (e.g., /provider OpenAI)
  /attach <file>         Attach a png/jpeg/gif/webp image to the next message
  /abort                 Abort the response in progress
  /stats                 Show session statistics
  /help                  Show this help message
  /quit                  Exit

Sending a message while a response is streaming aborts it."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert!(parse_command("Build a todo app").is_none());
        assert!(parse_command("").is_none());
    }

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(SessionCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(SessionCommand::Quit));
        assert_eq!(parse_command("  /q  "), Some(SessionCommand::Quit));
    }

    #[test]
    fn parse_model_and_provider() {
        assert_eq!(
            parse_command("/model   gpt-x  "),
            Some(SessionCommand::Model("gpt-x".to_string()))
        );
        assert_eq!(
            parse_command("/PROVIDER OpenAI"),
            Some(SessionCommand::Provider("OpenAI".to_string()))
        );
        assert!(matches!(
            parse_command("/provider"),
            Some(SessionCommand::Invalid(msg)) if msg.contains("requires")
        ));
    }

    #[test]
    fn parse_attach() {
        assert_eq!(
            parse_command("/attach shot.png"),
            Some(SessionCommand::Attach("shot.png".to_string()))
        );
        assert!(matches!(
            parse_command("/attach"),
            Some(SessionCommand::Invalid(_))
        ));
    }

    #[test]
    fn parse_unknown() {
        assert_eq!(
            parse_command("/frobnicate"),
            Some(SessionCommand::Invalid("Unknown command: /frobnicate".to_string()))
        );
    }

    #[test]
    fn attachment_encodes_png() {
        let path = format!(
            "{}/chatloop-attach-{}.png",
            std::env::temp_dir().display(),
            std::process::id()
        );
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();
        let url = attachment_data_url(&path).unwrap();
        assert_eq!(url, "data:image/png;base64,iVBORw==");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn attachment_rejects_unknown_types() {
        assert!(attachment_data_url("notes.txt").is_err());
    }

    #[test]
    fn help_mentions_every_command() {
        let help = help_text();
        for command in ["/model", "/provider", "/attach", "/abort", "/stats", "/help", "/quit"] {
            assert!(help.contains(command), "{command}");
        }
    }
}
