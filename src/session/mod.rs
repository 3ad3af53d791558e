//! The session controller.
//!
//! A [`Session`] owns one conversation and reconciles the four sources that
//! touch it: user sends, streamed tokens, externally injected commands, and
//! throttled persistence. It is organized into:
//!
//! - [`config`]: `arrrg` argument parsing, the YAML overlay, and defaults
//! - [`controller`]: the [`Session`] itself and its builder
//! - [`commands`]: slash commands for the REPL

mod commands;
mod config;
mod controller;

pub use commands::{SessionCommand, attachment_data_url, help_text, parse_command};
pub use config::{
    ConfigFile, DEFAULT_PROMPT_ID, DEFAULT_RESET_LOCATION, SessionArgs, SessionConfig,
};
pub use controller::{
    SendOutcome, SendRequest, Session, SessionBuilder, SessionPhase, SessionStats,
};
