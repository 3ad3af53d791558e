//! Output rendering for sessions.
//!
//! The session streams assistant text and raises non-blocking notifications
//! through a [`Renderer`]. Notifications never interrupt the session; a host
//! decides how to show them.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for dim text (used for info lines).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for green text (used for success notifications).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for yellow text (used for warnings).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Sink for streamed text and user-visible notifications.
///
/// Methods take `&self` because a session, its poll loop and its post-turn
/// pipeline share one renderer across tasks.
pub trait Renderer: Send + Sync {
    /// Print a chunk of assistant text as it streams in.
    fn print_text(&self, text: &str);

    /// Called when a reply is complete.
    fn finish_response(&self);

    /// Print an informational message.
    fn print_info(&self, info: &str);

    /// Print a success notification.
    fn print_success(&self, message: &str);

    /// Print a warning notification.
    fn print_warning(&self, message: &str);

    /// Print an error notification.
    fn print_error(&self, error: &str);

    /// Called when a reply is aborted.
    fn print_interrupted(&self) {
        self.print_info("[interrupted]");
    }
}

/// A renderer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn print_text(&self, _: &str) {}
    fn finish_response(&self) {}
    fn print_info(&self, _: &str) {}
    fn print_success(&self, _: &str) {}
    fn print_warning(&self, _: &str) {}
    fn print_error(&self, _: &str) {}
    fn print_interrupted(&self) {}
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    use_color: bool,
    mid_line: Mutex<bool>,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            use_color,
            mid_line: Mutex::new(false),
        }
    }

    /// Returns whether ANSI colors are enabled.
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Ends a partially printed reply line so a notification starts cleanly.
    fn break_line(&self) {
        let mut mid_line = self.mid_line.lock().unwrap_or_else(PoisonError::into_inner);
        if *mid_line {
            println!();
            *mid_line = false;
        }
    }

    fn notify(&self, color: &str, prefix: &str, message: &str) {
        self.break_line();
        if self.use_color {
            eprintln!("{color}{prefix}{message}{ANSI_RESET}");
        } else {
            eprintln!("{prefix}{message}");
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut mid_line = self.mid_line.lock().unwrap_or_else(PoisonError::into_inner);
        print!("{text}");
        *mid_line = !text.ends_with('\n');
        let _ = io::stdout().flush();
    }

    fn finish_response(&self) {
        self.break_line();
        println!();
    }

    fn print_info(&self, info: &str) {
        self.break_line();
        if self.use_color {
            println!("{ANSI_DIM}{info}{ANSI_RESET}");
        } else {
            println!("{info}");
        }
    }

    fn print_success(&self, message: &str) {
        self.notify(ANSI_GREEN, "", message);
    }

    fn print_warning(&self, message: &str) {
        self.notify(ANSI_YELLOW, "Warning: ", message);
    }

    fn print_error(&self, error: &str) {
        self.notify(ANSI_RED, "Error: ", error);
    }
}

/// One notification captured by a [`CapturingRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// From [`Renderer::print_info`].
    Info(String),
    /// From [`Renderer::print_success`].
    Success(String),
    /// From [`Renderer::print_warning`].
    Warning(String),
    /// From [`Renderer::print_error`].
    Error(String),
    /// From [`Renderer::print_interrupted`].
    Interrupted,
}

/// Collects output in memory, for headless hosts and tests.
#[derive(Debug, Default)]
pub struct CapturingRenderer {
    text: Mutex<String>,
    notifications: Mutex<Vec<Notification>>,
}

impl CapturingRenderer {
    /// Creates an empty renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// All streamed text so far.
    pub fn text(&self) -> String {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All notifications so far, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, notification: Notification) {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

impl Renderer for CapturingRenderer {
    fn print_text(&self, text: &str) {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
    }

    fn finish_response(&self) {}

    fn print_info(&self, info: &str) {
        self.push(Notification::Info(info.to_string()));
    }

    fn print_success(&self, message: &str) {
        self.push(Notification::Success(message.to_string()));
    }

    fn print_warning(&self, message: &str) {
        self.push(Notification::Warning(message.to_string()));
    }

    fn print_error(&self, error: &str) {
        self.push(Notification::Error(error.to_string()));
    }

    fn print_interrupted(&self) {
        self.push(Notification::Interrupted);
    }
}
