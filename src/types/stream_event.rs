use serde_json::Value;

use crate::types::Usage;

/// One decoded frame of the completion backend's data stream.
///
/// Frames arrive as `<code>:<json>` lines. Only the codes the session acts on
/// get their own variant; tool-call and source frames are kept as
/// [`StreamEvent::Other`] so callers can still observe them.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// `0:` a chunk of assistant text.
    TextDelta(String),

    /// `2:` structured data frames attached to the turn.
    Data(Vec<Value>),

    /// `3:` the backend reported an error mid-stream.
    Error(String),

    /// `8:` annotations for the in-flight assistant message.
    MessageAnnotations(Vec<Value>),

    /// `f:` a generation step started.
    StartStep {
        /// Id the backend assigned to the assistant message, if any.
        message_id: Option<String>,
    },

    /// `e:` a generation step finished; more steps may follow.
    FinishStep {
        /// Why the step ended.
        finish_reason: Option<String>,
        /// Usage for this step.
        usage: Option<Usage>,
        /// True when the next step continues the same message.
        is_continued: bool,
    },

    /// `d:` terminal frame for the whole turn.
    FinishMessage {
        /// Why generation ended.
        finish_reason: Option<String>,
        /// Usage for the whole turn.
        usage: Option<Usage>,
    },

    /// Any other recognised frame code.
    Other {
        /// The frame code.
        code: char,
        /// The decoded payload.
        value: Value,
    },
}

impl StreamEvent {
    /// Returns true for the frame that ends a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::FinishMessage { .. })
    }
}
