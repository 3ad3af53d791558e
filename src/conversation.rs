//! The conversation store.
//!
//! [`Conversation`] is the ordered message history plus the parsed projection
//! users see. It is append-only apart from [`Conversation::drop_last`], which
//! the session uses to retry after a failed turn.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;

use crate::parser::MessageParser;
use crate::types::{ContentPart, Message, Role};

static MESSAGE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

/// A fresh message id of the form `<ms>-<seq>`.
///
/// The sequence is process-wide, so ids are unique even within one
/// millisecond.
pub fn next_message_id() -> String {
    let seq = MESSAGE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}-{seq}", now_millis())
}

/// Prefix user text with the model and provider the backend should use.
pub fn frame_user_text(model: &str, provider: &str, text: &str) -> String {
    format!("[Model: {model}]\n\n[Provider: {provider}]\n\n{text}")
}

/// A framed user message with image attachments after the text.
pub fn framed_user_message(
    id: impl Into<String>,
    model: &str,
    provider: &str,
    text: &str,
    images: &[String],
) -> Message {
    let mut content = vec![ContentPart::text(frame_user_text(model, provider, text))];
    content.extend(images.iter().map(ContentPart::image));
    Message::new(id, Role::User, content)
}

/// Render modified workspace files as a "User Updated Files" artifact block.
pub fn files_to_artifact(files: &BTreeMap<String, String>, id: &str) -> String {
    let actions: Vec<String> = files
        .iter()
        .map(|(path, content)| {
            format!("<boltAction type=\"file\" filePath=\"{path}\">{content}</boltAction>")
        })
        .collect();
    format!(
        "<boltArtifact id=\"{id}\" title=\"User Updated Files\">\n{}\n</boltArtifact>\n\n",
        actions.join("\n")
    )
}

/// Ordered message history with its parsed projection.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    rendered: Vec<Message>,
    parser: MessageParser,
    initial_len: usize,
}

impl Conversation {
    /// Create an empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from restored messages.
    pub fn restored(messages: Vec<Message>) -> Self {
        let mut conversation = Self {
            initial_len: messages.len(),
            messages,
            ..Self::default()
        };
        conversation.refresh_projection();
        conversation
    }

    /// The raw message history.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Length of the history the conversation started from.
    pub fn initial_len(&self) -> usize {
        self.initial_len
    }

    /// Returns true if anything was added since the conversation started.
    pub fn has_grown(&self) -> bool {
        self.messages.len() > self.initial_len
    }

    /// The most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append several messages in order.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Remove the most recent message.
    pub fn drop_last(&mut self) -> Option<Message> {
        let message = self.messages.pop()?;
        self.parser.remove(&message.id);
        self.rendered.truncate(self.messages.len());
        Some(message)
    }

    /// Append streamed assistant text.
    ///
    /// The delta goes to the last message if it is an assistant message;
    /// otherwise a new assistant message is started with a fresh id.
    pub fn append_assistant_text(&mut self, delta: &str) {
        if let Some(message) = self
            .messages
            .last_mut()
            .filter(|m| m.role == Role::Assistant)
        {
            message.push_text(delta);
            return;
        }
        self.messages
            .push(Message::assistant(next_message_id(), delta));
    }

    /// Recompute the parsed projection of every message.
    pub fn refresh_projection(&mut self) -> &[Message] {
        self.rendered.truncate(self.messages.len());
        for (idx, message) in self.messages.iter().enumerate() {
            let rendered = match message.role {
                Role::User => message.clone(),
                Role::Assistant => {
                    let parsed = self.parser.parse(&message.id, &message.text()).to_string();
                    let mut rendered = message.clone();
                    rendered.content = vec![ContentPart::text(parsed)];
                    rendered
                }
            };
            match self.rendered.get_mut(idx) {
                Some(slot) => *slot = rendered,
                None => self.rendered.push(rendered),
            }
        }
        &self.rendered
    }

    /// The projection as of the last [`Conversation::refresh_projection`].
    pub fn rendered(&self) -> &[Message] {
        &self.rendered
    }
}
