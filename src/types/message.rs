use serde::{Deserialize, Serialize};

/// Annotation marking a message that is sent to the backend but not shown to the user.
pub const HIDDEN_ANNOTATION: &str = "hidden";

/// Role of a conversation message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User role.
    User,

    /// Assistant role.
    Assistant,
}

/// One part of a message's content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },

    /// An image attachment, carried as a data URL.
    Image {
        /// The image data URL.
        image: String,
    },
}

impl ContentPart {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Create an image part.
    pub fn image(image: impl Into<String>) -> Self {
        ContentPart::Image {
            image: image.into(),
        }
    }
}

/// A single conversation message.
///
/// Assistant messages keep the raw streamed text in their text parts; the parsed
/// projection shown to users is derived from it and never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique message id.
    pub id: String,

    /// Who produced the message.
    pub role: Role,

    /// Ordered content parts.
    pub content: Vec<ContentPart>,

    /// Free-form tags such as [`HIDDEN_ANNOTATION`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<String>,
}

impl Message {
    /// Create a message from parts.
    pub fn new(id: impl Into<String>, role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            id: id.into(),
            role,
            content,
            annotations: Vec::new(),
        }
    }

    /// Create a user message holding a single text part.
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::User, vec![ContentPart::text(text)])
    }

    /// Create an assistant message holding a single text part.
    pub fn assistant(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, vec![ContentPart::text(text)])
    }

    /// Add an annotation, ignoring duplicates.
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        let annotation = annotation.into();
        if !self.annotations.contains(&annotation) {
            self.annotations.push(annotation);
        }
        self
    }

    /// Returns true if the message carries the hidden annotation.
    pub fn is_hidden(&self) -> bool {
        self.annotations.iter().any(|a| a == HIDDEN_ANNOTATION)
    }

    /// Concatenation of every text part.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for part in &self.content {
            if let ContentPart::Text { text: t } = part {
                text.push_str(t);
            }
        }
        text
    }

    /// Appends streamed text to the last text part, creating one if necessary.
    pub fn push_text(&mut self, delta: &str) {
        if let Some(ContentPart::Text { text }) = self.content.last_mut() {
            text.push_str(delta);
        } else {
            self.content.push(ContentPart::text(delta));
        }
    }

    /// Number of image parts.
    pub fn image_count(&self) -> usize {
        self.content
            .iter()
            .filter(|part| matches!(part, ContentPart::Image { .. }))
            .count()
    }
}
