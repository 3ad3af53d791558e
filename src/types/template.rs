use serde::{Deserialize, Serialize};

/// Template identifier meaning "no starter template".
pub const BLANK_TEMPLATE: &str = "blank";

/// Input to template classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateRequest {
    /// The user's first message, without model/provider framing.
    pub message: String,
    /// Model to classify with.
    pub model: String,
    /// Provider name to classify with.
    pub provider: String,
}

/// Result of template classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateSelection {
    /// Template identifier, or [`BLANK_TEMPLATE`].
    pub template: String,
    /// Suggested project title.
    #[serde(default)]
    pub title: String,
}

impl TemplateSelection {
    /// A blank selection.
    pub fn blank() -> Self {
        Self {
            template: BLANK_TEMPLATE.to_string(),
            title: String::new(),
        }
    }

    /// Returns true if no template was selected.
    pub fn is_blank(&self) -> bool {
        self.template.is_empty() || self.template == BLANK_TEMPLATE
    }
}

/// Seed content for a selected template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSeed {
    /// Assistant acknowledgment embedding the template files.
    pub assistant_message: String,
    /// Follow-up instructions sent as a hidden user message.
    pub user_message: String,
}
