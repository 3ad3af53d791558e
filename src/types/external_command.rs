use serde::{Deserialize, Serialize};

use crate::types::ProviderInfo;

/// A command submitted out-of-band through the mailbox.
///
/// Every field is optional. `reset: true` asks the client to navigate back to
/// its base location and supersedes everything else in the same payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCommand {
    /// Request a navigation reset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<bool>,

    /// Model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Provider override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderInfo>,

    /// Text to send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    /// Image attachments as data URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data_list: Option<Vec<String>>,
}

impl ExternalCommand {
    /// A command that only requests a navigation reset.
    pub fn reset() -> Self {
        Self {
            reset: Some(true),
            ..Self::default()
        }
    }

    /// A command that sends `input` with the session's current selection.
    pub fn send(input: impl Into<String>) -> Self {
        Self {
            input: Some(input.into()),
            ..Self::default()
        }
    }

    /// Sets the model override.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the provider override.
    pub fn with_provider(mut self, provider: ProviderInfo) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sets the image attachments.
    pub fn with_image_data_list(mut self, images: Vec<String>) -> Self {
        self.image_data_list = Some(images);
        self
    }

    /// Returns true if this command asks for a navigation reset.
    pub fn is_reset(&self) -> bool {
        self.reset == Some(true)
    }
}

/// Body returned by the mailbox's consume endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailboxEnvelope {
    /// The pending command, or `None` when the slot was empty.
    #[serde(default)]
    pub data: Option<ExternalCommand>,
}
