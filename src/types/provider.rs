use std::fmt;

use serde::{Deserialize, Serialize};

/// Model used when neither configuration nor the key-value store name one.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

/// Provider used when neither configuration nor the key-value store name one.
pub const DEFAULT_PROVIDER: &str = "Anthropic";

/// Identifies a completion provider.
///
/// External commands usually carry only the name; the remaining fields are
/// preserved when present so the backend sees what the caller sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    /// Provider name, e.g. `"OpenAI"`.
    pub name: String,

    /// Link to the provider's API key page, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get_api_key_link: Option<String>,

    /// Label to show next to the API key link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_for_get_api_key: Option<String>,
}

impl ProviderInfo {
    /// Create a provider identified only by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            get_api_key_link: None,
            label_for_get_api_key: None,
        }
    }
}

impl Default for ProviderInfo {
    fn default() -> Self {
        Self::named(DEFAULT_PROVIDER)
    }
}

impl fmt::Display for ProviderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The providers a session accepts when restoring a saved selection.
pub fn default_provider_list() -> Vec<ProviderInfo> {
    [
        "Anthropic",
        "OpenAI",
        "Google",
        "Groq",
        "Mistral",
        "Deepseek",
        "OpenRouter",
        "Together",
        "Ollama",
        "LMStudio",
    ]
    .into_iter()
    .map(ProviderInfo::named)
    .collect()
}
