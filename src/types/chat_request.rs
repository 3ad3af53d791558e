use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Message;

/// Credentials for the external storage connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SupabaseCredentials {
    /// Project URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_url: Option<String>,
    /// Anonymous key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anon_key: Option<String>,
}

/// External storage connection info forwarded to the completion backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SupabaseConnection {
    /// Whether a connection is established.
    #[serde(default)]
    pub is_connected: bool,
    /// Whether a project is selected.
    #[serde(default)]
    pub has_selected_project: bool,
    /// Connection credentials.
    #[serde(default)]
    pub credentials: SupabaseCredentials,
}

/// Body of a chat completion request.
///
/// Everything except `messages` is a feature-flag bag the session forwards
/// verbatim; the backend owns its interpretation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Full conversation history.
    pub messages: Vec<Message>,

    /// Per-provider API keys.
    #[serde(default)]
    pub api_keys: BTreeMap<String, String>,

    /// Workspace file snapshot, if the workspace provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Value>,

    /// Active prompt variant.
    pub prompt_id: String,

    /// Whether the backend may trim context.
    pub context_optimization: bool,

    /// External storage connection info.
    pub supabase: SupabaseConnection,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_wire_shape() {
        let request = ChatRequest {
            messages: vec![Message::user("1", "hi")],
            api_keys: BTreeMap::new(),
            files: None,
            prompt_id: "default".to_string(),
            context_optimization: true,
            supabase: SupabaseConnection::default(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "messages": [{"id": "1", "role": "user", "content": [{"type": "text", "text": "hi"}]}],
                "apiKeys": {},
                "promptId": "default",
                "contextOptimization": true,
                "supabase": {
                    "isConnected": false,
                    "hasSelectedProject": false,
                    "credentials": {}
                }
            })
        );
    }
}
