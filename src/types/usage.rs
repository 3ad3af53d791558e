use serde::{Deserialize, Serialize};

/// Token usage reported by the completion backend at the end of a turn.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Tokens consumed by the prompt.
    #[serde(default)]
    pub prompt_tokens: u64,

    /// Tokens produced by the completion.
    #[serde(default)]
    pub completion_tokens: u64,
}

impl Usage {
    /// Create a new `Usage`.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// Prompt plus completion tokens.
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

impl std::ops::Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens.saturating_add(rhs.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(rhs.completion_tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn usage_deserialization() {
        let usage: Usage =
            serde_json::from_value(json!({"promptTokens": 12, "completionTokens": 30})).unwrap();
        assert_eq!(usage, Usage::new(12, 30));
        assert_eq!(usage.total_tokens(), 42);
    }

    #[test]
    fn usage_missing_fields_default_to_zero() {
        let usage: Usage = serde_json::from_value(json!({"promptTokens": 7})).unwrap();
        assert_eq!(usage.completion_tokens, 0);
    }

    #[test]
    fn usage_add() {
        assert_eq!(Usage::new(1, 2) + Usage::new(3, 4), Usage::new(4, 6));
    }
}
