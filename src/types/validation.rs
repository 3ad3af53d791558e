use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the validation endpoint judged an exported project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationStatus {
    /// The project passed.
    Success,
    /// The project failed; the report's `result` explains why.
    Error,
    /// Neither verdict; the report's `result` is a follow-up instruction.
    Inconclusive(String),
}

impl From<&str> for ValidationStatus {
    fn from(message: &str) -> Self {
        match message {
            "success" => ValidationStatus::Success,
            "error" => ValidationStatus::Error,
            other => ValidationStatus::Inconclusive(other.to_string()),
        }
    }
}

/// Body returned by the validation endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    /// `"success"`, `"error"`, or anything else.
    #[serde(default)]
    pub message: String,

    /// Error detail or follow-up instruction.
    #[serde(default)]
    pub result: Value,

    /// Model to use for a follow-up turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Provider name to use for a follow-up turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl ValidationReport {
    /// Classify the report.
    pub fn status(&self) -> ValidationStatus {
        ValidationStatus::from(self.message.as_str())
    }

    /// The `result` field as text; strings are used verbatim, other JSON is rendered.
    pub fn result_text(&self) -> String {
        match &self.result {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_classification() {
        let report: ValidationReport =
            serde_json::from_value(json!({"message": "success", "result": "ok"})).unwrap();
        assert_eq!(report.status(), ValidationStatus::Success);

        let report: ValidationReport =
            serde_json::from_value(json!({"message": "error", "result": "build failed"}))
                .unwrap();
        assert_eq!(report.status(), ValidationStatus::Error);
        assert_eq!(report.result_text(), "build failed");

        let report: ValidationReport = serde_json::from_value(json!({
            "message": "retry",
            "result": {"hint": "fix the header"},
            "model": "gpt-4.1",
            "provider": "OpenAI"
        }))
        .unwrap();
        assert_eq!(
            report.status(),
            ValidationStatus::Inconclusive("retry".to_string())
        );
        assert_eq!(report.result_text(), r#"{"hint":"fix the header"}"#);
        assert_eq!(report.provider.as_deref(), Some("OpenAI"));
    }
}
