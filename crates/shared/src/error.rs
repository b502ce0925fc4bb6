use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayErrorStatus {
    pub status: Value,
}

/// Error body produced by the relay for any failed upstream call:
/// `{ "error": { "status": <code> }, "message": <upstream body> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayErrorBody {
    pub error: RelayErrorStatus,
    #[serde(default)]
    pub message: Value,
}

impl RelayErrorBody {
    pub fn new(status: u16, message: impl Into<Value>) -> Self {
        Self {
            error: RelayErrorStatus {
                status: Value::from(status),
            },
            message: message.into(),
        }
    }

    pub fn status_label(&self) -> String {
        value_text(&self.error.status)
    }

    pub fn message_text(&self) -> String {
        value_text(&self.message)
    }
}

/// Renders a JSON value as display text; strings are taken verbatim.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
