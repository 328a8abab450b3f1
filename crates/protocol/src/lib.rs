use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const CAPABILITIES_SCHEMA_VERSION: u32 = 1;

/// Suggested follow-up call attached to an error.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct NextAction {
    pub action: String,
    pub params: serde_json::Value,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_actions: Vec<NextAction>,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            hint: None,
            next_actions: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_next_action(mut self, action: NextAction) -> Self {
        self.next_actions.push(action);
        self
    }

    /// `{"error": {...}}`, the shape every failed action returns.
    pub fn into_response(self) -> serde_json::Value {
        serde_json::json!({ "error": self })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct CapabilitiesServer {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesStorage {
    pub dir: String,
    pub record_schema_version: u32,
    pub write_attempts: u32,
    pub write_backoff_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub schema_version: u32,
    pub server: CapabilitiesServer,
    pub actions: Vec<String>,
    /// Actions rejected with `mutation_disabled` while mutation is off.
    pub mutating_actions: Vec<String>,
    pub mutation_enabled: bool,
    pub storage: CapabilitiesStorage,
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_envelope_omits_empty_fields() {
        let value = ErrorEnvelope::new("not_found", "missing").into_response();
        assert_eq!(
            value,
            json!({ "error": { "code": "not_found", "message": "missing" } })
        );
    }

    #[test]
    fn error_envelope_round_trips_with_extras() {
        let envelope = ErrorEnvelope::new("validation", "bad owner")
            .with_details(json!({ "id": "x" }))
            .with_hint("set owner")
            .with_next_action(NextAction {
                action: "get".into(),
                params: json!({ "id": "x" }),
                reason: "inspect current state".into(),
            });
        let text = serialize_json(&envelope).expect("serialize");
        let back: ErrorEnvelope = serde_json::from_str(&text).expect("parse");
        assert_eq!(back, envelope);
    }
}
