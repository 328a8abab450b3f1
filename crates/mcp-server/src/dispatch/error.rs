use instructions_catalog::CatalogError;
use instructions_protocol::{ErrorEnvelope, NextAction};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct DispatchError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub hint: Option<String>,
    pub next_actions: Vec<NextAction>,
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

impl DispatchError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            hint: None,
            next_actions: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn unknown_action(name: &str) -> Self {
        Self::new("unknown_action", format!("Unknown action '{name}'"))
            .with_hint("Call the 'capabilities' action for the list of supported actions.")
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new("invalid_request", message)
    }

    pub fn mutation_disabled(action: &str) -> Self {
        Self::new(
            "mutation_disabled",
            format!("Action '{action}' writes to the catalog and mutation is disabled"),
        )
        .with_hint("Set MCP_ENABLE_MUTATION=1 to enable write-capable actions.")
    }

    pub fn with_next_action(mut self, action: NextAction) -> Self {
        self.next_actions.push(action);
        self
    }

    pub fn not_found(id: &str) -> Self {
        Self::new("not_found", format!("Instruction '{id}' not found"))
            .with_details(json!({ "id": id }))
            .with_next_action(NextAction {
                action: "add".to_string(),
                params: json!({ "entry": { "id": id } }),
                reason: "Create the instruction first.".to_string(),
            })
    }

    pub fn into_envelope(self) -> ErrorEnvelope {
        let mut envelope = ErrorEnvelope::new(self.code, self.message);
        if let Some(details) = self.details {
            envelope = envelope.with_details(details);
        }
        if let Some(hint) = self.hint {
            envelope = envelope.with_hint(hint);
        }
        self.next_actions
            .into_iter()
            .fold(envelope, ErrorEnvelope::with_next_action)
    }

    pub fn into_response(self) -> Value {
        self.into_envelope().into_response()
    }
}

impl From<CatalogError> for DispatchError {
    fn from(err: CatalogError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            CatalogError::AtomicWrite { path, attempts, .. } => Self::new(code, message)
                .with_details(json!({ "path": path.display().to_string(), "attempts": attempts }))
                .with_hint("The previous file content is intact; retry the operation."),
            _ => Self::new(code, message),
        }
    }
}
