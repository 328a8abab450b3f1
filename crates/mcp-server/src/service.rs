//! MCP surface: one `instructions` tool forwarding `{action, ...params}` to the [`Dispatcher`].

use crate::dispatch::{DispatchError, Dispatcher};
use crate::runtime_env::RuntimeConfig;
use instructions_protocol::serialize_json;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct InstructionsRequest {
    /// Action name, e.g. `add`, `get`, `list`, `update`, `batch`, `groom`, `governanceHash`.
    #[schemars(
        description = "Action to run: add, get, list, remove, update, diff, export, search, query, categories, import, batch, groom, governanceHash, governanceUpdate, reload, invalidate, dir, health, capabilities."
    )]
    pub action: String,

    /// Action parameters, inline next to `action` or nested under `params`.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

#[derive(Clone)]
pub struct InstructionsService {
    dispatcher: Arc<Mutex<Dispatcher>>,
    tool_router: ToolRouter<Self>,
}

impl InstructionsService {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::from_dispatcher(Dispatcher::new(config))
    }

    pub fn from_dispatcher(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(Mutex::new(dispatcher)),
            tool_router: Self::tool_router(),
        }
    }

    /// Runs a request on the blocking pool; the mutex keeps requests strictly sequential.
    pub async fn run(&self, request: Value) -> Value {
        let dispatcher = Arc::clone(&self.dispatcher);
        let joined = tokio::task::spawn_blocking(move || {
            // After a panicked request the cached snapshot is dropped and reloaded from disk.
            let mut guard = dispatcher.lock().unwrap_or_else(|poisoned| {
                log::warn!("Recovering dispatcher after a panicked request");
                dispatcher.clear_poison();
                let mut guard = poisoned.into_inner();
                guard.invalidate();
                guard
            });
            guard.dispatch(request)
        })
        .await;
        joined.unwrap_or_else(|err| {
            log::error!("Dispatch task failed: {err}");
            DispatchError::new("internal", format!("Dispatch task failed: {err}")).into_response()
        })
    }
}

#[tool_handler]
impl ServerHandler for InstructionsService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Instruction catalog. Call the 'instructions' tool with {\"action\": ...}. Start with 'capabilities' or 'list'; use 'get' before 'update' and pass expectedSourceHash to avoid overwriting concurrent edits.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl InstructionsService {
    #[tool(
        description = "Read, search, audit and (when MCP_ENABLE_MUTATION is set) modify the instruction catalog. Pass {\"action\": \"<name>\", ...params}; failures return {\"error\": {code, message}}."
    )]
    pub async fn instructions(
        &self,
        Parameters(request): Parameters<InstructionsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut payload = request.params;
        payload.insert("action".to_string(), Value::String(request.action));
        let response = self.run(Value::Object(payload)).await;
        Ok(render(response))
    }
}

fn render(response: Value) -> CallToolResult {
    let text = serialize_json(&response).unwrap_or_else(|err| {
        log::warn!("Failed to render tool response: {err}");
        String::new()
    });
    let mut result = if response.get("error").is_some() {
        CallToolResult::error(vec![Content::text(text)])
    } else {
        CallToolResult::success(vec![Content::text(text)])
    };
    result.structured_content = Some(response);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service(dir: &std::path::Path, mutation_enabled: bool) -> InstructionsService {
        InstructionsService::new(RuntimeConfig {
            instructions_dir: dir.to_path_buf(),
            mutation_enabled,
            ..RuntimeConfig::default()
        })
    }

    #[tokio::test]
    async fn tool_call_forwards_action_and_params() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let svc = service(tmp.path(), true);

        let added = svc
            .run(json!({ "action": "add", "entry": { "id": "demo1", "body": "Hello" } }))
            .await;
        assert_eq!(added["created"], json!(true));

        let request: InstructionsRequest =
            serde_json::from_value(json!({ "action": "get", "id": "demo1" })).expect("request");
        let result = svc
            .instructions(Parameters(request))
            .await
            .expect("tool call");
        assert_ne!(result.is_error, Some(true));
        let structured = result.structured_content.expect("structured");
        assert_eq!(structured["item"]["body"], json!("Hello"));
    }

    #[tokio::test]
    async fn service_recovers_after_a_panicked_request() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let svc = service(tmp.path(), true);
        let dispatcher = Arc::clone(&svc.dispatcher);
        let _ = std::thread::spawn(move || {
            let _guard = dispatcher.lock().expect("lock");
            panic!("request blew up");
        })
        .join();
        assert!(svc.dispatcher.is_poisoned());

        let added = svc
            .run(json!({ "action": "add", "entry": { "id": "after", "body": "Still works" } }))
            .await;
        assert_eq!(added["created"], json!(true));
        let got = svc.run(json!({ "action": "get", "id": "after" })).await;
        assert_eq!(got["item"]["body"], json!("Still works"));
        assert!(!svc.dispatcher.is_poisoned());
    }

    #[tokio::test]
    async fn errors_are_flagged_on_the_tool_result() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let svc = service(tmp.path(), false);
        let request: InstructionsRequest =
            serde_json::from_value(json!({ "action": "remove", "id": "demo1" })).expect("request");
        let result = svc
            .instructions(Parameters(request))
            .await
            .expect("tool call");
        assert_eq!(result.is_error, Some(true));
        let structured = result.structured_content.expect("structured");
        assert_eq!(structured["error"]["code"], json!("mutation_disabled"));
    }
}
