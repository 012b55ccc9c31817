use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};

use sitesmith_core::error::SitesmithError;
use sitesmith_core::types::ToolContext;
use sitesmith_store::ToolRegistry;

use crate::protocol::*;
use crate::registry::{Delivery, SessionRegistry};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Executes JSON-RPC requests against the tool catalog and routes the
/// responses to streaming sessions.
pub struct Dispatcher {
    tools: ToolRegistry,
    registry: Arc<SessionRegistry>,
}

impl Dispatcher {
    pub fn new(tools: ToolRegistry, registry: Arc<SessionRegistry>) -> Self {
        Self { tools, registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Tool catalog as `{name, description, inputSchema}` entries.
    pub fn catalog(&self) -> Vec<serde_json::Value> {
        self.tools
            .definitions()
            .into_iter()
            .map(|d| {
                json!({
                    "name": d.name,
                    "description": d.description,
                    "inputSchema": d.input_schema,
                })
            })
            .collect()
    }

    /// Execute `request` and enqueue the response on the addressed session,
    /// or on every live session when it is absent. The response is also
    /// returned to the caller.
    ///
    /// Execution and delivery run on a detached task, so the response still
    /// reaches the stream when the caller stops waiting.
    pub async fn dispatch(&self, request: RpcRequest, addressed: Option<&str>) -> RpcResponse {
        let id = request.id.clone();
        let tools = self.tools.clone();
        let catalog = self.catalog();
        let registry = self.registry.clone();
        let addressed = addressed.map(str::to_owned);

        let task = tokio::spawn(async move {
            let response = run_isolated(tools, catalog, request).await;
            deliver(&registry, addressed.as_deref(), &response);
            response
        });

        match task.await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Dispatch task aborted");
                RpcResponse::err(id, INTERNAL_ERROR, format!("Internal error: {e}"))
            }
        }
    }

    /// Execute a request on its own task without delivering it. Never fails;
    /// a panic inside a tool becomes an internal-error envelope.
    pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
        run_isolated(self.tools.clone(), self.catalog(), request).await
    }
}

fn deliver(registry: &SessionRegistry, addressed: Option<&str>, response: &RpcResponse) {
    match registry.deliver(addressed, response.to_value()) {
        Delivery::Addressed => {}
        Delivery::Broadcast(n) => {
            if addressed.is_some() {
                warn!(connection_id = ?addressed, sessions = n, "Addressed session not live, broadcasting");
            }
        }
    }
}

async fn run_isolated(
    tools: ToolRegistry,
    catalog: Vec<serde_json::Value>,
    request: RpcRequest,
) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.clone();

    match tokio::spawn(execute(tools, catalog, request)).await {
        Ok(response) => response,
        Err(e) => {
            let detail = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                e.to_string()
            };
            error!(method = %method, error = %detail, "Request handler aborted");
            RpcResponse::err(id, INTERNAL_ERROR, format!("Internal error: {detail}"))
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

async fn execute(tools: ToolRegistry, catalog: Vec<serde_json::Value>, request: RpcRequest) -> RpcResponse {
    let RpcRequest {
        id, method, params, ..
    } = request;

    match method.as_str() {
        "initialize" => RpcResponse::ok(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "sitesmith", "version": env!("CARGO_PKG_VERSION") },
            }),
        ),
        "ping" | "notifications/initialized" => RpcResponse::ok(id, json!({})),
        "tools/list" => RpcResponse::ok(id, json!({ "tools": catalog })),
        "tools/call" => call_tool(&tools, id, params).await,
        other => RpcResponse::err(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
    }
}

async fn call_tool(
    tools: &ToolRegistry,
    id: Option<RequestId>,
    params: Option<serde_json::Value>,
) -> RpcResponse {
    let params = params.unwrap_or_else(|| json!({}));
    let Some(name) = params.get("name").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) else {
        return RpcResponse::err(id, INVALID_PARAMS, "Tool name is required");
    };
    let arguments = match params.get("arguments") {
        None | Some(serde_json::Value::Null) => json!({}),
        Some(v) if v.is_object() => v.clone(),
        Some(_) => return RpcResponse::err(id, INVALID_PARAMS, "Tool arguments must be an object"),
    };

    info!(tool = %name, "Calling tool");
    match tools.execute(name, arguments, ToolContext::default()).await {
        Ok(result) => RpcResponse::ok(
            id,
            json!({
                "content": [{ "type": "text", "text": result.content }],
                "isError": result.is_error,
            }),
        ),
        Err(SitesmithError::ToolValidation(msg)) => {
            RpcResponse::err(id, INVALID_PARAMS, format!("Invalid params: {msg}"))
        }
        Err(e) => {
            error!(tool = %name, error = %e, "Tool call failed");
            RpcResponse::err(id, INTERNAL_ERROR, format!("Tool execution error: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use sitesmith_core::error::Result;
    use sitesmith_core::traits::Tool;
    use sitesmith_core::config::GatewayConfig;
    use sitesmith_core::types::ToolResult;
    use sitesmith_store::{ManageSiteFilesTool, SiteStore};
    use std::time::Duration;

    struct Panicky;

    impl Tool for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }
        fn description(&self) -> &str {
            "always panics"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn execute(
            &self,
            _input: serde_json::Value,
            _ctx: ToolContext,
        ) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async move { panic!("boom") })
        }
    }

    struct Slow;

    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "finishes after 200ms"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn execute(
            &self,
            _input: serde_json::Value,
            _ctx: ToolContext,
        ) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(ToolResult::success("finished"))
            })
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut tools = ToolRegistry::new();
        tools.register(Panicky);
        tools.register(Slow);
        Dispatcher::new(tools, SessionRegistry::new(Duration::from_secs(30)))
    }

    fn files_dispatcher(dir: &std::path::Path) -> Dispatcher {
        let mut tools = ToolRegistry::new();
        tools.register(ManageSiteFilesTool::new(
            Arc::new(SiteStore::new(dir)),
            GatewayConfig::default(),
            200,
        ));
        Dispatcher::new(tools, SessionRegistry::new(Duration::from_secs(30)))
    }

    fn files_call(arguments: serde_json::Value) -> RpcRequest {
        request(
            "tools/call",
            Some(json!({"name": "manage_site_files", "arguments": arguments})),
        )
    }

    fn request(method: &str, params: Option<serde_json::Value>) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(RequestId::Number(1)),
            method: method.into(),
            params,
        }
    }

    #[tokio::test]
    async fn test_initialize() {
        let resp = dispatcher().handle(request("initialize", None)).await;
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "sitesmith");
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let resp = dispatcher().handle(request("resources/list", None)).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, METHOD_NOT_FOUND);
        assert_eq!(err.message, "Method not found: resources/list");
    }

    #[tokio::test]
    async fn test_tools_call_without_name() {
        let d = dispatcher();
        let resp = d.handle(request("tools/call", None)).await;
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);

        let resp = d
            .handle(request("tools/call", Some(json!({"arguments": {}}))))
            .await;
        assert_eq!(resp.error.unwrap().message, "Tool name is required");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_execution_error() {
        let resp = dispatcher()
            .handle(request("tools/call", Some(json!({"name": "nope"}))))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, INTERNAL_ERROR);
        assert!(err.message.starts_with("Tool execution error"));
    }

    #[tokio::test]
    async fn test_panic_becomes_error_envelope() {
        let resp = dispatcher()
            .handle(request("tools/call", Some(json!({"name": "panicky"}))))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, INTERNAL_ERROR);
        assert!(err.message.contains("boom"));
        assert_eq!(resp.id, Some(RequestId::Number(1)));
    }

    #[tokio::test]
    async fn test_error_responses_are_delivered_too() {
        let d = dispatcher();
        let mut session = d.registry().open_session();
        session.next_frame().await;

        let resp = d.dispatch(request("bogus", None), Some(session.id())).await;
        assert!(resp.is_error());
        let frame = session.next_frame().await.unwrap();
        assert_eq!(frame, crate::registry::Frame::Message(resp.to_value()));
    }

    #[tokio::test]
    async fn test_manage_site_files_unknown_operation_is_invalid_params() {
        let dir = tempfile::tempdir().unwrap();
        let resp = files_dispatcher(dir.path())
            .handle(files_call(
                json!({"operation": "rename_file", "site_id": "s1", "file_path": "index.html"}),
            ))
            .await;
        assert!(resp.result.is_none());
        let err = resp.error.unwrap();
        assert_eq!(err.code, INVALID_PARAMS);
        assert!(err.message.contains("Unknown operation: rename_file"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_manage_site_files_missing_arguments_is_invalid_params() {
        let dir = tempfile::tempdir().unwrap();
        let resp = files_dispatcher(dir.path())
            .handle(files_call(json!({"operation": "read_file"})))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, INVALID_PARAMS);
        assert!(err.message.contains("Missing required arguments"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_manage_site_files_long_old_string_is_invalid_params() {
        let dir = tempfile::tempdir().unwrap();
        let resp = files_dispatcher(dir.path())
            .handle(files_call(json!({
                "operation": "edit_file",
                "site_id": "s1",
                "file_path": "index.html",
                "old_string": "x".repeat(300),
                "new_string": "y",
            })))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, INVALID_PARAMS);
        assert!(err.message.contains("old_string is too long (300 characters)"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_response_is_delivered_after_caller_gives_up() {
        let d = dispatcher();
        let mut session = d.registry().open_session();
        session.next_frame().await;

        let call = request("tools/call", Some(json!({"name": "slow"})));
        let waited =
            tokio::time::timeout(Duration::from_millis(20), d.dispatch(call, Some(session.id()))).await;
        assert!(waited.is_err());

        let frame = tokio::time::timeout(Duration::from_secs(5), session.next_frame())
            .await
            .expect("response delivered")
            .unwrap();
        let crate::registry::Frame::Message(value) = frame else {
            panic!("expected a message frame, got {frame:?}");
        };
        assert_eq!(value["result"]["content"][0]["text"], "finished");
        assert_eq!(value["id"], 1);
    }
}
