//! JSON-RPC dispatch for the MCP surface
//!
//! Decodes messages, negotiates the protocol version on `initialize`, and
//! routes tool and resource calls to the domain handlers. Notifications are
//! accepted and dropped. Shared by the HTTP and stdio transports.

use rust_mcp_sdk::schema::{
    CallToolRequest, Implementation, InitializeRequest, InitializeResult, JsonrpcMessage,
    JsonrpcRequest, ListResourcesRequest, ListResourcesResult, ListToolsRequest, ListToolsResult,
    PingRequest, ProtocolVersion, ReadResourceRequest, ServerCapabilities,
    ServerCapabilitiesResources, ServerCapabilitiesTools,
};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::domain::{
    resources::{build_resources_list, handle_resources_read},
    tools::{build_tools_list, handle_tools_call},
};
use crate::mcp::rpc::{
    app_error_to_json_rpc, is_json_rpc_error, json_rpc_error, json_rpc_result,
    request_id_to_value, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
};
use crate::{errors::AppError, AppState};

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

/// Handles a single message or a batch. `None` means nothing to send back:
/// the payload held only notifications.
pub async fn handle_json_rpc_payload(state: &AppState, payload: Value) -> Option<Value> {
    let Value::Array(batch) = payload else {
        return handle_json_rpc_value(state, payload).await;
    };

    if batch.is_empty() {
        return Some(Value::Array(vec![json_rpc_error(
            None,
            INVALID_REQUEST,
            "Invalid Request",
        )]));
    }

    let mut responses = Vec::new();
    for item in batch {
        if let Some(response) = handle_json_rpc_value(state, item).await {
            responses.push(response);
        }
    }

    (!responses.is_empty()).then_some(Value::Array(responses))
}

/// MCP methods this server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Initialize,
    Ping,
    ListTools,
    CallTool,
    ListResources,
    ReadResource,
}

impl Route {
    fn from_method(method: &str) -> Option<Self> {
        let route = match method {
            "initialize" => Self::Initialize,
            "ping" => Self::Ping,
            "tools/list" => Self::ListTools,
            "tools/call" => Self::CallTool,
            "resources/list" => Self::ListResources,
            "resources/read" => Self::ReadResource,
            _ => return None,
        };
        Some(route)
    }

    /// Checks the full request against the typed schema for this method.
    fn accepts(self, request: Value) -> bool {
        match self {
            Self::Initialize => serde_json::from_value::<InitializeRequest>(request).is_ok(),
            Self::Ping => serde_json::from_value::<PingRequest>(request).is_ok(),
            Self::ListTools => serde_json::from_value::<ListToolsRequest>(request).is_ok(),
            Self::CallTool => serde_json::from_value::<CallToolRequest>(request).is_ok(),
            Self::ListResources => serde_json::from_value::<ListResourcesRequest>(request).is_ok(),
            Self::ReadResource => serde_json::from_value::<ReadResourceRequest>(request).is_ok(),
        }
    }
}

pub async fn handle_json_rpc_value(state: &AppState, payload: Value) -> Option<Value> {
    if !payload.is_object() {
        return Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"));
    }

    let raw_id = payload.get("id").cloned();
    let message: JsonrpcMessage = match serde_json::from_value(payload) {
        Ok(message) => message,
        Err(_) => return Some(json_rpc_error(raw_id, INVALID_REQUEST, "Invalid Request")),
    };

    match message {
        JsonrpcMessage::Request(request) => Some(handle_request(state, request).await),
        JsonrpcMessage::Notification(notification) => {
            // no notification changes server state; requests sent without an id
            // are dropped rather than executed
            debug!(method = %notification.method, "notification ignored");
            None
        }
        JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => {
            Some(json_rpc_error(raw_id, INVALID_REQUEST, "Invalid Request"))
        }
    }
}

async fn handle_request(state: &AppState, request: JsonrpcRequest) -> Value {
    let id = request_id_to_value(request.id.clone());
    if request.method.trim().is_empty() {
        return json_rpc_error(Some(id), INVALID_REQUEST, "Invalid Request");
    }

    let Some(route) = Route::from_method(&request.method) else {
        info!(method = %request.method, outcome = "failure", "mcp method not found");
        return json_rpc_error(Some(id), METHOD_NOT_FOUND, "Method not found");
    };

    let typed = serde_json::to_value(&request).expect("jsonrpc request serialization");
    if !route.accepts(typed) {
        return json_rpc_error(Some(id), INVALID_PARAMS, "Invalid params");
    }

    let params = request.params.map(Value::Object);
    let target = audit_target(route, params.as_ref());
    let response = dispatch(state, route, Some(id), params).await;

    info!(
        method = %request.method,
        target = target.as_deref().unwrap_or("-"),
        outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
        "mcp request handled"
    );

    response
}

async fn dispatch(state: &AppState, route: Route, id: Option<Value>, params: Option<Value>) -> Value {
    match route {
        Route::Initialize => match negotiate_protocol_version(params.as_ref()) {
            Ok(version) => json_rpc_result(id, initialize_result(version)),
            Err(err) => app_error_to_json_rpc(id, err),
        },
        Route::Ping => json_rpc_result(id, json!({})),
        Route::ListTools => json_rpc_result(
            id,
            serde_json::to_value(ListToolsResult {
                meta: None,
                next_cursor: None,
                tools: build_tools_list(),
            })
            .expect("tools list result serialization"),
        ),
        Route::CallTool => handle_tools_call(state, id, params).await,
        Route::ListResources => json_rpc_result(
            id,
            serde_json::to_value(ListResourcesResult {
                meta: None,
                next_cursor: None,
                resources: build_resources_list(),
            })
            .expect("resources list result serialization"),
        ),
        Route::ReadResource => handle_resources_read(state, id, params).await,
    }
}

fn initialize_result(version: ProtocolVersion) -> Value {
    let result = InitializeResult {
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("EPANET simulation server".to_string()),
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            resources: Some(ServerCapabilitiesResources {
                subscribe: Some(false),
                list_changed: Some(false),
            }),
            prompts: None,
            ..Default::default()
        },
        protocol_version: version.into(),
        instructions: None,
        meta: None,
    };
    serde_json::to_value(result).expect("initialize result serialization")
}

/// What a request acts on, for the request log: the simulated file or the
/// resource URI. Other arguments are never logged.
fn audit_target(route: Route, params: Option<&Value>) -> Option<String> {
    let params = params?;
    match route {
        Route::CallTool => {
            let name = params.get("name").and_then(Value::as_str)?;
            let file = params
                .pointer("/arguments/file_name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(format!("{name}({file})"))
        }
        Route::ReadResource => params.get("uri").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<ProtocolVersion, AppError> {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            AppError::bad_request(
                "invalid_protocol_version",
                "initialize params.protocolVersion is required",
            )
        })?;

    if offered_version != SUPPORTED_PROTOCOL_VERSION {
        return Err(AppError::bad_request(
            "unsupported_protocol_version",
            "unsupported initialize protocolVersion",
        ));
    }

    Ok(ProtocolVersion::V2024_11_05)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::{
        audit_target, handle_json_rpc_payload, handle_json_rpc_value, negotiate_protocol_version,
        Route, SUPPORTED_PROTOCOL_VERSION,
    };
    use crate::engine::{HydraulicEngine, NativeEngine, NetworkSession, OpenOptions};
    use crate::hydraulics::HydraulicsError;
    use crate::AppState;

    fn state() -> AppState {
        AppState::new("./models".into(), Arc::new(NativeEngine::new()))
    }

    #[derive(Default)]
    struct RecordingEngine {
        opened: AtomicUsize,
    }

    impl HydraulicEngine for RecordingEngine {
        fn open(
            &self,
            path: &Path,
            _options: OpenOptions,
        ) -> Result<Box<dyn NetworkSession>, HydraulicsError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Err(HydraulicsError::network(format!("{} not simulated", path.display())))
        }
    }

    #[test]
    fn audit_target_names_tool_and_file_only() {
        let params = json!({
            "name": "run_epanet_simulation",
            "arguments": {"file_name": "net1.inp", "extra": "ignored"}
        });

        assert_eq!(
            audit_target(Route::CallTool, Some(&params)).as_deref(),
            Some("run_epanet_simulation(net1.inp)")
        );
        assert_eq!(
            audit_target(Route::ReadResource, Some(&json!({"uri": "files://models/inp_files"})))
                .as_deref(),
            Some("files://models/inp_files")
        );
        assert_eq!(audit_target(Route::Ping, Some(&json!({}))), None);
        assert_eq!(audit_target(Route::CallTool, None), None);
    }

    #[test]
    fn routes_known_methods_only() {
        assert_eq!(Route::from_method("tools/call"), Some(Route::CallTool));
        assert_eq!(Route::from_method("resources/read"), Some(Route::ReadResource));
        assert_eq!(Route::from_method("prompts/list"), None);
        assert_eq!(Route::from_method("notifications/initialized"), None);
    }

    #[tokio::test]
    async fn tool_call_without_id_runs_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("net1.inp"), "").expect("write file");
        let engine = Arc::new(RecordingEngine::default());
        let state = AppState::new(dir.path().to_path_buf(), engine.clone());

        let response = handle_json_rpc_value(
            &state,
            json!({
                "jsonrpc": "2.0",
                "method": "tools/call",
                "params": {"name": "run_epanet_simulation", "arguments": {"file_name": "net1.inp"}}
            }),
        )
        .await;

        assert!(response.is_none());
        assert_eq!(engine.opened.load(Ordering::SeqCst), 0);

        let response = handle_json_rpc_value(
            &state,
            json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": {"name": "run_epanet_simulation", "arguments": {"file_name": "net1.inp"}}
            }),
        )
        .await
        .expect("tool response");

        assert_eq!(response["id"], 4);
        assert_eq!(engine.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn negotiate_protocol_version_accepts_supported_version() {
        let params = json!({
            "protocolVersion": SUPPORTED_PROTOCOL_VERSION
        });

        let version = negotiate_protocol_version(Some(&params)).expect("supported version");
        assert_eq!(version, rust_mcp_sdk::schema::ProtocolVersion::V2024_11_05);
    }

    #[test]
    fn negotiate_protocol_version_rejects_unsupported_version() {
        let params = json!({
            "protocolVersion": "2026-01-01"
        });

        let error =
            negotiate_protocol_version(Some(&params)).expect_err("unsupported version must fail");
        assert!(error.to_string().contains("bad request"));
    }

    #[tokio::test]
    async fn notification_yields_no_response() {
        let response = handle_json_rpc_value(
            &state(),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await;

        assert!(response.is_none());
    }

    #[tokio::test]
    async fn non_object_payload_is_invalid_request() {
        let response = handle_json_rpc_value(&state(), json!("ping"))
            .await
            .expect("error response");

        assert_eq!(response["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn ping_returns_empty_result() {
        let response = handle_json_rpc_value(
            &state(),
            json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}),
        )
        .await
        .expect("ping response");

        assert_eq!(response["id"], 9);
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn batch_of_notifications_yields_nothing() {
        let response = handle_json_rpc_payload(
            &state(),
            json!([
                {"jsonrpc": "2.0", "method": "notifications/initialized"},
                {"jsonrpc": "2.0", "method": "notifications/cancelled"}
            ]),
        )
        .await;

        assert!(response.is_none());
    }

    #[tokio::test]
    async fn batch_answers_only_requests() {
        let response = handle_json_rpc_payload(
            &state(),
            json!([
                {"jsonrpc": "2.0", "id": 1, "method": "ping"},
                {"jsonrpc": "2.0", "method": "notifications/initialized"},
                {"jsonrpc": "2.0", "id": 2, "method": "nope"}
            ]),
        )
        .await
        .expect("batch response");

        let responses = response.as_array().expect("array");
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn empty_batch_is_invalid_request() {
        let response = handle_json_rpc_payload(&state(), json!([]))
            .await
            .expect("error response");

        assert_eq!(response[0]["error"]["code"], -32600);
    }
}
