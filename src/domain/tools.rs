//! Interactive tools exposed via Model Context Protocol
//!
//! Provides `run_epanet_simulation`, which hands a model file to the
//! configured `HydraulicEngine` on a blocking worker thread.

use chrono::{SecondsFormat, Utc};
use rust_mcp_sdk::{
    macros,
    schema::{CallToolRequestParams, CallToolResult, ContentBlock, TextContent, Tool},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::models::{run_simulation, HandlerOutcome, SimulationSummary};
use crate::mcp::rpc::{
    app_error_to_json_rpc, json_rpc_error, json_rpc_error_with_data, json_rpc_result,
    INVALID_PARAMS, METHOD_NOT_FOUND,
};
use crate::{errors::AppError, AppState};

#[macros::mcp_tool(
    name = "run_epanet_simulation",
    description = "Run a hydraulic simulation of an .inp model from the models folder and summarize it"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct RunEpanetSimulationTool {
    /// Name of the .inp file inside the models folder.
    pub file_name: String,
}

pub fn build_tools_list() -> Vec<Tool> {
    vec![RunEpanetSimulationTool::tool()]
}

pub async fn handle_tools_call(
    state: &AppState,
    id: Option<Value>,
    params: Option<Value>,
) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, INVALID_PARAMS, "Invalid params");
    };

    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, INVALID_PARAMS, "Invalid params"),
    };

    match tool_call.name.as_str() {
        "run_epanet_simulation" => {
            let arguments: RunEpanetSimulationTool =
                match serde_json::from_value(json!(tool_call.arguments.unwrap_or_default())) {
                    Ok(value) => value,
                    Err(_) => return json_rpc_error(id, INVALID_PARAMS, "Invalid params"),
                };

            match simulate_in_background(state, arguments.file_name).await {
                Ok((outcome, summary)) => json_rpc_result(
                    id,
                    serde_json::to_value(simulation_tool_result(outcome, summary.as_ref()))
                        .expect("run_epanet_simulation tool result serialization"),
                ),
                Err(err) => app_error_to_json_rpc(id, err),
            }
        }
        _ => json_rpc_error_with_data(
            id,
            METHOD_NOT_FOUND,
            "Method not found",
            Some(json!({
                "code": "tool_not_found",
                "message": "unknown tool name",
                "details": {
                    "name": tool_call.name,
                },
            })),
        ),
    }
}

async fn simulate_in_background(
    state: &AppState,
    file_name: String,
) -> Result<(HandlerOutcome, Option<SimulationSummary>), AppError> {
    let engine = state.engine.clone();
    let models_directory = state.models_directory.clone();

    tokio::task::spawn_blocking(move || {
        run_simulation(engine.as_ref(), &models_directory, &file_name)
    })
    .await
    .map_err(|err| AppError::internal(format!("simulation worker failed: {err}")))
}

pub fn simulation_tool_result(
    outcome: HandlerOutcome,
    summary: Option<&SimulationSummary>,
) -> CallToolResult {
    let is_error = outcome.is_failure();
    let structured_content = summary.map(|summary| {
        Map::from_iter([
            ("file_name".to_string(), json!(summary.file_name)),
            (
                "simulation_time_seconds".to_string(),
                json!(summary.elapsed.as_secs_f64()),
            ),
            ("nodes".to_string(), json!(summary.junctions)),
            ("pipes".to_string(), json!(summary.links)),
            (
                "generated_at_utc".to_string(),
                json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            ),
        ])
    });

    CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(
            outcome.message,
            None,
            None,
        ))],
        is_error: is_error.then_some(true),
        meta: None,
        structured_content,
    }
}
