//! Model Context Protocol resource providers
//!
//! Exposes the model directory listing as a text resource.

use rust_mcp_sdk::schema::{
    ReadResourceContent, ReadResourceRequestParams, ReadResourceResult, Resource,
    TextResourceContents,
};
use serde_json::{json, Value};

use crate::domain::models::list_model_files;
use crate::mcp::rpc::{
    json_rpc_error, json_rpc_error_with_data, json_rpc_result, INVALID_PARAMS, METHOD_NOT_FOUND,
};
use crate::AppState;

pub const INP_FILES_RESOURCE_URI: &str = "files://models/inp_files";

pub fn build_resources_list() -> Vec<Resource> {
    vec![Resource {
        annotations: None,
        description: Some("Lists all .inp files available in the models folder".to_string()),
        icons: vec![],
        meta: None,
        mime_type: Some("text/plain".to_string()),
        name: "inp_files".to_string(),
        size: None,
        title: Some("EPANET model files".to_string()),
        uri: INP_FILES_RESOURCE_URI.to_string(),
    }]
}

pub async fn handle_resources_read(
    state: &AppState,
    id: Option<Value>,
    params: Option<Value>,
) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, INVALID_PARAMS, "Invalid params");
    };

    let resource_read: ReadResourceRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, INVALID_PARAMS, "Invalid params"),
    };

    match resource_read.uri.as_str() {
        INP_FILES_RESOURCE_URI => {
            // listing failures are reported in the text body, not as rpc errors
            let outcome = list_model_files(&state.models_directory).await;
            let result = serde_json::to_value(ReadResourceResult {
                contents: vec![ReadResourceContent::from(TextResourceContents {
                    meta: None,
                    mime_type: Some("text/plain".to_string()),
                    text: outcome.message,
                    uri: INP_FILES_RESOURCE_URI.to_string(),
                })],
                meta: None,
            })
            .expect("read inp files result serialization");

            json_rpc_result(id, result)
        }
        _ => json_rpc_error_with_data(
            id,
            METHOD_NOT_FOUND,
            "Method not found",
            Some(json!({
                "code": "resource_not_found",
                "message": "unknown resource uri",
                "details": {
                    "uri": resource_read.uri,
                },
            })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{build_resources_list, INP_FILES_RESOURCE_URI};

    #[test]
    fn lists_single_text_resource() {
        let resources = build_resources_list();

        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].uri, INP_FILES_RESOURCE_URI);
        assert_eq!(resources[0].mime_type.as_deref(), Some("text/plain"));
    }
}
