use std::{path::PathBuf, sync::Arc};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod http;
pub mod hydraulics;
pub mod logging;
pub mod mcp;

use engine::HydraulicEngine;

#[derive(Clone)]
pub struct AppState {
    pub models_directory: Arc<PathBuf>,
    pub engine: Arc<dyn HydraulicEngine>,
}

impl AppState {
    pub fn new(models_directory: PathBuf, engine: Arc<dyn HydraulicEngine>) -> Self {
        Self {
            models_directory: Arc::new(models_directory),
            engine,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .route(http::handlers::MCP_ENDPOINT, post(http::handlers::mcp_endpoint))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
