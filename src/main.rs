use std::sync::Arc;

use epanet_mcp::{
    build_app,
    config::{Config, Transport},
    engine::NativeEngine,
    logging,
    mcp::stdio::serve_stdio,
    AppState,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    if !config.models_directory.is_dir() {
        warn!(
            models_directory = %config.models_directory.display(),
            "models directory does not exist yet"
        );
    }

    let state = AppState::new(config.models_directory.clone(), Arc::new(NativeEngine::new()));

    match config.transport {
        Transport::Stdio => serve_stdio(state).await?,
        Transport::Http => {
            let bind_socket = config.bind_socket()?;
            let app = build_app(state);
            let listener = tokio::net::TcpListener::bind(bind_socket).await?;

            info!(
                bind_addr = %config.bind_addr,
                bind_port = config.bind_port,
                models_directory = %config.models_directory.display(),
                "server starting"
            );

            axum::serve(listener, app.into_make_service()).await?;
        }
    }

    Ok(())
}
