mod configuration;
mod error;
mod routes;
mod state;

use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vindealer::nhtsa::NhtsaClient;
use vindealer::providers::factory::ModelGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine, the process environment still applies
    let env_file = dotenv::dotenv().ok();

    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Some(path) = env_file {
        info!("loaded environment from {:?}", path);
    }

    // Load configuration
    let settings = configuration::Settings::new()?;

    let gateway = ModelGateway::new(settings.gateway_configs())?;
    let nhtsa = NhtsaClient::new(settings.nhtsa.to_config())?;

    // Create app state
    let state = state::AppState {
        gateway: Arc::new(gateway),
        nhtsa: Arc::new(nhtsa),
        step_timeout: settings.agent.step_timeout(),
    };

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Run server
    let listener = tokio::net::TcpListener::bind(settings.server.socket_addr()?).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
