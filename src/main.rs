mod config;
mod conversations;
mod errors;
mod forms;
mod handlers;
mod llm;
mod prompts;
mod recovery;
mod retrieval;
mod routes;
mod state;
mod websocket;
#[cfg(test)]
mod testing;

use anyhow::Result;
use axum::http::HeaderValue;
use axum::Router;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use state::AppState;

fn load_config() -> Result<(Config, String)> {
    let config_paths: Vec<String> = vec![
        std::env::var("CONFIG_PATH").ok(),
        Some("conf.yaml".to_string()),
        Some("conf.json".to_string()),
        Some("config/conf.yaml".to_string()),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut failures = Vec::new();
    for path in &config_paths {
        match Config::load(path) {
            Ok(config) => return Ok((config, path.clone())),
            Err(e) => failures.push(e.to_string()),
        }
    }
    Err(anyhow::anyhow!("Could not load a config file. Tried: {:?}", failures))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, loaded_path) = load_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.system_config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!("Loaded configuration from: {}", loaded_path);

    // Fail fast before accepting requests
    config.validate()?;

    let app_state = AppState::new(config.clone())?;

    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.system_config.cors_origins))
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", config.system_config.host, config.system_config.port).parse()?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
