//! vigil-sa - Event Situational Awareness service
//!
//! Fuses per-zone video frame analysis and field report analysis into a
//! single published situation snapshot, queryable over REST.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use vigil_common::config::{default_config_path, load_toml_config, VigilConfig};
use vigil_sa::model::GeminiClient;
use vigil_sa::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting vigil-sa (Situational Awareness) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve configuration: environment overrides TOML overrides defaults
    let config_path = default_config_path();
    let toml_config = load_toml_config(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to load config from {}: {}", config_path.display(), e))?;
    let config = VigilConfig::resolve(&toml_config);

    info!("Frames directory: {}", config.frames_dir.display());
    info!("Reports directory: {}", config.reports_dir.display());
    info!("Monitored zones: {}", config.zones.join(", "));

    let bind_addr = config.bind_addr.clone();

    let state = match config.gemini_api_key.clone() {
        Some(api_key) => {
            let backend = GeminiClient::new(api_key)
                .map_err(|e| anyhow::anyhow!("Failed to build model client: {}", e))?;
            AppState::new(config, Arc::new(backend))
        }
        None => {
            warn!("No Gemini API key configured; analysis and query endpoints disabled");
            AppState::without_backend(config)
        }
    };

    let app = vigil_sa::api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
