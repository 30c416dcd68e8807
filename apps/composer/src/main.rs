mod composition;
mod config;
mod errors;
mod image_client;
mod llm_client;
mod patterns;
mod routes;
mod state;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::image_client::{DisabledImageService, HttpImageClient, ImageService};
use crate::llm_client::{GenerativeService, LlmClient};
use crate::patterns::registry::PatternRegistry;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Composer API v{}", env!("CARGO_PKG_VERSION"));

    // Load the pattern catalog; an invalid catalog is fatal
    let registry = match &config.pattern_catalog_path {
        Some(path) => PatternRegistry::from_file(path)
            .with_context(|| format!("failed to load pattern catalog {}", path.display()))?,
        None => PatternRegistry::builtin().context("built-in pattern catalog is invalid")?,
    };
    info!(
        patterns = registry.len(),
        categories = registry.categories().len(),
        "Pattern registry loaded"
    );

    // Initialize LLM client
    let mut llm = LlmClient::new(config.anthropic_api_key.clone())?;
    if let Some(model) = &config.anthropic_model {
        llm = llm.with_model(model.clone());
    }
    info!("LLM client initialized (model: {})", llm.model_id());

    // Initialize image client
    let images: Arc<dyn ImageService> = match &config.image_service_url {
        Some(url) => {
            info!(endpoint = %url, "Image client initialized");
            Arc::new(HttpImageClient::new(url.clone(), config.image_service_key.clone())?)
        }
        None => {
            warn!("IMAGE_SERVICE_URL not set; image generation will record every task as failed");
            Arc::new(DisabledImageService)
        }
    };

    // Build app state
    let state = AppState {
        registry: Arc::new(registry),
        llm: Arc::new(llm),
        images,
        settings: config.composer_settings(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict CORS origins once the editor frontend has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
