//! PetWatch Relay - live detection relay server
//!
//! Main entry point.

use petwatch_relay::{
    network::LocalAddresses,
    state::{AppConfig, AppState},
    web_api,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Delay before the startup upstream connect attempt
const UPSTREAM_AUTO_CONNECT_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "petwatch_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PetWatch Relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        upload_dir = %config.upload_dir.display(),
        output_dir = %config.output_dir.display(),
        scratch_dir = %config.scratch_dir.display(),
        max_in_flight = config.max_in_flight,
        worker = %config.worker.program,
        upstream_url = ?config.upstream_url,
        "Configuration loaded"
    );

    let state = AppState::build(config).await?;
    tracing::info!("Components initialized");

    // Create router with static file serving
    let static_dir = state.config.static_dir.clone();
    let serve_dir = ServeDir::new(&static_dir)
        .not_found_service(ServeFile::new(static_dir.join("index.html")));

    let app = web_api::create_router(state.clone())
        .fallback_service(serve_dir)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    tracing::info!(static_dir = %static_dir.display(), "Static file serving enabled");

    // Upstream auto-connect
    if state.config.upstream_auto_connect && state.config.upstream_url.is_some() {
        let session = state.session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(UPSTREAM_AUTO_CONNECT_DELAY).await;
            tracing::info!("Auto-connecting to upstream phone stream");
            session.connect_upstream();
        });
    }

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    let local = LocalAddresses::discover(state.config.port);
    if local.addresses.is_empty() {
        tracing::warn!("No LAN IPv4 address found; phones must use the host name");
    }
    for ip in &local.addresses {
        tracing::info!("Phone source: ws://{}:{}?type=phone", ip, state.config.port);
    }

    axum::serve(listener, app).await?;

    Ok(())
}
