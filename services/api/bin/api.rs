//! Main Entrypoint for the Cubby Voice Relay
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the tool registry and the Gemini Live connector.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and stopping live sessions on shutdown.

use anyhow::Context;
use cubby_api::{
    config::Config,
    prompts::load_system_instruction,
    router::create_router,
    state::{AppState, SessionRegistry},
    ws::relay::RelaySettings,
};
use cubby_core::storage::storage_tools;
use gemini_live::{GeminiLiveConnector, LiveConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio_util::task::TaskTracker;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// How long in-flight connections get to finish their teardown on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Waits for `Ctrl+C`, then asks every live session to stop.
async fn shutdown_signal(sessions: SessionRegistry) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
    let stopped = sessions.stop_all().await;
    info!(sessions = stopped, "Stopped active client sessions");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let system_instruction = load_system_instruction(config.prompts_path.as_deref())?;
    let tools = Arc::new(storage_tools());
    info!(tools = tools.len(), "Tool registry ready");

    let live_config = LiveConfig {
        backend: config.backend().context("Incomplete upstream credentials")?,
        model: config.model.clone(),
        voice_name: config.voice_name.clone(),
        system_instruction,
        tools: tools.declarations(),
    };
    let connector = Arc::new(GeminiLiveConnector::new(live_config));

    let sessions = SessionRegistry::new();
    let app_state = Arc::new(AppState {
        connector,
        tools,
        settings: RelaySettings::new(config.send_sample_rate, config.inactivity),
        sessions: sessions.clone(),
        connections: TaskTracker::new(),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state.clone()).layer(cors);

    // --- 5. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.model,
        voice = %config.voice_name,
        send_sample_rate = config.send_sample_rate,
        receive_sample_rate = config.receive_sample_rate,
        warn_after = ?config.inactivity.warn_after(),
        disconnect_after = ?config.inactivity.disconnect_after(),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(sessions))
    .await?;

    // Upgraded connections outlive `serve`; let their relays tear down.
    if !app_state.drain_connections(SHUTDOWN_GRACE).await {
        warn!(
            remaining = app_state.connections.len(),
            "Shutdown grace period elapsed with connections still open"
        );
    }
    info!("Server has shut down.");
    Ok(())
}
