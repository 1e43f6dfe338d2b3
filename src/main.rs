// =============================================================================
// Helix Screener — Main Entry Point
// =============================================================================
//
// Wires the screening service together from environment configuration:
// circuit-broken upstream client, shared caches, admission layer, alerting,
// lifecycle emitter, and the rate-limited REST API. Background tasks (cache
// cleanup, IP violation decay, weekly scorecard) all drain through a single
// shutdown signal with a bounded grace window.
// =============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use helix_screener::alerts::{LogNotifier, Notifier, WebhookNotifier};
use helix_screener::api;
use helix_screener::app_state::AppState;
use helix_screener::config::ScreenerConfig;
use helix_screener::market_data::HttpMarketDataClient;

/// How long background tasks get to drain after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ScreenerConfig::from_env();
    config.validate()?;

    info!(
        bind = %config.bind_addr,
        upstream = %config.upstream_url,
        environment = %config.environment,
        symbols = ?config.symbols,
        event_log = config.event_log_enabled,
        "helix screener starting"
    );
    if config.api_keys.is_empty() {
        warn!("SCREENER_API_KEYS is empty; every authenticated endpoint will reject");
    }

    // ── 2. Upstream client & notifier ────────────────────────────────────
    let client = Arc::new(HttpMarketDataClient::new(
        config.upstream_url.clone(),
        config.derivatives_url.clone(),
    ));
    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };

    // ── 3. Shared state & background tasks ───────────────────────────────
    let state = Arc::new(AppState::new(config, client, notifier));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let background = state.spawn_background_tasks(shutdown_rx.clone());
    spawn_signal_handler(shutdown_tx);

    // ── 4. API server ────────────────────────────────────────────────────
    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr).await?;
    info!(addr = %state.config.bind_addr, "API server listening");

    let mut server_shutdown = shutdown_rx.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        // Resolves when the shutdown flag flips.
        while server_shutdown.changed().await.is_ok() {
            if *server_shutdown.borrow() {
                break;
            }
        }
    })
    .await?;

    // ── 5. Drain ─────────────────────────────────────────────────────────
    info!("server stopped, draining background tasks");
    for handle in background {
        if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
            warn!("background task did not drain within the grace window");
        }
    }

    info!("helix screener shut down complete");
    Ok(())
}

/// Install the Ctrl+C handler that flips the shutdown flag.
fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown signal received, stopping gracefully");
            let _ = shutdown_tx.send(true);
        }
    });
}
