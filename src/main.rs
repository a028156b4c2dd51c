//! Grid Arena - headless multi-client arena runner
//!
//! Runs one observed session plus bot-driven peers over the in-process hub and serves:
//! - `GET /health` with session, peer and latency status
//! - `GET /frame` with the latest drawable list

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use grid_arena::app::{AppState, BotInput, FrameDriver, Session, SessionView};
use grid_arena::config::Config;
use grid_arena::http::build_router;
use grid_arena::sync::{LocalHub, Transport};
use grid_arena::util::time::{init_process_time, unix_millis};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize uptime tracking
    init_process_time();

    info!("Starting Grid Arena");
    info!("Server address: {}", config.server_addr);
    info!(
        room = %config.room,
        model = ?config.movement_model,
        bots = config.bots,
        loss_rate = config.loss_rate,
        "Arena configured"
    );

    let seed = unix_millis();
    let hub = if config.loss_rate > 0.0 {
        LocalHub::with_loss(config.loss_rate, seed)
    } else {
        LocalHub::new()
    };
    let transport: Arc<dyn Transport> = Arc::new(hub);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Observed session, bot-driven like the rest
    let (view_tx, view_rx) = watch::channel(SessionView::default());
    let mut drivers: Vec<JoinHandle<Session>> = Vec::with_capacity(config.bots.max(1));
    let session = Session::start(&config, transport.clone());
    drivers.push(tokio::spawn(FrameDriver::from_config(&config).run(
        session,
        BotInput::new(seed),
        view_tx,
        shutdown_rx.clone(),
    )));

    for n in 1..config.bots {
        let session = Session::start(&config, transport.clone());
        let (peer_view_tx, _) = watch::channel(SessionView::default());
        drivers.push(tokio::spawn(FrameDriver::from_config(&config).run(
            session,
            BotInput::new(seed.wrapping_add(n as u64)),
            peer_view_tx,
            shutdown_rx.clone(),
        )));
    }

    // Build router
    let addr: SocketAddr = config.server_addr;
    let router = build_router(AppState::new(config, view_rx));

    // Start server
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Frame endpoint: http://{}/frame", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop every driver so channels are released
    let _ = shutdown_tx.send(true);
    for driver in drivers {
        if let Err(e) = driver.await {
            warn!(error = %e, "Frame driver task failed");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
