//! Call Controller
//!
//! Stateful signaling coordinator for staff/client video calls.
//!
//! # Servers
//!
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Initialize participant registry and session store
//! 4. Spawn the coordinator actor
//! 5. Start health HTTP server (liveness, readiness, metrics)
//! 6. Wait for shutdown signal, then drain in-flight calls

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use call_controller::actors::{ActorMetrics, CoordinatorActor};
use call_controller::config::Config;
use call_controller::external::{AlwaysAvailable, LoggingHistorySink};
use call_controller::observability::{health_router, HealthState};
use call_controller::registry::ParticipantRegistry;
use call_controller::sessions::SessionStore;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for the coordinator to drain in-flight calls.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Call Controller");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        cc_id = %config.cc_id,
        health_bind_address = %config.health_bind_address,
        ring_timeout_seconds = config.ring_timeout_seconds,
        connect_timeout_seconds = config.connect_timeout_seconds,
        ended_retention_seconds = config.ended_retention_seconds,
        max_calls = config.max_calls,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder
    // This must happen before any metrics are recorded
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        anyhow::anyhow!("Failed to install Prometheus metrics recorder: {e}")
    })?;
    info!("Prometheus metrics recorder initialized");

    // Initialize health state
    let health_state = Arc::new(HealthState::new());

    // Initialize shared state
    let registry = Arc::new(ParticipantRegistry::new());
    let sessions = Arc::new(SessionStore::new(
        Arc::clone(&registry),
        Arc::new(AlwaysAvailable),
    ));
    let history = Arc::new(LoggingHistorySink);
    let actor_metrics = ActorMetrics::new();

    // Spawn the coordinator actor
    // All call actors hang off child tokens of this root token
    let shutdown_token = CancellationToken::new();
    let (coordinator_handle, coordinator_task) = CoordinatorActor::spawn(
        config.clone(),
        Arc::clone(&registry),
        Arc::clone(&sessions),
        history,
        shutdown_token.clone(),
        Arc::clone(&actor_metrics),
    );
    info!("Coordinator actor started");

    // Start health HTTP server (MUST succeed - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        anyhow::anyhow!("Invalid health bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let app = health_router(Arc::clone(&health_state))
        .merge(metrics_router)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            anyhow::anyhow!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    health_state.set_ready();
    info!("Call Controller running - press Ctrl+C to shutdown");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so load balancers stop routing here
    health_state.set_not_ready();

    if let Ok(status) = coordinator_handle.status().await {
        info!(
            active_calls = status.active_calls,
            pending_invitations = status.pending_invitations,
            "Draining in-flight calls"
        );
    }

    // Cancelling the root token drains the coordinator: every call
    // actor finishes with the shutdown reason and both participants
    // are notified before the tasks exit
    shutdown_token.cancel();

    match tokio::time::timeout(DRAIN_TIMEOUT, coordinator_task).await {
        Ok(Ok(())) => info!("Coordinator drained"),
        Ok(Err(e)) => warn!(error = %e, "Coordinator task error during shutdown"),
        Err(_) => warn!(
            timeout_seconds = DRAIN_TIMEOUT.as_secs(),
            "Coordinator drain timed out"
        ),
    }

    info!("Call Controller shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
