use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use jollyboard_core::store::LockStore;
use jollyboard_db::PgLockStore;
use jollyboard_events::BoardChannels;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jollyboard_api::background::lock_reclamation;
use jollyboard_api::config::ServerConfig;
use jollyboard_api::router::build_app_router;
use jollyboard_api::state::AppState;
use jollyboard_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "jollyboard_api=debug,jollyboard_db=info,tower_http=debug".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = jollyboard_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    jollyboard_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    jollyboard_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let cancel = CancellationToken::new();

    // --- Lock store and change feed ---
    let store = Arc::new(PgLockStore::new(pool.clone()));
    let feed_handle = store.start_change_feed(cancel.clone());
    tracing::info!("Lock change feed started");

    // --- Board channels ---
    let channels = Arc::new(BoardChannels::default());

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager), Arc::clone(&channels));

    // --- Lock reclamation ---
    let reclamation_handle = config.lock_ttl_secs.map(|ttl| {
        let store: Arc<dyn LockStore> = store.clone();
        tokio::spawn(lock_reclamation::run(
            store,
            Arc::clone(&channels),
            Duration::from_secs(ttl),
            Duration::from_secs(config.lock_sweep_interval_secs),
            cancel.clone(),
        ))
    });
    if reclamation_handle.is_none() {
        tracing::info!("LOCK_TTL_SECS not set, idle locks are never reclaimed");
    }

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        store,
        channels,
        ws_manager: Arc::clone(&ws_manager),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let grace = Duration::from_secs(config.shutdown_timeout_secs);

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining realtime connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    cancel.cancel();
    if let Some(handle) = reclamation_handle {
        let _ = tokio::time::timeout(grace, handle).await;
        tracing::info!("Lock reclamation stopped");
    }
    let _ = tokio::time::timeout(grace, feed_handle).await;
    tracing::info!("Lock change feed stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
