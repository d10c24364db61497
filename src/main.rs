//! Dropbay Server
//!
//! Anonymous file sharing with chunked transfer and expiring links.

use std::net::SocketAddr;

use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dropbay::config::Config;
use dropbay::routes;
use dropbay::state::AppState;
use dropbay::sweeper::Sweeper;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dropbay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("Starting Dropbay Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Archive root: {}", config.storage.archive_root.display());
    tracing::info!("Staging root: {}", config.storage.staging_root.display());

    // Bootstrap the storage tree
    for root in [
        &config.storage.archive_root,
        &config.storage.staging_root,
        &config.storage.meta_root,
    ] {
        tokio::fs::create_dir_all(root)
            .await
            .expect("failed to create storage directory");
    }

    let state = AppState::new(config.clone());

    // Start the expiration sweeper
    let sweeper = Sweeper::new(
        state.share_store().clone(),
        state.chunk_store(),
        config.sweep.interval_secs,
        config.sweep.session_stale_hours,
    );
    let _sweep_task = sweeper.spawn();

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("invalid SERVER_HOST/SERVER_PORT");
    tracing::info!("Dropbay Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    tracing::info!("Server shutdown complete");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
