use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use seatpool_core::clock::SystemClock;
use seatpool_core::coordinator::LicenseCoordinator;
use seatpool_core::otp::OtpSource;
use seatpool_core::store::{LicenseStore, MemoryLicenseStore};
use seatpool_core::usage::{MemoryUsageLogStore, UsageLogStore};
use seatpool_events::{EventBus, UsageRecorder};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seatpool_api::background::expiry_sweep;
use seatpool_api::config::ServerConfig;
use seatpool_api::otp::HttpOtpSource;
use seatpool_api::router::build_app_router;
use seatpool_api::seed;
use seatpool_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seatpool_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        active_minutes = config.lease.active_duration.num_minutes(),
        extend_window_minutes = config.lease.extend_window.num_minutes(),
        "Loaded server configuration"
    );

    // --- Storage ---
    let (license_store, usage_store) = build_stores(&config).await;

    if let Some(path) = &config.seed_file {
        seed::seed_from_file(license_store.as_ref(), path)
            .await
            .expect("Failed to import license seed");
    }

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let recorder_handle = tokio::spawn(UsageRecorder::run(
        Arc::clone(&usage_store),
        event_bus.subscribe(),
    ));
    tracing::info!("Usage recorder started");

    // --- Coordinator ---
    let coordinator = Arc::new(
        LicenseCoordinator::new(license_store, Arc::new(SystemClock), config.lease)
            .with_observer(event_bus.clone()),
    );

    // --- OTP source ---
    let otp_source: Option<Arc<dyn OtpSource>> = match &config.otp_service_url {
        Some(url) => {
            let source = HttpOtpSource::new(url.as_str()).expect("Failed to build OTP client");
            tracing::info!(url = %url, "OTP service configured");
            Some(Arc::new(source) as Arc<dyn OtpSource>)
        }
        None => {
            tracing::warn!("OTP_SERVICE_URL not set, OTP lookups are disabled");
            None
        }
    };

    // --- Expiry sweep ---
    let sweep_cancel = CancellationToken::new();
    let sweep_handle = (config.sweep_interval_secs > 0).then(|| {
        tokio::spawn(expiry_sweep::run(
            Arc::clone(&coordinator),
            Duration::from_secs(config.sweep_interval_secs),
            sweep_cancel.clone(),
        ))
    });

    // --- App state ---
    let state = AppState {
        coordinator,
        usage_store,
        otp_source,
        event_bus,
        config: Arc::new(config.clone()),
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

    sweep_cancel.cancel();
    if let Some(handle) = sweep_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("Expiry sweep stopped");
    }

    // The router, the sweep task and the coordinator held the last bus
    // handles; with them gone the recorder drains and exits.
    let _ = tokio::time::timeout(Duration::from_secs(5), recorder_handle).await;
    tracing::info!("Graceful shutdown complete");
}

/// Pick the storage backend: Postgres when `DATABASE_URL` is set, memory
/// otherwise.
async fn build_stores(config: &ServerConfig) -> (Arc<dyn LicenseStore>, Arc<dyn UsageLogStore>) {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using in-memory stores (state is lost on restart)");
        return (
            Arc::new(MemoryLicenseStore::new()),
            Arc::new(MemoryUsageLogStore::new()),
        );
    };

    let pool = seatpool_db::create_pool(database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    seatpool_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    seatpool_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    (
        Arc::new(seatpool_db::PgLicenseStore::new(pool.clone())),
        Arc::new(seatpool_db::PgUsageLogStore::new(pool)),
    )
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
