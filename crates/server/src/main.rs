//! rmadesk server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rmadesk_api::middleware::AppState;
use rmadesk_common::Config;
use rmadesk_core::{
    ActivityLogService, ActivityLogger, ArchivalService, DbActivityLogger, TicketService,
    TicketStore,
};
use rmadesk_db::repositories::{ActivityLogRepository, SupportTicketRepository};
use rmadesk_queue::{ArchivalJobExecutor, SchedulerConfig, spawn_archival_scheduler};
use tokio::{signal, sync::watch};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    map_response_body::MapResponseBodyLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Request bodies above this size are rejected.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rmadesk=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting rmadesk server...");

    // Load configuration
    let config = Config::load()?;
    if config.auth.staff.is_empty() {
        tracing::warn!("No staff accounts configured; back-office endpoints are unreachable");
    }

    // Connect to database
    let db = rmadesk_db::init(&config.database).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    let applied = rmadesk_db::migrate(&db).await?;
    info!(applied, "Migrations completed");

    // Initialize repositories
    let db = Arc::new(db);
    let ticket_store: Arc<dyn TicketStore> =
        Arc::new(SupportTicketRepository::new(Arc::clone(&db)));
    let activity_repo = ActivityLogRepository::new(Arc::clone(&db));
    let activity_logger: Arc<dyn ActivityLogger> =
        Arc::new(DbActivityLogger::new(activity_repo.clone()));

    // Initialize services
    let ticket_service = TicketService::new(ticket_store.clone(), activity_logger.clone());
    let archival_service =
        ArchivalService::new(ticket_store, activity_logger, &config.archival);
    let activity_log_service = ActivityLogService::new(activity_repo);

    let state = AppState {
        ticket_service,
        archival_service: archival_service.clone(),
        activity_log_service,
        auth: Arc::new(config.auth.clone()),
    };

    // Start the archival scheduler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = if config.archival.enabled {
        let executor = Arc::new(ArchivalJobExecutor::new(archival_service));
        info!(
            retention_days = config.archival.retention_days,
            "Starting archival scheduler..."
        );
        Some(spawn_archival_scheduler(
            SchedulerConfig::from(&config.archival),
            executor,
            shutdown_rx,
        ))
    } else {
        info!("Archival scheduler disabled");
        None
    };

    // Build router
    let app = rmadesk_api::app(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_secs,
            )))
            .layer(MapResponseBodyLayer::new(axum::body::Body::new))
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
    );

    // Start server with graceful shutdown
    let ip: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(ip, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the scheduler and let a running sweep finish
    if let Some(handle) = scheduler {
        let _ = shutdown_tx.send(true);
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Archival scheduler task failed");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
