//! EventHaiti HTTP server.
//!
//! Marketplace backend: verification, payouts, earnings, staff, refunds and reviews.

use axum::{Router, extract::State, http::StatusCode, routing::get};
use eventhaiti::auth::JwtService;
use eventhaiti::secrets::OsSecretGenerator;
use eventhaiti::storage::LocalFileStore;
use eventhaiti::{AppState, Config, build_router};
use eventhaiti_core::environment::{SystemClock, UuidGenerator};
use eventhaiti_postgres::PostgresDocumentStore;
use eventhaiti_runtime::metrics::MetricsExporter;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Local development reads a .env file; production sets real variables
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,eventhaiti=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting EventHaiti backend");

    // Load configuration
    let config = Config::from_env();
    if config.auth.jwt_secret == "dev-secret-change-in-production" {
        warn!("AUTH_JWT_SECRET is not set, using the development secret");
    }
    info!(
        bind = %config.bind_address(),
        storage_root = %config.storage.root,
        sms_sender = %config.sms.sender,
        push_enabled = config.push.enabled,
        "Configuration loaded"
    );

    // Metrics
    let mut exporter = MetricsExporter::new();
    exporter.install()?;
    let exporter = Arc::new(exporter);

    // Document store
    info!("Connecting to document store...");
    let documents = PostgresDocumentStore::connect(&config.postgres.url, &config.postgres.pool_settings()).await?;
    documents.migrate().await?;
    info!("Document store connected and migrated");

    // Outbound services
    let sms = config.sms.build()?;
    let push = config.push.build();
    let jwt = Arc::new(JwtService::new(
        &config.auth.jwt_secret,
        config.auth.issuer.clone(),
        config.session_ttl(),
    ));

    let state = AppState::new(
        Arc::new(documents),
        Arc::new(LocalFileStore::new(config.storage.root.clone())),
        Arc::new(SystemClock),
        Arc::new(UuidGenerator),
        Arc::new(OsSecretGenerator),
        sms,
        push,
        jwt,
        config.payouts.policy(),
    );

    // Metrics listener
    let metrics_addr = format!("{}:{}", config.server.metrics_host, config.server.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr).await?;
    info!(address = %metrics_addr, "Metrics listening");
    let metrics_app = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(exporter);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_app).await {
            error!(error = %e, "Metrics server failed");
        }
    });

    // Build router
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    // Graceful shutdown: stop accepting on a signal, then give in-flight
    // requests `shutdown_timeout` to finish
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            result??;
            return Ok(());
        },
        () = shutdown_signal() => {},
    }

    let _ = stop_tx.send(());
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(result) => result??,
        Err(_) => warn!(timeout_secs = config.server.shutdown_timeout, "Shutdown timed out, dropping connections"),
    }

    info!("Server stopped");
    Ok(())
}

async fn render_metrics(State(exporter): State<Arc<MetricsExporter>>) -> (StatusCode, String) {
    match exporter.render() {
        Some(body) => (StatusCode::OK, body),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed".to_string()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
