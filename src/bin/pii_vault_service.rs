//! PII Vault Service Binary
//!
//! Runs masking and unmasking as a REST API service with:
//! - Structured JSON logging
//! - Request tracing with correlation IDs
//! - Graceful shutdown handling
//! - Health check endpoints
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (in-memory vault when unset)
//! - `VAULT_ENCRYPTION_KEY`: 64 hex chars (required in production)
//! - `VAULT_DEFAULT_TTL_SECS`, `VAULT_TIMEOUT_MS`, `DETECTOR_TIMEOUT_MS`,
//!   `AUDIT_TIMEOUT_MS`, `MIN_DETECTION_SCORE`, `AUDIT_BUFFER_CAPACITY`
//! - `PORT`: Service port (default: 8001)
//! - `HOST`: Service host (default: 0.0.0.0)
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! VAULT_ENCRYPTION_KEY=... cargo run --bin pii_vault_service --features service
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use pii_vault::service::{create_router, metrics_middleware, ServiceState};
use pii_vault::{InMemoryVaultBackend, PostgresVaultBackend, ShieldConfig, VaultBackend};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pii_vault_service=info,pii_vault=info,tower_http=info,sqlx=warn".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true)
            )
            .init();
    }
}

/// Request logging middleware that adds correlation ID and timing
async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let trace_id = request
        .headers()
        .get("X-Cloud-Trace-Context")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split('/').next().unwrap_or(s).to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    let span = info_span!(
        "request",
        trace_id = %trace_id,
        method = %method,
        path = %uri,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let response = next.run(request).instrument(span.clone()).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    span.record("status", status);
    span.record("latency_ms", latency.as_millis() as u64);

    info!(
        target: "pii_vault_service::access",
        trace_id = %trace_id,
        method = %method,
        path = %uri,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request completed"
    );

    response
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Interval between sweeps of expired vault entries.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

fn spawn_memory_purge(backend: Arc<InMemoryVaultBackend>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tick.tick().await;
            let removed = backend.purge_expired();
            if removed > 0 {
                debug!(removed = removed, "Purged expired vault entries");
            }
        }
    });
}

fn spawn_postgres_purge(backend: Arc<PostgresVaultBackend>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tick.tick().await;
            match backend.purge_expired().await {
                Ok(removed) if removed > 0 => debug!(removed = removed, "Purged expired vault entries"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Vault purge failed"),
            }
        }
    });
}

async fn serve<B: VaultBackend + 'static>(
    state: ServiceState<B>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    info!(
        address = %addr,
        version = env!("CARGO_PKG_VERSION"),
        "PII Vault Service listening"
    );

    let listener = TcpListener::bind(addr).await?;

    info!("Ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    let build_sha = option_env!("BUILD_SHA").unwrap_or("dev");

    info!(
        version = version,
        build_sha = build_sha,
        "Starting PII Vault Service"
    );

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8001);

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    let config = ShieldConfig::from_env()?;
    info!(
        default_ttl_secs = config.default_ttl.as_secs(),
        vault_timeout_ms = config.vault_timeout.as_millis() as u64,
        detector_timeout_ms = config.detector_timeout.as_millis() as u64,
        min_detection_score = config.min_detection_score,
        using_dev_key = config.using_dev_key,
        "Configuration loaded"
    );

    if std::env::var("DATABASE_URL").map(|s| !s.is_empty()).unwrap_or(false) {
        info!("Connecting to PostgreSQL...");
        let connect_start = Instant::now();

        let backend = match tokio::time::timeout(
            Duration::from_secs(30),
            PostgresVaultBackend::from_env(),
        ).await {
            Ok(Ok(backend)) => backend,
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to PostgreSQL");
                return Err(e.into());
            }
            Err(_) => {
                error!("PostgreSQL connection timeout after 30s");
                return Err("Database connection timeout".into());
            }
        };

        info!(
            latency_ms = connect_start.elapsed().as_millis() as u64,
            "PostgreSQL connection established"
        );

        let backend = Arc::new(backend);
        spawn_postgres_purge(Arc::clone(&backend));
        serve(ServiceState::from_config(backend, &config, "postgres")?, addr).await?;
    } else {
        warn!("DATABASE_URL not set, using in-memory vault. Entries are lost on restart!");
        let backend = Arc::new(InMemoryVaultBackend::new());
        spawn_memory_purge(Arc::clone(&backend));
        serve(ServiceState::from_config(backend, &config, "memory")?, addr).await?;
    }

    info!("PII Vault Service shutdown complete");

    Ok(())
}
