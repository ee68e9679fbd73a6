// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use event_outbox_server::{
    api::router,
    auth::JsonWebTokenManager,
    config::{Config, LogFormat, DEFAULT_LOG_FILTER},
    outbox::{OutboxRelay, TracingPublisher, EVENTS},
    state::AppState,
    storage::{RedbBackend, DATABASE_FILE},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .json()
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("Failed to set tracing subscriber");
        }
        LogFormat::Pretty => {
            let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("Failed to set tracing subscriber");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("Invalid configuration");
    init_tracing(config.log_format);

    let db_path = config.data_dir.join(DATABASE_FILE);
    let backend = RedbBackend::open(&db_path, &[EVENTS]).expect("Failed to open outbox database");
    info!(path = %db_path.display(), "Outbox database opened");

    let tokens = JsonWebTokenManager::new(config.jwt.clone()).expect("Invalid JWT key material");
    let state = AppState::new(Arc::new(backend), Arc::new(tokens));

    // Background relay, stopped on shutdown.
    let shutdown = CancellationToken::new();
    let relay = OutboxRelay::new(state.events.clone(), Arc::new(TracingPublisher))
        .with_poll_interval(config.outbox_poll_interval);
    let relay_task = tokio::spawn(relay.run(shutdown.clone()));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");

    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            shutdown.cancel();
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    let app = router(state);

    match &config.tls {
        Some(paths) => {
            // Install the ring crypto provider for rustls (must be done before any TLS operations)
            rustls::crypto::ring::default_provider()
                .install_default()
                .expect("Failed to install rustls crypto provider");

            let tls_config = RustlsConfig::from_pem_file(&paths.cert, &paths.key)
                .await
                .expect("Failed to load TLS certificate");

            info!(%addr, "Event outbox server listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .expect("HTTPS server failed");
        }
        None => {
            info!(%addr, "Event outbox server listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .expect("HTTP server failed");
        }
    }

    shutdown.cancel();
    if let Err(e) = relay_task.await {
        error!(error = %e, "Outbox relay task failed");
    }
    info!("Server stopped");
}
