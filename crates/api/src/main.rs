//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use common::StaffId;
use domain::{AccountDirectory, Identity, InMemoryDirectory};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<S: Store + Clone + 'static>(
    store: S,
    directory: Arc<dyn AccountDirectory>,
    default_staff: StaffId,
    metrics_handle: PrometheusHandle,
    config: &Config,
) {
    let state = api::create_default_state(store, directory, default_staff);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Bootstrap the account directory
    let directory = Arc::new(InMemoryDirectory::new());
    let default_staff = StaffId::new();
    if let Some(token) = &config.staff_token {
        directory.register(token.clone(), Identity::Staff { id: default_staff });
    }

    // 4. Pick a store backend and run
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresStore::new(pool).with_lock_wait(config.lock_wait());
            store.run_migrations().await.expect("migrations failed");
            serve(store, directory, default_staff, metrics_handle, &config).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, serving from the in-memory store");
            let store = InMemoryStore::new().with_lock_wait(config.lock_wait());
            serve(store, directory, default_staff, metrics_handle, &config).await;
        }
    }
}
