//! Worker entry point.

use event_store::{EventStore, EventStoreError, InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::PgPool;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use worker::{Config, LogFormat, Worker, WorkerError};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn install_metrics(config: &Config) -> worker::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()
        .map_err(|e| WorkerError::Metrics(e.to_string()))?;
    workflow::metrics::describe();
    Ok(())
}

async fn run<S: EventStore + 'static>(store: S, config: &Config) -> worker::Result<()> {
    let worker = Worker::start(store, config).await?;

    if let Some(path) = &config.orders_file {
        worker.ingest_file(path).await?;
    }
    worker.dispatch().await;

    let mut ticker = tokio::time::interval(config.dispatch_interval);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                worker.dispatch().await;
            }
        }
    }

    // Drain whatever was published before the signal.
    worker.dispatch().await;
    tracing::info!("worker shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> worker::Result<()> {
    // 1. Configuration and tracing
    let config = Config::from_env()?;
    init_tracing(&config);

    // 2. Prometheus exporter
    install_metrics(&config)?;
    tracing::info!(
        service = %config.service_name,
        metrics_port = config.metrics_port,
        "starting order workflow worker"
    );

    // 3. Event store, then the dispatch loop
    match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url).await.map_err(EventStoreError::from)?;
            let store = PostgresEventStore::new(pool);
            store.run_migrations().await?;
            workflow::metrics::component_health("event_store", true);
            tracing::info!("using PostgreSQL event store");
            run(store, &config).await
        }
        None => {
            workflow::metrics::component_health("event_store", true);
            tracing::info!("using in-memory event store");
            run(InMemoryEventStore::new(), &config).await
        }
    }
}
