use anyhow::Result;
use event_bus::{ConnectionManager, Dispatcher, EventConsumer};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worker_service::{build_registry, Backends, LogFormat, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();
    init_tracing(&config.app.log_format);

    info!(
        env = %config.app.env,
        broker = %config.broker.redacted_url(),
        prefetch = config.broker.prefetch,
        "Worker service starting"
    );

    let connection = Arc::new(ConnectionManager::new(config.broker.clone()));
    connection.start();

    let registry = build_registry(Backends::default());
    for event_type in registry.event_types() {
        info!(
            queue = %event_type.queue_name(),
            handlers = registry.handlers_for(event_type).len(),
            "Handlers registered"
        );
    }

    let dispatcher = Arc::new(Dispatcher::new(registry));
    let consumer = Arc::new(EventConsumer::new(Arc::clone(&connection), dispatcher));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = consumer.spawn(shutdown_rx);
    info!(consumers = workers.len(), "Waiting for events");

    shutdown_signal().await;
    info!("Shutdown signal received, stopping consumers");

    shutdown_tx.send_replace(true);
    for result in futures::future::join_all(workers).await {
        if let Err(e) = result {
            error!(error = %e, "Consumer task ended abnormally");
        }
    }

    connection.close().await;
    info!("Worker service stopped");
    Ok(())
}

fn init_tracing(format: &LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "worker_service=info,event_bus=info,catalog_cache=info".into());
    let json = *format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
    }
}
