//! persister binary entry point

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use persister::dead_letter::DeadLetterSink;
use persister::metrics::ConsumerMetrics;
use persister::server::{run_server, ServerState};
use persister::{Config, QueueConsumer};
use persister_middleware::{LocalStorage, NatsTransport, Transport};

const CONNECTION_CHECK_INTERVAL: Duration = Duration::from_secs(5);

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);

    config.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    info!(
        nats_url = %config.nats_url,
        subject = %config.subject,
        queue_group = %config.queue_group,
        storage = ?config.storage_path,
        concurrency = config.concurrency,
        dead_letter_subject = ?config.dead_letter_subject,
        "Starting persister"
    );

    // Startup transport failures are fatal; no retry.
    let transport = Arc::new(NatsTransport::connect(&config.nats_url).await.map_err(|e| {
        error!(error = %e, "Failed to connect to NATS");
        e
    })?);
    let subscription = transport
        .queue_subscribe(&config.subject, &config.queue_group)
        .await
        .map_err(|e| {
            error!(error = %e, subject = %config.subject, "Failed to subscribe");
            e
        })?;

    let metrics = ConsumerMetrics::new(config.subject.clone());
    let storage = Arc::new(LocalStorage::new(config.storage_path.clone()));
    let mut consumer =
        QueueConsumer::new(storage, metrics.clone()).with_concurrency(config.concurrency);
    if let Some(subject) = &config.dead_letter_subject {
        consumer = consumer.with_dead_letter(DeadLetterSink::new(transport.clone(), subject));
    }

    let shutdown = CancellationToken::new();
    let connected = Arc::new(AtomicBool::new(transport.is_connected()));

    if let Some(addr) = config.listen_addr {
        let state = ServerState::new(
            config.subject.clone(),
            Arc::clone(&connected),
            metrics.last_stored_handle(),
        );
        let shutdown = shutdown.clone();
        info!(addr = %addr, "Health/metrics server listening");
        tokio::spawn(async move {
            if let Err(e) = run_server(addr, state, shutdown).await {
                error!(error = %e, "Health server failed");
            }
        });
    }

    {
        let transport = Arc::clone(&transport);
        let connected = Arc::clone(&connected);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CONNECTION_CHECK_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let now_connected = transport.is_connected();
                        if connected.swap(now_connected, Ordering::SeqCst) != now_connected {
                            if now_connected {
                                info!("NATS connection restored");
                            } else {
                                warn!("NATS connection lost");
                            }
                        }
                    }
                }
            }
        });
    }

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("SIGTERM received, shutting down gracefully"),
                _ = sigint.recv() => info!("SIGINT received, shutting down gracefully"),
                _ = shutdown.cancelled() => return,
            }
            shutdown.cancel();
        });
    }

    info!("Persister running, waiting for SIGTERM/SIGINT to stop");

    let dispatched = Arc::new(consumer)
        .run(subscription, shutdown.clone())
        .await;
    shutdown.cancel();

    // Push out any dead letters still buffered in the client.
    if let Err(e) = transport.flush().await {
        warn!(error = %e, "Failed to flush NATS client");
    }

    info!(
        dispatched,
        stored = metrics.get_stored_total(),
        decode_failures = metrics.get_decode_failures(),
        write_failures = metrics.get_write_failures(),
        "Persister stopped"
    );
    Ok(())
}
