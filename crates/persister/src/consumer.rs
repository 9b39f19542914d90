//! Queue consumer: delivery → decode → derive path → write
//!
//! Deliveries are handled independently. Each one is spawned on its own task,
//! with at most `concurrency` in flight; while every permit is held the
//! dispatch loop stops pulling from the subscription. Per-delivery failures
//! are logged, counted, optionally dead-lettered, and never stop the loop.
//! A failed receive pauses the loop for `RECEIVE_ERROR_BACKOFF`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use persister_middleware::{Storage, Subscription, TransportError, TransportMessage};

use crate::clock::{Clock, SystemClock};
use crate::config::DEFAULT_CONCURRENCY;
use crate::dead_letter::{DeadLetterSink, FailureKind};
use crate::message::ResourceMessage;
use crate::metrics::ConsumerMetrics;
use crate::path::derive_path;
use crate::title::extract_title;

/// Pause after a failed receive before polling the subscription again
pub const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Result of handling one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Stored { path: String, bytes: u64 },
    DecodeFailed,
    WriteFailed { path: String },
}

impl DeliveryOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, DeliveryOutcome::Stored { .. })
    }
}

pub struct QueueConsumer {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    metrics: ConsumerMetrics,
    dead_letter: Option<DeadLetterSink>,
    concurrency: usize,
}

impl QueueConsumer {
    pub fn new(storage: Arc<dyn Storage>, metrics: ConsumerMetrics) -> Self {
        Self {
            storage,
            clock: Arc::new(SystemClock),
            metrics,
            dead_letter: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_dead_letter(mut self, sink: DeadLetterSink) -> Self {
        self.dead_letter = Some(sink);
        self
    }

    /// Maximum deliveries handled at once (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn metrics(&self) -> &ConsumerMetrics {
        &self.metrics
    }

    /// Dispatch deliveries until the subscription closes or `shutdown` fires,
    /// then wait for in-flight handlers. Returns the number of deliveries
    /// dispatched.
    pub async fn run(
        self: Arc<Self>,
        mut subscription: Box<dyn Subscription>,
        shutdown: CancellationToken,
    ) -> u64 {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<DeliveryOutcome> = JoinSet::new();
        let mut dispatched: u64 = 0;

        info!(concurrency = self.concurrency, "Consumer running");

        loop {
            while let Some(result) = tasks.try_join_next() {
                log_join_result(result);
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = subscription.next() => next,
            };

            match next {
                Ok(delivery) => {
                    dispatched += 1;
                    let consumer = Arc::clone(&self);
                    tasks.spawn(async move {
                        let _permit = permit;
                        consumer.handle(&delivery).await
                    });
                }
                Err(TransportError::Closed) => {
                    info!("Subscription closed");
                    break;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        backoff_ms = RECEIVE_ERROR_BACKOFF.as_millis() as u64,
                        "Failed to receive delivery"
                    );
                    drop(permit);
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        debug!(in_flight = tasks.len(), "Waiting for in-flight deliveries");
        while let Some(result) = tasks.join_next().await {
            log_join_result(result);
        }

        if let Err(e) = subscription.unsubscribe().await {
            warn!(error = %e, "Failed to unsubscribe");
        }

        info!(dispatched, "Consumer stopped");
        dispatched
    }

    /// Run the pipeline for a single delivery
    pub async fn handle(&self, delivery: &TransportMessage) -> DeliveryOutcome {
        self.metrics.inc_received();
        let _in_flight = self.metrics.track_in_flight();
        self.process(delivery).await
    }

    async fn process(&self, delivery: &TransportMessage) -> DeliveryOutcome {
        let resource = match ResourceMessage::decode(&delivery.payload) {
            Ok(resource) => resource,
            Err(e) => {
                warn!(
                    subject = %delivery.subject,
                    bytes = delivery.payload.len(),
                    error = %e,
                    "Dropping delivery: payload failed to decode"
                );
                self.metrics.inc_decode_failure();
                self.dead_letter(delivery, FailureKind::Decode, &e.to_string())
                    .await;
                return DeliveryOutcome::DecodeFailed;
            }
        };

        let captured_at = self.clock.now();
        let path = derive_path(&resource.url, captured_at);
        debug!(
            url = %resource.url,
            path = %path,
            title = %extract_title(&resource.content),
            "Storing content"
        );

        match self.storage.put(&path, Bytes::from(resource.content)).await {
            Ok(meta) => {
                self.metrics
                    .record_stored(meta.size, captured_at.timestamp());
                info!(path = %path, bytes = meta.size, "Content stored");
                DeliveryOutcome::Stored {
                    path,
                    bytes: meta.size,
                }
            }
            Err(e) => {
                error!(
                    url = %resource.url,
                    path = %path,
                    error = %e,
                    "Dropping delivery: failed to store content"
                );
                self.metrics.inc_write_failure();
                self.dead_letter(delivery, FailureKind::Write, &e.to_string())
                    .await;
                DeliveryOutcome::WriteFailed { path }
            }
        }
    }

    async fn dead_letter(&self, delivery: &TransportMessage, kind: FailureKind, error: &str) {
        let Some(sink) = &self.dead_letter else {
            return;
        };
        match sink.send(delivery, kind, error).await {
            Ok(()) => {
                self.metrics.inc_dead_letter();
                debug!(dead_letter_subject = %sink.subject(), failure = %kind, "Delivery dead-lettered");
            }
            Err(e) => {
                error!(
                    dead_letter_subject = %sink.subject(),
                    failure = %kind,
                    error = %e,
                    "Failed to publish dead letter"
                );
            }
        }
    }
}

fn log_join_result(result: Result<DeliveryOutcome, tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Delivery handler panicked");
    }
}
