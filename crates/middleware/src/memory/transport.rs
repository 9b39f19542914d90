use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::error::TransportError;
use crate::transport::{Subscription, Transport, TransportMessage};

const CHANNEL_BUFFER_SIZE: usize = 1024;

/// One work queue per (subject, queue group). Members share the receiver,
/// so each message is taken by exactly one of them.
struct QueueGroup {
    tx: mpsc::UnboundedSender<TransportMessage>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<TransportMessage>>>,
}

pub struct InMemoryTransport {
    channels: DashMap<String, broadcast::Sender<TransportMessage>>,
    queue_groups: DashMap<(String, String), QueueGroup>,
    sequence: AtomicU64,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            queue_groups: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Drop every channel. Subscribers drain what is already buffered and
    /// then see `TransportError::Closed`.
    pub fn close(&self) {
        self.channels.clear();
        self.queue_groups.clear();
    }

    #[inline]
    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn get_or_create_channel(&self, subject: &str) -> broadcast::Sender<TransportMessage> {
        self.channels
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_BUFFER_SIZE).0)
            .clone()
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

struct InMemorySubscription {
    rx: broadcast::Receiver<TransportMessage>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next(&mut self) -> Result<TransportMessage, TransportError> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => TransportError::Closed,
            lagged => TransportError::SubscribeFailed(lagged.to_string()),
        })
    }

    async fn unsubscribe(self: Box<Self>) -> Result<(), TransportError> {
        Ok(())
    }
}

struct InMemoryQueueSubscription {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<TransportMessage>>>,
}

#[async_trait]
impl Subscription for InMemoryQueueSubscription {
    async fn next(&mut self) -> Result<TransportMessage, TransportError> {
        self.rx.lock().await.recv().await.ok_or(TransportError::Closed)
    }

    async fn unsubscribe(self: Box<Self>) -> Result<(), TransportError> {
        Ok(())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        self.publish_with_headers(subject, payload, HashMap::new())
            .await
    }

    async fn publish_with_headers(
        &self,
        subject: &str,
        payload: Bytes,
        headers: HashMap<String, String>,
    ) -> Result<(), TransportError> {
        let seq = self.next_sequence();
        let msg = TransportMessage {
            subject: subject.to_string(),
            payload,
            headers,
            sequence: Some(seq),
        };

        for group in self.queue_groups.iter().filter(|g| g.key().0 == subject) {
            let _ = group.tx.send(msg.clone());
        }

        let tx = self.get_or_create_channel(subject);
        let _ = tx.send(msg);
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, TransportError> {
        let tx = self.get_or_create_channel(subject);
        let rx = tx.subscribe();
        Ok(Box::new(InMemorySubscription { rx }))
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        queue_group: &str,
    ) -> Result<Box<dyn Subscription>, TransportError> {
        let rx = self
            .queue_groups
            .entry((subject.to_string(), queue_group.to_string()))
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                QueueGroup {
                    tx,
                    rx: Arc::new(Mutex::new(rx)),
                }
            })
            .rx
            .clone();
        Ok(Box::new(InMemoryQueueSubscription { rx }))
    }
}
