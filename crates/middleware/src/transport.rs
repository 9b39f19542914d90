use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

use crate::error::TransportError;

/// Message envelope with metadata
#[derive(Debug, Clone)]
pub struct TransportMessage {
    pub subject: String,
    pub payload: Bytes,
    pub headers: HashMap<String, String>,
    /// Publish-order sequence, when the transport tracks one
    pub sequence: Option<u64>,
}

/// Subscription handle for receiving messages
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Receive next message (blocks until available).
    ///
    /// Returns `TransportError::Closed` once the subscription can yield no
    /// further messages.
    async fn next(&mut self) -> Result<TransportMessage, TransportError>;

    /// Unsubscribe and close
    async fn unsubscribe(self: Box<Self>) -> Result<(), TransportError>;
}

/// Transport abstraction for pub/sub messaging
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a message (fire and forget)
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Publish with headers
    async fn publish_with_headers(
        &self,
        subject: &str,
        payload: Bytes,
        headers: HashMap<String, String>,
    ) -> Result<(), TransportError>;

    /// Subscribe to a subject. Every subscriber sees every message.
    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, TransportError>;

    /// Subscribe as a member of a queue group. Each message published on the
    /// subject is delivered to exactly one member of the group.
    async fn queue_subscribe(
        &self,
        subject: &str,
        queue_group: &str,
    ) -> Result<Box<dyn Subscription>, TransportError>;
}
