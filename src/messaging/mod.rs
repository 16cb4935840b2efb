//! Broker-agnostic message handles
//!
//! The worker loop only sees these traits; `crate::broker` implements them
//! on top of AMQP and [`mock`] implements them in memory for tests.

pub mod mock;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::messages::SuccessEvent;

#[derive(Debug, Error)]
pub enum AckError {
    #[error("acknowledge failed: {0}")]
    Ack(String),

    #[error("reject failed: {0}")]
    Reject(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode event: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("failed to publish event: {0}")]
    Transport(String),
}

/// Settles deliveries on the channel that produced them
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self, delivery_tag: u64) -> Result<(), AckError>;

    /// Reject without requeue
    async fn reject(&self, delivery_tag: u64) -> Result<(), AckError>;
}

/// One inbound message.
///
/// `ack` and `reject` take `self`, so a delivery is settled at most once.
pub struct Delivery {
    delivery_tag: u64,
    body: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(delivery_tag: u64, body: Vec<u8>, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            delivery_tag,
            body,
            acker,
        }
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub async fn ack(self) -> Result<(), AckError> {
        self.acker.ack(self.delivery_tag).await
    }

    pub async fn reject(self) -> Result<(), AckError> {
        self.acker.reject(self.delivery_tag).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Ordered stream of deliveries for one topic
#[async_trait]
pub trait DeliverySource: Send {
    /// Next delivery, or `None` once the source is gone for good
    async fn next_delivery(&mut self) -> Option<Delivery>;
}

/// Outbound success event sink
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &SuccessEvent, routing_key: &str) -> Result<(), PublishError>;
}
