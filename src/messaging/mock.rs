//! In-memory messaging doubles for development and tests

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use super::{AckError, Acknowledger, Delivery, DeliverySource, EventPublisher, PublishError};
use crate::messages::SuccessEvent;

/// How a delivery was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked(u64),
    Rejected(u64),
}

/// Records every ack/reject it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingAcker {
    settlements: Arc<Mutex<Vec<Settlement>>>,
}

impl RecordingAcker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn settlements(&self) -> Vec<Settlement> {
        self.settlements.lock().await.clone()
    }

    pub async fn acked(&self) -> usize {
        self.settlements
            .lock()
            .await
            .iter()
            .filter(|s| matches!(s, Settlement::Acked(_)))
            .count()
    }

    pub async fn rejected(&self) -> usize {
        self.settlements
            .lock()
            .await
            .iter()
            .filter(|s| matches!(s, Settlement::Rejected(_)))
            .count()
    }
}

#[async_trait]
impl Acknowledger for RecordingAcker {
    async fn ack(&self, delivery_tag: u64) -> Result<(), AckError> {
        self.settlements.lock().await.push(Settlement::Acked(delivery_tag));
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64) -> Result<(), AckError> {
        self.settlements
            .lock()
            .await
            .push(Settlement::Rejected(delivery_tag));
        Ok(())
    }
}

/// Delivery source fed through an mpsc channel
pub struct ChannelSource {
    rx: mpsc::Receiver<Delivery>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<Delivery>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl DeliverySource for ChannelSource {
    async fn next_delivery(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// Publisher that keeps events in memory
#[derive(Debug, Clone, Default)]
pub struct MockPublisher {
    published: Arc<Mutex<Vec<(String, SuccessEvent)>>>,
    fail: bool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher whose every publish fails with a transport error
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn published(&self) -> Vec<(String, SuccessEvent)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for MockPublisher {
    async fn publish(&self, event: &SuccessEvent, routing_key: &str) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Transport("mock publisher unavailable".to_string()));
        }
        tracing::info!(routing_key, links = event.links.len(), "Mock publish");
        self.published
            .lock()
            .await
            .push((routing_key.to_string(), event.clone()));
        Ok(())
    }
}
