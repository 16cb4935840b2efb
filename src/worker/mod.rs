//! Download worker
//!
//! One loop per consumed topic drains its [`DeliverySource`] strictly in
//! order and settles every delivery through [`runner`].

pub mod runner;

pub use runner::{Failure, Outcome};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::backends::Dispatcher;
use crate::messaging::{Delivery, DeliverySource, EventPublisher};
use crate::observability::Metrics;

/// Shared per-process processing context
pub struct Worker {
    dispatcher: Dispatcher,
    publisher: Arc<dyn EventPublisher>,
    routing_key: String,
    metrics: Arc<Metrics>,
}

impl Worker {
    pub fn new(
        dispatcher: Dispatcher,
        publisher: Arc<dyn EventPublisher>,
        routing_key: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            dispatcher,
            publisher,
            routing_key: routing_key.into(),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Process one delivery inside its own span
    pub async fn process(&self, delivery: Delivery, topic: &str) -> Outcome {
        let span = info_span!(
            "delivery",
            topic,
            delivery_tag = delivery.delivery_tag(),
            trace_id = %Uuid::now_v7()
        );
        runner::process_delivery(self, delivery, topic)
            .instrument(span)
            .await
    }

    /// Drain `source` until it ends
    pub async fn run<S>(&self, mut source: S, topic: &str)
    where
        S: DeliverySource,
    {
        info!(topic, "Worker loop started");
        while let Some(delivery) = source.next_delivery().await {
            self.process(delivery, topic).await;
        }
        info!(topic, "Delivery stream ended, worker loop exiting");
    }

    pub fn spawn<S>(self: &Arc<Self>, source: S, topic: impl Into<String>) -> JoinHandle<()>
    where
        S: DeliverySource + 'static,
    {
        let worker = Arc::clone(self);
        let topic = topic.into();
        tokio::spawn(async move { worker.run(source, &topic).await })
    }
}
