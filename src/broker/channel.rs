//! Channel operations the consumer and publisher depend on

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::BrokerError;
use super::consumer::TopicConfig;
use super::publisher::ExchangeConfig;
use crate::messaging::{Delivery, PublishError};

/// Deliveries of one consumer; an `Err` item or the end of the stream
/// means the channel is gone
pub type DeliveryStream = BoxStream<'static, Result<Delivery, BrokerError>>;

#[async_trait]
pub trait BrokerChannel: Clone + Send + Sync + 'static {
    /// Declare the queue, bind it and start a manual-ack consumer on it
    async fn consume(&self, topic: &TopicConfig) -> Result<DeliveryStream, BrokerError>;

    async fn declare_exchange(&self, exchange: &ExchangeConfig) -> Result<(), BrokerError>;

    /// Publish a JSON payload and wait for the broker to take it
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), PublishError>;
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use futures::StreamExt;
    use futures::channel::mpsc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct State {
        consumes: Mutex<Vec<TopicConfig>>,
        declares: Mutex<Vec<ExchangeConfig>>,
        published: Mutex<Vec<(String, String, Vec<u8>)>>,
        feeds: Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>,
        queued: Mutex<HashMap<String, Vec<Delivery>>>,
        fail_declares: AtomicBool,
    }

    /// In-memory channel recording every topology call
    #[derive(Clone, Default)]
    pub(crate) struct FakeChannel {
        state: Arc<State>,
    }

    impl FakeChannel {
        pub(crate) fn failing_declares() -> Self {
            let channel = Self::default();
            channel.state.fail_declares.store(true, Ordering::SeqCst);
            channel
        }

        /// Hand `delivery` to the live consumer of `queue`, or to the next
        /// one started on it
        pub(crate) fn push(&self, queue: &str, delivery: Delivery) {
            let mut feeds = self.state.feeds.lock().unwrap();
            match feeds.get(queue) {
                Some(tx) if !tx.is_closed() => {
                    let _ = tx.unbounded_send(delivery);
                }
                _ => {
                    feeds.remove(queue);
                    let mut queued = self.state.queued.lock().unwrap();
                    queued.entry(queue.to_string()).or_default().push(delivery);
                }
            }
        }

        /// End every live consumer stream as a dropped channel would
        pub(crate) fn end_streams(&self) {
            self.state.feeds.lock().unwrap().clear();
        }

        pub(crate) fn consumes(&self) -> Vec<TopicConfig> {
            self.state.consumes.lock().unwrap().clone()
        }

        pub(crate) fn declares(&self) -> Vec<ExchangeConfig> {
            self.state.declares.lock().unwrap().clone()
        }

        pub(crate) fn published(&self) -> Vec<(String, String, Vec<u8>)> {
            self.state.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrokerChannel for FakeChannel {
        async fn consume(&self, topic: &TopicConfig) -> Result<DeliveryStream, BrokerError> {
            self.state.consumes.lock().unwrap().push(topic.clone());

            let (tx, rx) = mpsc::unbounded();
            let pending = self.state.queued.lock().unwrap().remove(&topic.queue);
            for delivery in pending.unwrap_or_default() {
                let _ = tx.unbounded_send(delivery);
            }
            self.state.feeds.lock().unwrap().insert(topic.queue.clone(), tx);

            Ok(rx.map(Ok).boxed())
        }

        async fn declare_exchange(&self, exchange: &ExchangeConfig) -> Result<(), BrokerError> {
            if self.state.fail_declares.load(Ordering::SeqCst) {
                return Err(BrokerError::ExchangeDeclare {
                    exchange: exchange.name.clone(),
                    reason: "access refused".to_string(),
                });
            }
            self.state.declares.lock().unwrap().push(exchange.clone());
            Ok(())
        }

        async fn publish(
            &self,
            exchange: &str,
            routing_key: &str,
            payload: &[u8],
        ) -> Result<(), PublishError> {
            self.state.published.lock().unwrap().push((
                exchange.to_string(),
                routing_key.to_string(),
                payload.to_vec(),
            ));
            Ok(())
        }
    }
}
