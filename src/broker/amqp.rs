//! lapin-backed transport

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use super::BrokerError;
use super::channel::{BrokerChannel, DeliveryStream};
use super::connection::{Closure, ConnectionError, Connector, Transport};
use super::consumer::TopicConfig;
use super::publisher::ExchangeConfig;
use crate::config::{BrokerConfig, ExchangeType, WorkerConfig};
use crate::messaging::{AckError, Acknowledger, Delivery, PublishError};

const REPLY_SUCCESS: u16 = 200;
const CONTENT_TYPE_JSON: &str = "application/json";

/// Dials `amqp://` URIs and opens one channel per connection
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    uri: String,
    prefetch: u16,
}

impl AmqpConnector {
    pub fn new(uri: impl Into<String>, prefetch: u16) -> Self {
        Self {
            uri: uri.into(),
            prefetch,
        }
    }

    pub fn from_config(broker: &BrokerConfig, worker: &WorkerConfig) -> Self {
        // validated to fit in u16
        let prefetch = u16::try_from(worker.number_of_workers).unwrap_or(u16::MAX);
        Self::new(broker.amqp_uri(), prefetch)
    }
}

#[async_trait]
impl Connector for AmqpConnector {
    type Transport = AmqpTransport;

    async fn connect(&self) -> Result<AmqpTransport, ConnectionError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .map_err(|e| ConnectionError::Dial(e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ConnectionError::Channel(e.to_string()))?;

        channel
            .basic_qos(self.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| ConnectionError::Channel(e.to_string()))?;

        let (closed_tx, _) = watch::channel(None);
        let closed_tx = Arc::new(closed_tx);

        let notifier = closed_tx.clone();
        connection.on_error(move |err| {
            // First report wins; a requested close is never overwritten
            notifier.send_if_modified(|closure| {
                if closure.is_none() {
                    *closure = Some(Closure::Unexpected(err.to_string()));
                    true
                } else {
                    false
                }
            });
        });

        debug!(prefetch = self.prefetch, "AMQP channel opened");

        Ok(AmqpTransport {
            connection,
            channel,
            closed_tx,
        })
    }
}

pub struct AmqpTransport {
    connection: Connection,
    channel: Channel,
    closed_tx: Arc<watch::Sender<Option<Closure>>>,
}

#[async_trait]
impl Transport for AmqpTransport {
    type Channel = Channel;

    fn channel(&self) -> Channel {
        self.channel.clone()
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    async fn closed(&self) -> Closure {
        let mut rx = self.closed_tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(closure) = current {
                return closure;
            }
            if rx.changed().await.is_err() {
                return Closure::Requested;
            }
        }
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.closed_tx.send_replace(Some(Closure::Requested));

        if !self.connection.status().connected() {
            return Ok(());
        }

        self.connection
            .close(REPLY_SUCCESS, "worker shutdown")
            .await
            .map_err(|e| ConnectionError::Close(e.to_string()))
    }
}

/// Settles a lapin delivery on the channel it arrived on
struct AmqpAcker {
    delivery: lapin::message::Delivery,
}

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self, _delivery_tag: u64) -> Result<(), AckError> {
        self.delivery
            .acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| AckError::Ack(e.to_string()))
    }

    async fn reject(&self, _delivery_tag: u64) -> Result<(), AckError> {
        self.delivery
            .acker
            .reject(BasicRejectOptions { requeue: false })
            .await
            .map_err(|e| AckError::Reject(e.to_string()))
    }
}

#[async_trait]
impl BrokerChannel for Channel {
    async fn consume(&self, topic: &TopicConfig) -> Result<DeliveryStream, BrokerError> {
        self.queue_declare(
            &topic.queue,
            QueueDeclareOptions {
                durable: topic.durable,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::QueueDeclare {
            queue: topic.queue.clone(),
            reason: e.to_string(),
        })?;

        self.queue_bind(
            &topic.queue,
            &topic.exchange,
            &topic.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::QueueBind {
            queue: topic.queue.clone(),
            exchange: topic.exchange.clone(),
            reason: e.to_string(),
        })?;

        // no_ack = false, exclusive = false; the queue name doubles as consumer tag
        let consumer = self
            .basic_consume(
                &topic.queue,
                &topic.queue,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume {
                queue: topic.queue.clone(),
                reason: e.to_string(),
            })?;

        let queue = topic.queue.clone();
        Ok(consumer
            .map(move |item| {
                item.map(into_delivery).map_err(|e| BrokerError::Consume {
                    queue: queue.clone(),
                    reason: e.to_string(),
                })
            })
            .boxed())
    }

    async fn declare_exchange(&self, exchange: &ExchangeConfig) -> Result<(), BrokerError> {
        self.exchange_declare(
            &exchange.name,
            exchange_kind(exchange.kind),
            ExchangeDeclareOptions {
                durable: exchange.durable,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::ExchangeDeclare {
            exchange: exchange.name.clone(),
            reason: e.to_string(),
        })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        self.basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            payload,
            BasicProperties::default().with_content_type(CONTENT_TYPE_JSON.into()),
        )
        .await
        .map_err(|e| PublishError::Transport(e.to_string()))?
        .await
        .map_err(|e| PublishError::Transport(e.to_string()))?;

        Ok(())
    }
}

fn exchange_kind(kind: ExchangeType) -> ExchangeKind {
    match kind {
        ExchangeType::Direct => ExchangeKind::Direct,
        ExchangeType::Topic => ExchangeKind::Topic,
        ExchangeType::Fanout => ExchangeKind::Fanout,
        ExchangeType::Headers => ExchangeKind::Headers,
    }
}

/// Detach the body and wrap the rest as the acknowledger
fn into_delivery(mut delivery: lapin::message::Delivery) -> Delivery {
    let delivery_tag = delivery.delivery_tag;
    let body = std::mem::take(&mut delivery.data);
    Delivery::new(delivery_tag, body, Box::new(AmqpAcker { delivery }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_kind_mapping() {
        assert!(matches!(exchange_kind(ExchangeType::Topic), ExchangeKind::Topic));
        assert!(matches!(exchange_kind(ExchangeType::Direct), ExchangeKind::Direct));
        assert!(matches!(exchange_kind(ExchangeType::Fanout), ExchangeKind::Fanout));
        assert!(matches!(exchange_kind(ExchangeType::Headers), ExchangeKind::Headers));
    }

    #[test]
    fn test_prefetch_follows_worker_count() {
        let worker = WorkerConfig {
            number_of_workers: 8,
        };
        let connector = AmqpConnector::from_config(&BrokerConfig::default(), &worker);
        assert_eq!(connector.prefetch, 8);
    }
}
