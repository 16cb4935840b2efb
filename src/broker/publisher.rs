//! Success event publisher

use async_trait::async_trait;
use lapin::Channel;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use super::BrokerError;
use super::channel::BrokerChannel;
use super::connection::ChannelHandle;
use crate::config::ExchangeType;
use crate::messages::SuccessEvent;
use crate::messaging::{EventPublisher, PublishError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    pub name: String,
    pub kind: ExchangeType,
    pub durable: bool,
}

/// Publishes JSON to one exchange.
///
/// Remembers the channel generation its exchange was declared on and
/// declares again before the first publish on a newer channel.
pub struct AmqpPublisher<Ch: BrokerChannel = Channel> {
    exchange: ExchangeConfig,
    channels: watch::Receiver<ChannelHandle<Ch>>,
    declared_generation: Mutex<u64>,
}

impl<Ch: BrokerChannel> AmqpPublisher<Ch> {
    /// Declare the exchange on the current channel
    pub async fn declare(
        channels: watch::Receiver<ChannelHandle<Ch>>,
        exchange: ExchangeConfig,
    ) -> Result<Self, BrokerError> {
        let handle = channels.borrow().clone();
        handle.channel.declare_exchange(&exchange).await?;

        info!(
            exchange = %exchange.name,
            kind = ?exchange.kind,
            generation = handle.generation,
            "Publisher exchange declared"
        );

        Ok(Self {
            exchange,
            channels,
            declared_generation: Mutex::new(handle.generation),
        })
    }

    /// Serialize `payload` and publish it non-mandatory, non-immediate
    pub async fn publish_json<T>(&self, payload: &T, routing_key: &str) -> Result<(), PublishError>
    where
        T: Serialize + Sync,
    {
        let body = serde_json::to_vec(payload)?;
        let handle = self.channels.borrow().clone();

        {
            let mut declared = self.declared_generation.lock().await;
            if *declared != handle.generation {
                handle
                    .channel
                    .declare_exchange(&self.exchange)
                    .await
                    .map_err(|e| PublishError::Transport(e.to_string()))?;
                *declared = handle.generation;
                info!(
                    exchange = %self.exchange.name,
                    generation = handle.generation,
                    "Publisher exchange re-declared on new channel"
                );
            }
        }

        handle
            .channel
            .publish(&self.exchange.name, routing_key, &body)
            .await?;

        debug!(exchange = %self.exchange.name, routing_key, size = body.len(), "Published");
        Ok(())
    }
}

#[async_trait]
impl<Ch: BrokerChannel> EventPublisher for AmqpPublisher<Ch> {
    async fn publish(&self, event: &SuccessEvent, routing_key: &str) -> Result<(), PublishError> {
        self.publish_json(event, routing_key).await
    }
}
