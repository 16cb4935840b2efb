//! Per-topic queue subscription

use async_trait::async_trait;
use futures::StreamExt;
use lapin::Channel;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::BrokerError;
use super::channel::{BrokerChannel, DeliveryStream};
use super::connection::ChannelHandle;
use crate::messaging::{Delivery, DeliverySource};

/// Queue binding for one topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub name: String,
    pub queue: String,
    pub exchange: String,
    pub durable: bool,
    pub routing_key: String,
}

/// Manual-ack consumer that follows channel replacements.
///
/// When its stream ends it waits for the connection manager to publish a
/// newer channel generation, then declares, binds and consumes again.
pub struct AmqpConsumer<Ch: BrokerChannel = Channel> {
    topic: TopicConfig,
    channels: watch::Receiver<ChannelHandle<Ch>>,
    generation: u64,
    stream: Option<DeliveryStream>,
}

impl<Ch: BrokerChannel> AmqpConsumer<Ch> {
    /// Declare, bind and start consuming on the current channel
    pub async fn subscribe(
        mut channels: watch::Receiver<ChannelHandle<Ch>>,
        topic: TopicConfig,
    ) -> Result<Self, BrokerError> {
        let handle = channels.borrow_and_update().clone();
        let stream = handle.channel.consume(&topic).await?;

        info!(
            topic = %topic.name,
            queue = %topic.queue,
            routing_key = %topic.routing_key,
            generation = handle.generation,
            "Consumer subscribed"
        );

        Ok(Self {
            topic,
            channels,
            generation: handle.generation,
            stream: Some(stream),
        })
    }

    /// Wait for a channel newer than the one we are bound to
    async fn next_channel(&mut self) -> Option<ChannelHandle<Ch>> {
        loop {
            let current = self.channels.borrow_and_update().clone();
            if current.generation > self.generation {
                return Some(current);
            }
            if self.channels.changed().await.is_err() {
                return None;
            }
        }
    }
}

#[async_trait]
impl<Ch: BrokerChannel> DeliverySource for AmqpConsumer<Ch> {
    async fn next_delivery(&mut self) -> Option<Delivery> {
        loop {
            if let Some(stream) = self.stream.as_mut() {
                match stream.next().await {
                    Some(Ok(delivery)) => return Some(delivery),
                    Some(Err(e)) => {
                        warn!(topic = %self.topic.name, error = %e, "Consumer stream failed")
                    }
                    None => warn!(topic = %self.topic.name, "Consumer stream ended"),
                }
                self.stream = None;
            }

            // connection manager dropped: nothing will ever arrive again
            let handle = self.next_channel().await?;

            match handle.channel.consume(&self.topic).await {
                Ok(stream) => {
                    info!(
                        topic = %self.topic.name,
                        generation = handle.generation,
                        "Consumer re-declared on new channel"
                    );
                    self.stream = Some(stream);
                }
                Err(e) => {
                    error!(
                        topic = %self.topic.name,
                        generation = handle.generation,
                        error = %e,
                        "Consumer re-declare failed, waiting for next channel"
                    );
                }
            }
            self.generation = handle.generation;
        }
    }
}
