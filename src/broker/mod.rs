//! RabbitMQ plumbing
//!
//! [`ConnectionManager`] owns the AMQP connection and hands out versioned
//! channel handles. [`AmqpConsumer`] and [`AmqpPublisher`] watch those
//! handles and re-declare their topology whenever the manager reconnects.
//! They only talk to the channel through [`BrokerChannel`].

mod amqp;
pub(crate) mod channel;
mod connection;
mod consumer;
mod publisher;

pub use amqp::{AmqpConnector, AmqpTransport};
pub use channel::{BrokerChannel, DeliveryStream};
pub use connection::{
    ChannelHandle, ChannelOf, Closure, ConnectionError, ConnectionManager, ConnectionState,
    Connector, Transport,
};
pub use consumer::{AmqpConsumer, TopicConfig};
pub use publisher::{AmqpPublisher, ExchangeConfig};

use thiserror::Error;

/// Manager specialised to the lapin transport
pub type AmqpConnectionManager = ConnectionManager<AmqpConnector>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("failed to declare exchange '{exchange}': {reason}")]
    ExchangeDeclare { exchange: String, reason: String },

    #[error("failed to declare queue '{queue}': {reason}")]
    QueueDeclare { queue: String, reason: String },

    #[error("failed to bind queue '{queue}' to exchange '{exchange}': {reason}")]
    QueueBind {
        queue: String,
        exchange: String,
        reason: String,
    },

    #[error("failed to consume from queue '{queue}': {reason}")]
    Consume { queue: String, reason: String },
}
