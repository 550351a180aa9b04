// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Session
//!
//! The producer and consumer drivers talk to the broker through the
//! `BrokerSession` trait: declare, bind, publish, subscribe, acknowledge and
//! close. `AmqpSession` is the lapin implementation holding one connection and
//! one channel, owned by the driver for the lifetime of the run.

use crate::{
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::{collections::BTreeMap, fmt::Display, future::Future};
use tracing::{debug, error};
use uuid::Uuid;

/// Content type set on every published message
pub const TEXT_CONTENT_TYPE: &str = "text/plain";
/// AMQP delivery mode for messages that survive a broker restart
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;
/// Reply code sent when closing the channel and the connection
pub const REPLY_SUCCESS: u16 = 200;

/// AMQP header table carried by publishings and deliveries.
pub type Headers = BTreeMap<ShortString, AMQPValue>;

/// Infinite, non-restartable feed of deliveries for one subscription.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, AmqpError>>;

/// A message handed to a consumer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Delivery {
    /// Body decoded as UTF-8, invalid sequences replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A single message to publish.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Publishing {
    pub exchange: String,
    pub routing_key: String,
    pub persistent: bool,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Capabilities the drivers need from an open broker session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Declares an exchange. Declaring an existing exchange with the same
    /// properties is a no-op on the broker.
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    /// Declares a queue and returns its name, generated by the broker when the
    /// definition has an empty name.
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<String, AmqpError>;

    async fn bind(&self, binding: &QueueBinding) -> Result<(), AmqpError>;

    async fn publish(&self, publishing: &Publishing) -> Result<(), AmqpError>;

    /// Limits the number of unacknowledged deliveries held by this consumer.
    async fn set_prefetch(&self, count: u16) -> Result<(), AmqpError>;

    async fn subscribe(&self, queue: &str, auto_ack: bool) -> Result<DeliveryStream, AmqpError>;

    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), AmqpError>;

    async fn close(&self) -> Result<(), AmqpError>;
}

/// lapin-backed session: one connection and one channel.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
}

impl AmqpSession {
    /// Connects to `uri` and opens a channel on the new connection.
    ///
    /// `connection_name` is reported to the broker as the connection name.
    pub async fn connect(uri: &str, connection_name: &str) -> Result<AmqpSession, AmqpError> {
        debug!("creating amqp connection...");
        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(connection_name.to_owned()));

        let connection = match Connection::connect(uri, options).await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError)
            }
        }?;
        debug!("amqp connected");

        debug!("creating amqp channel...");
        match connection.create_channel().await {
            Ok(channel) => {
                debug!("channel created");
                Ok(AmqpSession {
                    connection,
                    channel,
                })
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                if let Err(err) = connection.close(REPLY_SUCCESS, "OK").await {
                    error!(error = err.to_string(), "error to close the connection");
                }
                Err(AmqpError::ChannelError)
            }
        }
    }
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        self.channel
            .exchange_declare(
                &def.name,
                def.kind.into(),
                ExchangeDeclareOptions {
                    passive: def.passive,
                    durable: def.durable,
                    auto_delete: def.delete,
                    internal: def.internal,
                    nowait: def.no_wait,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    name = def.name.as_str(),
                    "error to declare the exchange"
                );
                AmqpError::DeclareExchangeError(def.name.clone())
            })
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<String, AmqpError> {
        match self
            .channel
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    passive: def.passive,
                    durable: def.durable,
                    exclusive: def.exclusive,
                    auto_delete: def.delete,
                    nowait: def.no_wait,
                },
                FieldTable::default(),
            )
            .await
        {
            Ok(queue) => Ok(queue.name().to_string()),
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name.as_str(),
                    "error to declare the queue"
                );
                Err(AmqpError::DeclareQueueError(def.name.clone()))
            }
        }
    }

    async fn bind(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        self.channel
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to bind queue to exchange");
                AmqpError::BindingExchangeToQueueError(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                )
            })
    }

    async fn publish(&self, publishing: &Publishing) -> Result<(), AmqpError> {
        let mut properties = BasicProperties::default()
            .with_content_type(ShortString::from(TEXT_CONTENT_TYPE))
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_headers(FieldTable::from(publishing.headers.clone()));

        if publishing.persistent {
            properties = properties.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
        }

        match self
            .channel
            .basic_publish(
                &publishing.exchange,
                &publishing.routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &publishing.body,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            _ => Ok(()),
        }
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), AmqpError> {
        self.channel
            .basic_qos(count, BasicQosOptions { global: false })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to configure qos");
                AmqpError::QoSDeclarationError(err.to_string())
            })
    }

    async fn subscribe(&self, queue: &str, auto_ack: bool) -> Result<DeliveryStream, AmqpError> {
        let consumer_tag = format!("amqp-patterns-{}", Uuid::new_v4());

        let consumer = match self
            .channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: auto_ack,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::ConsumerDeclarationError)
            }
            Ok(c) => Ok(c),
        }?;

        debug!(queue, consumer_tag, "consumer created");

        Ok(consumer
            .map(|result| {
                result
                    .map(into_delivery)
                    .map_err(|err| AmqpError::ConsumerError(err.to_string()))
            })
            .boxed())
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), AmqpError> {
        self.channel
            .basic_ack(delivery.delivery_tag, BasicAckOptions { multiple: false })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling ack msg");
                AmqpError::AckMessageError
            })
    }

    async fn close(&self) -> Result<(), AmqpError> {
        debug!("closing amqp session...");

        close_in_order(
            self.channel.close(REPLY_SUCCESS, "OK"),
            self.connection.close(REPLY_SUCCESS, "OK"),
        )
        .await
    }
}

/// Awaits the channel close, then the connection close regardless of the
/// first outcome. Each failure is logged and the first one is returned.
async fn close_in_order<C, K, E>(channel: C, connection: K) -> Result<(), AmqpError>
where
    C: Future<Output = Result<(), E>>,
    K: Future<Output = Result<(), E>>,
    E: Display,
{
    let channel_closed = channel.await.map_err(|err| {
        error!(error = err.to_string(), "error to close the channel");
        AmqpError::CloseError
    });

    let connection_closed = connection.await.map_err(|err| {
        error!(error = err.to_string(), "error to close the connection");
        AmqpError::CloseError
    });

    channel_closed.and(connection_closed)?;
    debug!("amqp session closed");
    Ok(())
}

fn into_delivery(delivery: lapin::message::Delivery) -> Delivery {
    let headers = delivery
        .properties
        .headers()
        .as_ref()
        .map(|table| table.inner().clone())
        .unwrap_or_default();

    Delivery {
        delivery_tag: delivery.delivery_tag,
        exchange: delivery.exchange.to_string(),
        routing_key: delivery.routing_key.to_string(),
        headers,
        body: delivery.data,
    }
}
