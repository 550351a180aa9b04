// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types
//!
//! Two error families are used across the crate. `AmqpError` covers every
//! failure reported by the broker while connecting, declaring, publishing or
//! consuming. `ConfigError` covers the settings resolution that happens before
//! any connection is opened. Neither is ever retried: every error ends the run.

use std::{io, path::PathBuf};
use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Each variant names the operation that failed so the binary can log it with
/// context before exiting.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding an exchange to a queue
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error declaring a consumer
    #[error("consumer declaration error")]
    ConsumerDeclarationError,

    /// Error consuming a message
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error closing the channel or the connection
    #[error("failure to close the session")]
    CloseError,
}

/// Errors raised while resolving the run configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The mode is neither `producer` nor `consumer` after normalization
    #[error("invalid mode `{0}`, expected producer or consumer")]
    InvalidMode(String),

    /// Producer mode was selected without a message body
    #[error("producer mode requires a message")]
    MissingMessage,

    /// The config file exists but could not be read
    #[error("failure to read config file `{path}`")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
