// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Producer
//!
//! Publishes a single message on the topology of the selected pattern. The
//! resources are declared first, then the body is published once and the call
//! returns; no publisher confirmation is awaited.

use crate::{
    errors::AmqpError,
    otel,
    session::{BrokerSession, Publishing},
    settings::Config,
    topology::{self, ResourceNames},
};
use tracing::{error, info};

/// Producer role bound to an open broker session.
pub struct Producer<'s> {
    session: &'s dyn BrokerSession,
    names: ResourceNames,
}

impl<'s> Producer<'s> {
    /// Creates a producer publishing with the exchange and queue names of
    /// `config`.
    pub fn new(session: &'s dyn BrokerSession, config: &Config) -> Producer<'s> {
        Producer {
            session,
            names: ResourceNames::from(config),
        }
    }

    /// Declares the pattern's resources and publishes `message` once.
    ///
    /// Declaration and publish failures are returned as they are reported by
    /// the session.
    pub async fn send(&self, pattern: &str, message: &str) -> Result<(), AmqpError> {
        let entry = topology::lookup(pattern);

        entry
            .producer_topology(self.session, &self.names)
            .install()
            .await?;

        let publishing = Publishing {
            exchange: entry.exchange_name(&self.names),
            routing_key: entry.routing_key(&self.names),
            persistent: entry.persistent,
            headers: otel::inject_current_context(),
            body: message.as_bytes().to_vec(),
        };

        if let Err(err) = self.session.publish(&publishing).await {
            error!(
                error = err.to_string(),
                pattern = entry.pattern.as_str(),
                "error publishing message"
            );
            return Err(err);
        }

        info!(
            pattern = entry.pattern.as_str(),
            exchange = publishing.exchange.as_str(),
            routing_key = publishing.routing_key.as_str(),
            "message sent"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exchange::ExchangeKind,
        session::MockBrokerSession,
        settings::{Mode, Overrides},
    };

    fn producer_config(pattern: &str, message: &str) -> Config {
        let mut config = Config::default();
        config.merge(&Overrides {
            mode: "producer".to_owned(),
            pattern: pattern.to_owned(),
            message: message.to_owned(),
            ..Default::default()
        });
        config
    }

    #[tokio::test]
    async fn pubsub_declares_fanout_and_publishes_with_empty_key() {
        let config = producer_config("pub", "hi");
        assert_eq!(config.mode, Mode::Producer);

        let mut session = MockBrokerSession::new();
        session
            .expect_declare_exchange()
            .withf(|def| {
                def.name() == "logs"
                    && def.exchange_kind() == ExchangeKind::Fanout
                    && def.is_durable()
            })
            .times(1)
            .returning(|_| Ok(()));
        session.expect_declare_queue().never();
        session
            .expect_publish()
            .withf(|p| p.exchange == "logs" && p.routing_key.is_empty() && p.body == b"hi")
            .times(1)
            .returning(|_| Ok(()));

        let producer = Producer::new(&session, &config);
        producer.send(&config.pattern, &config.message).await.unwrap();
    }

    #[tokio::test]
    async fn work_publishes_persistent_message_to_queue() {
        let config = producer_config("w", "task");

        let mut session = MockBrokerSession::new();
        session.expect_declare_exchange().never();
        session
            .expect_declare_queue()
            .withf(|def| def.name() == "work_queue" && def.is_durable())
            .times(1)
            .returning(|def| Ok(def.name().to_owned()));
        session
            .expect_publish()
            .withf(|p| p.exchange.is_empty() && p.routing_key == "work_queue" && p.persistent)
            .times(1)
            .returning(|_| Ok(()));

        Producer::new(&session, &config)
            .send(&config.pattern, &config.message)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn routing_uses_exchange_override() {
        let mut config = producer_config("routing", "boom");
        config.exchange = "alerts".to_owned();

        let mut session = MockBrokerSession::new();
        session
            .expect_declare_exchange()
            .withf(|def| def.name() == "alerts" && def.exchange_kind() == ExchangeKind::Direct)
            .returning(|_| Ok(()));
        session
            .expect_publish()
            .withf(|p| p.exchange == "alerts" && p.routing_key == "error" && !p.persistent)
            .times(1)
            .returning(|_| Ok(()));

        Producer::new(&session, &config)
            .send(&config.pattern, &config.message)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_pattern_sends_on_simplest_queue() {
        let config = producer_config("bogus", "hello");

        let mut session = MockBrokerSession::new();
        session
            .expect_declare_queue()
            .withf(|def| def.name() == "simple_queue" && !def.is_durable())
            .returning(|def| Ok(def.name().to_owned()));
        session
            .expect_publish()
            .withf(|p| p.routing_key == "simple_queue")
            .times(1)
            .returning(|_| Ok(()));

        Producer::new(&session, &config)
            .send(&config.pattern, &config.message)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn declare_failure_aborts_before_publishing() {
        let config = producer_config("topics", "x");

        let mut session = MockBrokerSession::new();
        session
            .expect_declare_exchange()
            .returning(|def| Err(AmqpError::DeclareExchangeError(def.name().to_owned())));
        session.expect_publish().never();

        let result = Producer::new(&session, &config)
            .send(&config.pattern, &config.message)
            .await;

        assert_eq!(
            result,
            Err(AmqpError::DeclareExchangeError("topic_logs".to_owned()))
        );
    }

    #[tokio::test]
    async fn publish_failure_is_returned() {
        let config = producer_config("simplest", "x");

        let mut session = MockBrokerSession::new();
        session
            .expect_declare_queue()
            .returning(|def| Ok(def.name().to_owned()));
        session
            .expect_publish()
            .returning(|_| Err(AmqpError::PublishingError));

        let result = Producer::new(&session, &config)
            .send(&config.pattern, &config.message)
            .await;

        assert_eq!(result, Err(AmqpError::PublishingError));
    }
}
