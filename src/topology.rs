// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Catalog
//!
//! This module holds the five canonical topologies and the installer that
//! declares them against a broker session.
//!
//! The main components are:
//! - `TopologyEntry`: the immutable resource plan of one pattern
//! - `lookup`: pattern name to entry, falling back to `simplest`
//! - `AmqpTopology`: declares exchange, queue and binding in that order
//!
//! Producer and consumer build their declarations from the same entry, so
//! whichever side starts first creates resources the other side accepts.

use crate::{
    errors::AmqpError,
    exchange::{ExchangeDefinition, ExchangeKind},
    queue::{QueueBinding, QueueDefinition},
    session::BrokerSession,
    settings::{Config, Pattern},
};
use tracing::{debug, error, warn};

/// Prefetch count applied to manually acknowledged consumers
pub const MANUAL_ACK_PREFETCH: u16 = 1;

/// How a consumer acknowledges deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Delivery is complete as soon as the broker sends it
    Auto,
    /// Each delivery is acknowledged after it was handled
    Manual { prefetch: u16 },
}

impl AckMode {
    /// Returns `true` when the broker completes deliveries without an ack.
    pub fn is_auto(&self) -> bool {
        matches!(self, AckMode::Auto)
    }
}

/// Exchange declared by an exchange-bearing pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeTemplate {
    pub default_name: &'static str,
    pub kind: ExchangeKind,
    pub durable: bool,
}

/// Queue used by a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTemplate {
    /// Fixed name, declared by both producer and consumer
    Named {
        default_name: &'static str,
        durable: bool,
    },
    /// Name generated by the broker, declared by the consumer only
    ServerNamed { exclusive: bool },
}

/// Routing key the producer publishes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishKey {
    /// The queue name, through the default exchange
    QueueName,
    Fixed(&'static str),
}

/// Resource plan of one pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyEntry {
    pub pattern: Pattern,
    pub exchange: Option<ExchangeTemplate>,
    pub queue: QueueTemplate,
    pub binding_key: Option<&'static str>,
    pub publish_key: PublishKey,
    pub ack: AckMode,
    pub persistent: bool,
}

static SIMPLEST: TopologyEntry = TopologyEntry {
    pattern: Pattern::Simplest,
    exchange: None,
    queue: QueueTemplate::Named {
        default_name: "simple_queue",
        durable: false,
    },
    binding_key: None,
    publish_key: PublishKey::QueueName,
    ack: AckMode::Auto,
    persistent: false,
};

static WORK: TopologyEntry = TopologyEntry {
    pattern: Pattern::Work,
    exchange: None,
    queue: QueueTemplate::Named {
        default_name: "work_queue",
        durable: true,
    },
    binding_key: None,
    publish_key: PublishKey::QueueName,
    ack: AckMode::Manual {
        prefetch: MANUAL_ACK_PREFETCH,
    },
    persistent: true,
};

static ROUTING: TopologyEntry = TopologyEntry {
    pattern: Pattern::Routing,
    exchange: Some(ExchangeTemplate {
        default_name: "direct_logs",
        kind: ExchangeKind::Direct,
        durable: true,
    }),
    queue: QueueTemplate::ServerNamed { exclusive: true },
    binding_key: Some("error"),
    publish_key: PublishKey::Fixed("error"),
    ack: AckMode::Auto,
    persistent: false,
};

static TOPICS: TopologyEntry = TopologyEntry {
    pattern: Pattern::Topics,
    exchange: Some(ExchangeTemplate {
        default_name: "topic_logs",
        kind: ExchangeKind::Topic,
        durable: true,
    }),
    queue: QueueTemplate::ServerNamed { exclusive: true },
    binding_key: Some("*.error.*"),
    publish_key: PublishKey::Fixed("kern.critical"),
    ack: AckMode::Auto,
    persistent: false,
};

static PUBSUB: TopologyEntry = TopologyEntry {
    pattern: Pattern::PubSub,
    exchange: Some(ExchangeTemplate {
        default_name: "logs",
        kind: ExchangeKind::Fanout,
        durable: true,
    }),
    queue: QueueTemplate::ServerNamed { exclusive: true },
    binding_key: Some(""),
    publish_key: PublishKey::Fixed(""),
    ack: AckMode::Auto,
    persistent: false,
};

/// Entry of a known pattern.
pub fn entry(pattern: Pattern) -> &'static TopologyEntry {
    match pattern {
        Pattern::Work => &WORK,
        Pattern::Routing => &ROUTING,
        Pattern::Topics => &TOPICS,
        Pattern::PubSub => &PUBSUB,
        Pattern::Simplest => &SIMPLEST,
    }
}

/// Entry for a pattern name. Unrecognized names get the `simplest` entry.
pub fn lookup(name: &str) -> &'static TopologyEntry {
    entry(Pattern::from_name(name))
}

/// Exchange and queue names configured for the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceNames {
    pub exchange: Option<String>,
    pub queue: Option<String>,
}

impl From<&Config> for ResourceNames {
    fn from(config: &Config) -> Self {
        ResourceNames {
            exchange: config.exchange_override().map(str::to_owned),
            queue: config.queue_override().map(str::to_owned),
        }
    }
}

impl TopologyEntry {
    /// Exchange to declare, with the configured name when one is given.
    pub fn exchange_definition(&self, names: &ResourceNames) -> Option<ExchangeDefinition> {
        self.exchange.map(|template| {
            let name = names.exchange.as_deref().unwrap_or(template.default_name);
            let def = ExchangeDefinition::new(name).kind(template.kind);
            if template.durable {
                def.durable()
            } else {
                def
            }
        })
    }

    /// Queue to declare. Server-named queues ignore the configured queue name.
    pub fn queue_definition(&self, names: &ResourceNames) -> QueueDefinition {
        match self.queue {
            QueueTemplate::Named {
                default_name,
                durable,
            } => {
                let def = QueueDefinition::new(names.queue.as_deref().unwrap_or(default_name));
                if durable {
                    def.durable()
                } else {
                    def
                }
            }
            QueueTemplate::ServerNamed { exclusive } => {
                let def = QueueDefinition::server_named();
                if exclusive {
                    def.exclusive()
                } else {
                    def
                }
            }
        }
    }

    /// Exchange the producer publishes to; empty means the default exchange.
    pub fn exchange_name(&self, names: &ResourceNames) -> String {
        self.exchange_definition(names)
            .map(|def| def.name)
            .unwrap_or_default()
    }

    /// Routing key the producer publishes with.
    pub fn routing_key(&self, names: &ResourceNames) -> String {
        match self.publish_key {
            PublishKey::QueueName => self.queue_definition(names).name,
            PublishKey::Fixed(key) => key.to_owned(),
        }
    }

    /// Returns `true` when the pattern uses a fixed-name queue that the
    /// producer declares as well.
    pub fn has_named_queue(&self) -> bool {
        matches!(self.queue, QueueTemplate::Named { .. })
    }

    /// Declarations made before publishing: the exchange, or the named queue.
    pub fn producer_topology<'tp>(
        &self,
        session: &'tp dyn BrokerSession,
        names: &ResourceNames,
    ) -> AmqpTopology<'tp> {
        let mut topology = AmqpTopology::new(session);
        if let Some(def) = self.exchange_definition(names) {
            topology = topology.exchange(def);
        }
        if self.has_named_queue() {
            topology = topology.queue(self.queue_definition(names));
        }
        topology
    }

    /// Declarations made before consuming: exchange, queue and binding.
    pub fn consumer_topology<'tp>(
        &self,
        session: &'tp dyn BrokerSession,
        names: &ResourceNames,
    ) -> AmqpTopology<'tp> {
        let mut topology = AmqpTopology::new(session);
        if let Some(def) = self.exchange_definition(names) {
            topology = topology.exchange(def);
        }
        topology = topology.queue(self.queue_definition(names));
        if let Some(key) = self.binding_key {
            topology = topology.binding(key);
        }
        topology
    }
}

/// Declares one pattern's resources against a broker session.
pub struct AmqpTopology<'tp> {
    session: &'tp dyn BrokerSession,
    pub(crate) exchange: Option<ExchangeDefinition>,
    pub(crate) queue: Option<QueueDefinition>,
    pub(crate) binding_key: Option<String>,
}

impl<'tp> AmqpTopology<'tp> {
    /// Creates an empty topology declared through `session`.
    pub fn new(session: &'tp dyn BrokerSession) -> AmqpTopology<'tp> {
        AmqpTopology {
            session,
            exchange: None,
            queue: None,
            binding_key: None,
        }
    }

    /// Sets the exchange to declare first.
    pub fn exchange(mut self, def: ExchangeDefinition) -> Self {
        self.exchange = Some(def);
        self
    }

    /// Sets the queue to declare after the exchange.
    pub fn queue(mut self, def: QueueDefinition) -> Self {
        self.queue = Some(def);
        self
    }

    /// Binds the queue to the exchange with `key` once both are declared.
    pub fn binding(mut self, key: &str) -> Self {
        self.binding_key = Some(key.to_owned());
        self
    }

    /// Declares the exchange, then the queue, then the binding.
    ///
    /// Returns the declared queue name, which the broker generates for
    /// server-named queues, or `None` when no queue was part of the topology.
    pub async fn install(&self) -> Result<Option<String>, AmqpError> {
        self.install_exchange().await?;
        let queue_name = self.install_queue().await?;

        if let Some(queue_name) = &queue_name {
            self.binding_queue(queue_name).await?;
        }

        Ok(queue_name)
    }

    async fn install_exchange(&self) -> Result<(), AmqpError> {
        let Some(exch) = &self.exchange else {
            return Ok(());
        };

        debug!("creating exchange: {}", exch.name);
        self.session.declare_exchange(exch).await?;
        debug!("exchange: {} was created", exch.name);

        Ok(())
    }

    async fn install_queue(&self) -> Result<Option<String>, AmqpError> {
        let Some(def) = &self.queue else {
            return Ok(None);
        };

        debug!("creating queue: {}", def.name);
        match self.session.declare_queue(def).await {
            Ok(name) => {
                debug!("queue: {} was created", name);
                Ok(Some(name))
            }
            Err(err) => {
                error!(error = err.to_string(), "failure to install the queue");
                Err(err)
            }
        }
    }

    async fn binding_queue(&self, queue_name: &str) -> Result<(), AmqpError> {
        let Some(key) = &self.binding_key else {
            return Ok(());
        };

        let Some(exch) = &self.exchange else {
            warn!(queue = queue_name, "binding requested without an exchange, skipping");
            return Ok(());
        };

        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            queue_name, exch.name, key
        );

        let binding = QueueBinding::new(queue_name)
            .exchange(&exch.name)
            .routing_key(key);
        self.session.bind(&binding).await?;

        debug!("queue was bounded");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MockBrokerSession;
    use mockall::Sequence;

    fn no_overrides() -> ResourceNames {
        ResourceNames::default()
    }

    #[test]
    fn lookup_falls_back_to_simplest() {
        assert_eq!(lookup("bogus-pattern"), &SIMPLEST);
        assert_eq!(lookup("").pattern, Pattern::Simplest);
    }

    #[test]
    fn topics_entry_declares_durable_topic_exchange() {
        let entry = lookup("topics");
        let def = entry.exchange_definition(&no_overrides()).unwrap();

        assert_eq!(def.name(), "topic_logs");
        assert_eq!(def.exchange_kind(), ExchangeKind::Topic);
        assert!(def.is_durable());
        assert_eq!(entry.binding_key, Some("*.error.*"));
        assert!(entry.ack.is_auto());
    }

    #[test]
    fn topics_publishes_with_fixed_key() {
        let entry = lookup("topics");

        assert_eq!(entry.routing_key(&no_overrides()), "kern.critical");
        assert_eq!(entry.exchange_name(&no_overrides()), "topic_logs");
    }

    #[test]
    fn exchange_override_replaces_default_name() {
        let names = ResourceNames {
            exchange: Some("audit".to_owned()),
            queue: None,
        };
        let def = lookup("t").exchange_definition(&names).unwrap();
        assert_eq!(def.name(), "audit");
    }

    #[test]
    fn work_entry_is_durable_with_manual_ack() {
        let entry = lookup("work");
        let queue = entry.queue_definition(&no_overrides());

        assert_eq!(queue.name(), "work_queue");
        assert!(queue.is_durable());
        assert!(!queue.is_exclusive());
        assert_eq!(entry.ack, AckMode::Manual { prefetch: 1 });
        assert!(entry.persistent);
        assert!(entry.exchange.is_none());
    }

    #[test]
    fn queue_patterns_publish_through_default_exchange() {
        let names = ResourceNames {
            exchange: None,
            queue: Some("jobs".to_owned()),
        };
        let entry = lookup("simplest");

        assert_eq!(entry.exchange_name(&names), "");
        assert_eq!(entry.routing_key(&names), "jobs");
        assert_eq!(entry.routing_key(&no_overrides()), "simple_queue");
        assert!(!entry.queue_definition(&no_overrides()).is_durable());
    }

    #[test]
    fn exchange_patterns_use_server_named_exclusive_queues() {
        for name in ["routing", "topics", "pubsub"] {
            let names = ResourceNames {
                exchange: None,
                queue: Some("ignored".to_owned()),
            };
            let queue = lookup(name).queue_definition(&names);

            assert!(queue.is_server_named(), "pattern {}", name);
            assert!(queue.is_exclusive());
            assert!(!queue.is_durable());
        }
    }

    #[test]
    fn routing_and_pubsub_keys() {
        let routing = lookup("r");
        assert_eq!(routing.exchange_name(&no_overrides()), "direct_logs");
        assert_eq!(routing.binding_key, Some("error"));
        assert_eq!(routing.routing_key(&no_overrides()), "error");

        let pubsub = lookup("pub");
        let def = pubsub.exchange_definition(&no_overrides()).unwrap();
        assert_eq!(def.exchange_kind(), ExchangeKind::Fanout);
        assert_eq!(pubsub.binding_key, Some(""));
        assert_eq!(pubsub.routing_key(&no_overrides()), "");
    }

    #[tokio::test]
    async fn consumer_topology_installs_in_order_with_generated_queue() {
        let mut session = MockBrokerSession::new();
        let mut seq = Sequence::new();

        session
            .expect_declare_exchange()
            .withf(|def| def.name() == "direct_logs" && def.is_durable())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        session
            .expect_declare_queue()
            .withf(|def| def.is_server_named() && def.is_exclusive())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("amq.gen-42".to_owned()));
        session
            .expect_bind()
            .withf(|binding| {
                binding.queue_name() == "amq.gen-42"
                    && binding.exchange_name() == "direct_logs"
                    && binding.key() == "error"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let queue = lookup("routing")
            .consumer_topology(&session, &no_overrides())
            .install()
            .await
            .unwrap();

        assert_eq!(queue.as_deref(), Some("amq.gen-42"));
    }

    #[tokio::test]
    async fn consumer_binds_to_overridden_exchange() {
        let mut session = MockBrokerSession::new();
        session
            .expect_declare_exchange()
            .withf(|def| def.name() == "alerts" && def.exchange_kind() == ExchangeKind::Topic)
            .times(1)
            .returning(|_| Ok(()));
        session
            .expect_declare_queue()
            .returning(|_| Ok("amq.gen-7".to_owned()));
        session
            .expect_bind()
            .withf(|binding| {
                binding.queue_name() == "amq.gen-7"
                    && binding.exchange_name() == "alerts"
                    && binding.key() == "*.error.*"
            })
            .times(1)
            .returning(|_| Ok(()));

        let names = ResourceNames {
            exchange: Some("alerts".to_owned()),
            queue: None,
        };
        let queue = lookup("topics")
            .consumer_topology(&session, &names)
            .install()
            .await
            .unwrap();

        assert_eq!(queue.as_deref(), Some("amq.gen-7"));
    }

    #[tokio::test]
    async fn producer_topology_skips_queue_for_exchange_patterns() {
        let mut session = MockBrokerSession::new();
        session
            .expect_declare_exchange()
            .times(1)
            .returning(|_| Ok(()));
        session.expect_declare_queue().never();
        session.expect_bind().never();

        let queue = lookup("pubsub")
            .producer_topology(&session, &no_overrides())
            .install()
            .await
            .unwrap();

        assert_eq!(queue, None);
    }

    #[tokio::test]
    async fn declare_failure_stops_installation() {
        let mut session = MockBrokerSession::new();
        session
            .expect_declare_exchange()
            .returning(|def| Err(AmqpError::DeclareExchangeError(def.name().to_owned())));
        session.expect_declare_queue().never();

        let result = lookup("topics")
            .consumer_topology(&session, &no_overrides())
            .install()
            .await;

        assert_eq!(
            result,
            Err(AmqpError::DeclareExchangeError("topic_logs".to_owned()))
        );
    }
}
