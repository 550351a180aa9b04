// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! Queue declarations and queue-to-exchange bindings. A queue declared with an
//! empty name gets a name generated by the broker; the generated name is what
//! the bindings and the consumer subscription must use.

/// Definition of a queue with its declaration flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) passive: bool,
    pub(crate) no_wait: bool,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name.
    ///
    /// By default, the queue is non-durable, non-exclusive and kept when unused.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            durable: false,
            delete: false,
            exclusive: false,
            passive: false,
            no_wait: false,
        }
    }

    /// Creates a definition whose name is chosen by the broker.
    pub fn server_named() -> QueueDefinition {
        QueueDefinition::new("")
    }

    /// Name to declare; empty for a server-named queue.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when the broker picks the queue name.
    pub fn is_server_named(&self) -> bool {
        self.name.is_empty()
    }

    /// Returns `true` when the queue survives a broker restart.
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Returns `true` when the queue is bound to the declaring connection.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Makes the queue exclusive to the connection.
    ///
    /// Exclusive queues are deleted when the connection closes.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

/// Configuration for binding a queue to an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub(crate) queue_name: String,
    pub(crate) exchange_name: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a new queue binding for the given queue.
    ///
    /// The exchange name and routing key start empty and are set with
    /// `exchange` and `routing_key`.
    pub fn new(queue: &str) -> QueueBinding {
        QueueBinding {
            queue_name: queue.to_owned(),
            exchange_name: String::new(),
            routing_key: String::new(),
        }
    }

    /// Sets the exchange to bind the queue to.
    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange_name = exchange.to_owned();
        self
    }

    /// Sets the routing key for the binding.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    /// Queue being bound, as returned by the declaration.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Exchange the queue is bound to.
    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    /// Binding key matched against routing keys of published messages.
    pub fn key(&self) -> &str {
        &self.routing_key
    }
}
