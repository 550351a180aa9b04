// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! Exchanges are the routing entities that accept published messages and
//! forward them to bound queues. The demo topologies only use the three
//! routing kinds below; plain queue patterns publish through the default
//! exchange and declare no exchange at all.

/// Represents the exchange kinds used by the topologies.
///
/// - Direct: routes on an exact routing key match
/// - Fanout: broadcasts to every bound queue, ignoring the routing key
/// - Topic: routes on wildcard pattern matching of routing keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        }
    }
}

/// Definition of an exchange with its declaration flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) delete: bool,
    pub(crate) durable: bool,
    pub(crate) passive: bool,
    pub(crate) internal: bool,
    pub(crate) no_wait: bool,
}

impl ExchangeDefinition {
    /// Creates a new, non-durable Direct exchange definition.
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            delete: false,
            durable: false,
            passive: false,
            internal: false,
            no_wait: false,
        }
    }

    /// Name of the exchange.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Routing kind the exchange is declared with.
    pub fn exchange_kind(&self) -> ExchangeKind {
        self.kind
    }

    /// Returns `true` when the exchange survives a broker restart.
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Sets the exchange type.
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Makes the exchange durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }
}
