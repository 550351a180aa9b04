// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer
//!
//! Declares the topology of the selected pattern, subscribes to its queue and
//! handles deliveries until the cancellation token fires. The delivery loop
//! runs on a spawned task which the caller awaits, so `receive` only returns
//! on cancellation or on the first failure.

use crate::{
    errors::AmqpError,
    otel,
    session::{BrokerSession, Delivery, DeliveryStream},
    settings::Config,
    topology::{self, AckMode, ResourceNames},
};
use futures_util::StreamExt;
use opentelemetry::{
    global::{self, BoxedTracer},
    trace::{Span, Status},
};
use std::{borrow::Cow, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Consumer role bound to an open broker session.
pub struct Consumer {
    session: Arc<dyn BrokerSession>,
    names: ResourceNames,
}

impl Consumer {
    pub fn new(session: Arc<dyn BrokerSession>, config: &Config) -> Consumer {
        Consumer {
            session,
            names: ResourceNames::from(config),
        }
    }

    /// Declares, subscribes and handles deliveries until `cancel` fires.
    ///
    /// Manually acknowledged patterns get their prefetch applied before the
    /// subscription starts.
    pub async fn receive(&self, pattern: &str, cancel: CancellationToken) -> Result<(), AmqpError> {
        let entry = topology::lookup(pattern);

        let Some(queue) = entry
            .consumer_topology(self.session.as_ref(), &self.names)
            .install()
            .await?
        else {
            error!(pattern = entry.pattern.as_str(), "no queue to consume from");
            return Err(AmqpError::ConsumerDeclarationError);
        };

        if let AckMode::Manual { prefetch } = entry.ack {
            debug!(prefetch, "configuring qos");
            self.session.set_prefetch(prefetch).await?;
        }

        let deliveries = self.session.subscribe(&queue, entry.ack.is_auto()).await?;

        info!(
            pattern = entry.pattern.as_str(),
            queue = queue.as_str(),
            "waiting for messages, press CTRL+C to exit"
        );

        let spawned = tokio::spawn(consume_loop(
            self.session.clone(),
            deliveries,
            entry.ack,
            entry.pattern.as_str(),
            cancel,
        ))
        .await;

        match spawned {
            Ok(result) => result,
            Err(err) => {
                error!(error = err.to_string(), "consumer task failed");
                Err(AmqpError::ConsumerError(err.to_string()))
            }
        }
    }
}

async fn consume_loop(
    session: Arc<dyn BrokerSession>,
    mut deliveries: DeliveryStream,
    ack: AckMode,
    pattern: &'static str,
    cancel: CancellationToken,
) -> Result<(), AmqpError> {
    let tracer = global::tracer("amqp consumer");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("consumer cancelled");
                return Ok(());
            }
            next = deliveries.next() => next,
        };

        match next {
            Some(Ok(delivery)) => {
                consume(session.as_ref(), &tracer, &delivery, ack, pattern).await?
            }
            Some(Err(err)) => {
                error!(error = err.to_string(), "errors consume msg");
                return Err(err);
            }
            None => {
                error!("delivery stream closed");
                return Err(AmqpError::ConsumerError("delivery stream closed".to_owned()));
            }
        }
    }
}

/// Logs one delivery and acknowledges it when the pattern uses manual acks.
async fn consume(
    session: &dyn BrokerSession,
    tracer: &BoxedTracer,
    delivery: &Delivery,
    ack: AckMode,
    pattern: &'static str,
) -> Result<(), AmqpError> {
    let mut span = otel::new_span(&delivery.headers, tracer, pattern);

    info!(
        pattern,
        exchange = delivery.exchange.as_str(),
        routing_key = delivery.routing_key.as_str(),
        body = delivery.body_text(),
        "received message"
    );

    if ack.is_auto() {
        span.set_status(Status::Ok);
        return Ok(());
    }

    match session.acknowledge(delivery).await {
        Err(err) => {
            error!("error whiling ack msg");
            span.record_error(&err);
            span.set_status(Status::Error {
                description: Cow::from("error to ack msg"),
            });
            Err(err)
        }
        _ => {
            span.set_status(Status::Ok);
            Ok(())
        }
    }
}
