// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration
//!
//! Trace context travels in the AMQP message headers: the producer injects the
//! current context before publishing, the consumer extracts it from every
//! delivery and opens a consumer span under it. Without a configured
//! propagator both directions are no-ops.

use crate::session::Headers;
use lapin::types::AMQPValue;
use opentelemetry::{
    global::{self, BoxedSpan, BoxedTracer},
    propagation::{Extractor, Injector},
    trace::{SpanKind, Tracer},
    Context,
};
use std::borrow::Cow;
use tracing::error;

/// Writes trace context entries into outgoing headers.
pub(crate) struct HeaderInjector<'a> {
    headers: &'a mut Headers,
}

impl<'a> HeaderInjector<'a> {
    pub(crate) fn new(headers: &'a mut Headers) -> Self {
        Self { headers }
    }
}

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(
            key.to_lowercase().into(),
            AMQPValue::LongString(value.into()),
        );
    }
}

/// Reads trace context entries from incoming headers.
pub(crate) struct HeaderExtractor<'a> {
    headers: &'a Headers,
}

impl<'a> HeaderExtractor<'a> {
    pub(crate) fn new(headers: &'a Headers) -> Self {
        Self { headers }
    }
}

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|header_value| {
            if let AMQPValue::LongString(header_value) = header_value {
                std::str::from_utf8(header_value.as_bytes())
                    .map_err(|e| error!("Error decoding header value {:?}", e))
                    .ok()
            } else {
                None
            }
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|header| header.as_str()).collect()
    }
}

/// Headers carrying the current trace context.
pub(crate) fn inject_current_context() -> Headers {
    let mut headers = Headers::default();
    let ctx = Context::current();

    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&ctx, &mut HeaderInjector::new(&mut headers))
    });

    headers
}

/// Opens a consumer span named `name` under the context found in `headers`.
pub(crate) fn new_span(headers: &Headers, tracer: &BoxedTracer, name: &str) -> BoxedSpan {
    let ctx = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor::new(headers))
    });

    tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &ctx)
}
