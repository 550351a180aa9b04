// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod otel;

pub mod cli;
pub mod consumer;
pub mod errors;
pub mod exchange;
pub mod publisher;
pub mod queue;
pub mod session;
pub mod settings;
pub mod topology;
