// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Settings Resolution
//!
//! The run configuration is built once per process: fixed defaults, then the
//! optional `key=value` config file, then the command-line overrides. Mode and
//! pattern shorthands are normalized to their long form and the result is
//! validated before any broker connection is attempted.

use crate::errors::ConfigError;
use clap::Args;
use serde::Serialize;
use std::{fmt, fs, io, path::Path};
use tracing::{debug, warn};

/// Default config file, looked up relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "rabbitmq_setting.conf";

/// Default AMQP port.
pub const DEFAULT_PORT: u16 = 5672;

pub const MODE_PRODUCER: &str = "producer";
pub const MODE_CONSUMER: &str = "consumer";

pub const PATTERN_SIMPLEST: &str = "simplest";
pub const PATTERN_WORK: &str = "work";
pub const PATTERN_ROUTING: &str = "routing";
pub const PATTERN_TOPICS: &str = "topics";
pub const PATTERN_PUBSUB: &str = "pubsub";

/// Role the process plays against the broker.
///
/// `Unknown` keeps the literal it was built from so that validation can report
/// it verbatim instead of silently defaulting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Mode {
    Producer,
    Consumer,
    Unknown(String),
}

impl From<&str> for Mode {
    fn from(value: &str) -> Self {
        match normalize_mode(value).as_str() {
            MODE_PRODUCER => Mode::Producer,
            MODE_CONSUMER => Mode::Consumer,
            other => Mode::Unknown(other.to_owned()),
        }
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Producer => f.write_str(MODE_PRODUCER),
            Mode::Consumer => f.write_str(MODE_CONSUMER),
            Mode::Unknown(literal) => f.write_str(literal),
        }
    }
}

/// The five exchange/queue topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Simplest,
    Work,
    Routing,
    Topics,
    PubSub,
}

impl Pattern {
    /// Maps a pattern name (long form or shorthand) to its variant.
    ///
    /// Any name that is not recognized selects `Simplest`.
    pub fn from_name(name: &str) -> Pattern {
        match normalize_pattern(name).as_str() {
            PATTERN_WORK => Pattern::Work,
            PATTERN_ROUTING => Pattern::Routing,
            PATTERN_TOPICS => Pattern::Topics,
            PATTERN_PUBSUB => Pattern::PubSub,
            PATTERN_SIMPLEST => Pattern::Simplest,
            other => {
                warn!(pattern = other, "unknown pattern, using simplest");
                Pattern::Simplest
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::Simplest => PATTERN_SIMPLEST,
            Pattern::Work => PATTERN_WORK,
            Pattern::Routing => PATTERN_ROUTING,
            Pattern::Topics => PATTERN_TOPICS,
            Pattern::PubSub => PATTERN_PUBSUB,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expands mode shorthands: `p`/`prod` and `c`/`cons`.
pub fn normalize_mode(mode: &str) -> String {
    match mode.to_lowercase().as_str() {
        "p" | "prod" => MODE_PRODUCER.to_owned(),
        "c" | "cons" => MODE_CONSUMER.to_owned(),
        _ => mode.to_owned(),
    }
}

/// Expands pattern shorthands: `s`/`simple`, `w`, `r`, `t` and `p`/`pub`.
pub fn normalize_pattern(pattern: &str) -> String {
    match pattern.to_lowercase().as_str() {
        "s" | "simple" => PATTERN_SIMPLEST.to_owned(),
        "w" => PATTERN_WORK.to_owned(),
        "r" => PATTERN_ROUTING.to_owned(),
        "t" => PATTERN_TOPICS.to_owned(),
        "p" | "pub" => PATTERN_PUBSUB.to_owned(),
        _ => pattern.to_owned(),
    }
}

/// Command-line overrides. An empty string (or a zero port) means the flag
/// was not given.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Run mode: producer (p, prod) or consumer (c, cons)
    #[arg(long, default_value_t)]
    pub mode: String,

    /// RabbitMQ server host
    #[arg(long, default_value_t)]
    pub host: String,

    /// RabbitMQ server port
    #[arg(long, default_value_t)]
    pub port: u16,

    /// RabbitMQ user name
    #[arg(long, default_value_t)]
    pub user: String,

    /// RabbitMQ password
    #[arg(long, default_value_t)]
    pub password: String,

    /// Message body to send (producer only)
    #[arg(long, default_value_t, allow_hyphen_values = true)]
    pub message: String,

    /// Pattern: simplest (s), work (w), routing (r), topics (t), pubsub (p)
    #[arg(long, default_value_t)]
    pub pattern: String,

    /// Exchange name override
    #[arg(long, default_value_t)]
    pub exchange: String,

    /// Queue name override
    #[arg(long, default_value_t)]
    pub queue: String,
}

/// Resolved run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub message: String,
    pub pattern: String,
    pub mode: Mode,
    pub exchange: String,
    pub queue: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_owned(),
            port: DEFAULT_PORT,
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            message: String::new(),
            pattern: PATTERN_SIMPLEST.to_owned(),
            mode: Mode::Consumer,
            exchange: String::new(),
            queue: String::new(),
        }
    }
}

impl Config {
    /// Builds the defaults overlaid with the config file at `path`.
    ///
    /// A file that does not exist leaves the defaults untouched; any other read
    /// failure is returned.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let mut config = Config::default();

        match fs::read_to_string(path) {
            Ok(contents) => {
                debug!(path = %path.display(), "loading config file");
                config.apply_file_contents(&contents);
                Ok(config)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Ok(config)
            }
            Err(source) => Err(ConfigError::ReadFile {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Applies `key=value` lines. Blank lines, `#` comments, lines without
    /// `=` and unknown keys are skipped.
    pub fn apply_file_contents(&mut self, contents: &str) {
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                "host" => self.host = value.to_owned(),
                "port" => match value.parse::<u16>() {
                    Ok(port) => self.port = port,
                    Err(err) => warn!(value, error = err.to_string(), "ignoring invalid port"),
                },
                "user" => self.user = value.to_owned(),
                "password" => self.password = value.to_owned(),
                "message" => self.message = value.to_owned(),
                "pattern" => self.pattern = normalize_pattern(value),
                "mode" => self.mode = Mode::from(value),
                "exchange" => self.exchange = value.to_owned(),
                "queue" => self.queue = value.to_owned(),
                _ => {}
            }
        }
    }

    /// Overlays every override that was actually provided.
    pub fn merge(&mut self, flags: &Overrides) {
        if !flags.host.is_empty() {
            self.host = flags.host.clone();
        }
        if flags.port != 0 {
            self.port = flags.port;
        }
        if !flags.user.is_empty() {
            self.user = flags.user.clone();
        }
        if !flags.password.is_empty() {
            self.password = flags.password.clone();
        }
        if !flags.message.is_empty() {
            self.message = flags.message.clone();
        }
        if !flags.pattern.is_empty() {
            self.pattern = normalize_pattern(&flags.pattern);
        }
        if !flags.mode.is_empty() {
            self.mode = Mode::from(flags.mode.as_str());
        }
        if !flags.exchange.is_empty() {
            self.exchange = flags.exchange.clone();
        }
        if !flags.queue.is_empty() {
            self.queue = flags.queue.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.mode {
            Mode::Unknown(literal) => Err(ConfigError::InvalidMode(literal.clone())),
            Mode::Producer if self.message.is_empty() => Err(ConfigError::MissingMessage),
            _ => Ok(()),
        }
    }

    /// AMQP URI for the default virtual host.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/",
            self.user, self.password, self.host, self.port
        )
    }

    /// Exchange override, if one was configured.
    pub fn exchange_override(&self) -> Option<&str> {
        Some(self.exchange.as_str()).filter(|name| !name.is_empty())
    }

    /// Queue override, if one was configured.
    pub fn queue_override(&self) -> Option<&str> {
        Some(self.queue.as_str()).filter(|name| !name.is_empty())
    }
}

/// Loads, merges, normalizes and validates the run configuration.
pub fn resolve(path: &Path, flags: &Overrides) -> Result<Config, ConfigError> {
    let mut config = Config::load(path)?;
    config.merge(flags);
    config.validate()?;

    debug!(
        config = serde_json::to_string(&config).unwrap_or_default(),
        "configuration resolved"
    );

    Ok(config)
}
