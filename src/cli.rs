// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Command Line
//!
//! Flags are declared with clap. Single-dash long flags such as `-mode p` or
//! `-pattern=t` are accepted as well: `go_style_args` rewrites them to their
//! `--` form before parsing.

use crate::settings::{Overrides, DEFAULT_CONFIG_FILE};
use clap::{CommandFactory, Parser};
use std::{ffi::OsString, path::PathBuf};

const EXAMPLES: &str = "\
Examples:
  producer: amqp-patterns -mode producer -host localhost -message \"hello world\"
  consumer: amqp-patterns -mode consumer -host localhost -pattern pubsub";

/// Long flags that take a value.
const VALUE_FLAGS: &[&str] = &[
    "mode",
    "host",
    "port",
    "user",
    "password",
    "message",
    "pattern",
    "exchange",
    "queue",
    "config",
    "log-level",
];

/// Long flags without a value.
const SWITCH_FLAGS: &[&str] = &["help", "version"];

/// RabbitMQ pattern demo client: producer or consumer on one of five
/// exchange/queue topologies.
#[derive(Parser, Debug)]
#[command(name = "amqp-patterns", version, after_help = EXAMPLES)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: Overrides,

    /// key=value config file, used when present
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Parses the process arguments, accepting single-dash long flags.
    pub fn from_env() -> Cli {
        Cli::parse_from(go_style_args(std::env::args_os()))
    }
}

/// Full help text, used after a validation failure.
pub fn usage() -> String {
    Cli::command().render_help().to_string()
}

/// Rewrites `-flag` and `-flag=value` to `--flag` / `--flag=value` for the
/// known long flags. The first argument (program name) and values following a
/// value flag are kept as they are.
pub fn go_style_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut rewritten = Vec::new();
    let mut expecting_value = false;

    for (index, arg) in args.into_iter().map(Into::into).enumerate() {
        if index == 0 || expecting_value {
            expecting_value = false;
            rewritten.push(arg);
            continue;
        }

        let Some(text) = arg.to_str() else {
            rewritten.push(arg);
            continue;
        };

        let name = text
            .trim_start_matches('-')
            .split_once('=')
            .map_or(text.trim_start_matches('-'), |(name, _)| name);
        let has_inline_value = text.contains('=');
        let is_value_flag = VALUE_FLAGS.contains(&name);
        let is_flag = text.starts_with('-') && (is_value_flag || SWITCH_FLAGS.contains(&name));

        if is_flag {
            expecting_value = is_value_flag && !has_inline_value;
            if text.starts_with("--") {
                rewritten.push(arg);
            } else {
                rewritten.push(OsString::from(format!("-{}", text)));
            }
        } else {
            rewritten.push(arg);
        }
    }

    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|arg| arg.into_string().unwrap())
            .collect()
    }

    #[test]
    fn single_dash_flags_are_rewritten() {
        let args = go_style_args(["bin", "-mode", "p", "-pattern=t", "--host", "rabbit"]);
        assert_eq!(
            strings(args),
            ["bin", "--mode", "p", "--pattern=t", "--host", "rabbit"]
        );
    }

    #[test]
    fn values_that_look_like_flags_are_kept() {
        let args = go_style_args(["bin", "-message", "-queue", "-queue", "jobs"]);
        assert_eq!(
            strings(args),
            ["bin", "--message", "-queue", "--queue", "jobs"]
        );
    }

    #[test]
    fn unknown_and_short_flags_are_untouched() {
        let args = go_style_args(["bin", "-h", "-x", "plain"]);
        assert_eq!(strings(args), ["bin", "-h", "-x", "plain"]);
    }

    #[test]
    fn parses_go_style_command_line() {
        let cli = Cli::try_parse_from(go_style_args([
            "amqp-patterns",
            "-mode",
            "producer",
            "-pattern",
            "pub",
            "-message",
            "hi",
            "-port=5673",
        ]))
        .unwrap();

        assert_eq!(cli.overrides.mode, "producer");
        assert_eq!(cli.overrides.pattern, "pub");
        assert_eq!(cli.overrides.message, "hi");
        assert_eq!(cli.overrides.port, 5673);
        assert!(cli.overrides.exchange.is_empty());
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn usage_lists_flags_and_examples() {
        let text = usage();
        assert!(text.contains("--pattern"));
        assert!(text.contains("Examples:"));
    }
}
