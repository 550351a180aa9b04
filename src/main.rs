// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use amqp_patterns::{
    cli::{self, Cli},
    consumer::Consumer,
    errors::ConfigError,
    publisher::Producer,
    session::{AmqpSession, BrokerSession},
    settings::{self, Config, Mode},
};
use std::{process::ExitCode, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CONNECTION_NAME: &str = "amqp-patterns";
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::from_env();
    init_tracing(&cli.log_level);

    let config = match settings::resolve(&cli.config, &cli.overrides) {
        Ok(config) => config,
        Err(err @ (ConfigError::InvalidMode(_) | ConfigError::MissingMessage)) => {
            eprintln!("error: {}\n", err);
            eprintln!("{}", cli::usage());
            return ExitCode::FAILURE;
        }
        Err(err) => {
            error!(error = err.to_string(), "failure to load the configuration");
            return ExitCode::FAILURE;
        }
    };

    let session = match AmqpSession::connect(&config.uri(), CONNECTION_NAME).await {
        Ok(session) => Arc::new(session),
        Err(err) => {
            error!(
                error = err.to_string(),
                host = config.host.as_str(),
                port = config.port,
                "failure to connect"
            );
            return ExitCode::FAILURE;
        }
    };

    let exit = match config.mode {
        Mode::Producer => run_producer(session.as_ref(), &config).await,
        Mode::Consumer => run_consumer(session.clone(), &config).await,
        Mode::Unknown(ref literal) => {
            error!(mode = literal.as_str(), "invalid mode");
            ExitCode::FAILURE
        }
    };

    if let Err(err) = session.close().await {
        error!(error = err.to_string(), "failure to close the session");
    }

    exit
}

async fn run_producer(session: &AmqpSession, config: &Config) -> ExitCode {
    match Producer::new(session, config)
        .send(&config.pattern, &config.message)
        .await
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = err.to_string(), "failure to send the message");
            ExitCode::FAILURE
        }
    }
}

async fn run_consumer(session: Arc<AmqpSession>, config: &Config) -> ExitCode {
    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping consumer");
                cancel.cancel();
            }
        }
    });

    match Consumer::new(session, config)
        .receive(&config.pattern, cancel)
        .await
    {
        Ok(()) => ExitCode::from(EXIT_INTERRUPTED),
        Err(err) => {
            error!(error = err.to_string(), "failure to receive messages");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
