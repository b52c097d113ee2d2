//! Message service daemon.

use anyhow::Context;
use msg_broker::{Broker, BrokerConfig, CollisionPolicy, BROKER_PROC_NAME, DEFAULT_PORT};
use reactor::{AppOptions, Task, TaskOutcome, UsageError};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct BrokerOptions {
    port: Option<u16>,
    evict: bool,
}

impl AppOptions for BrokerOptions {
    fn usage(&self) -> String {
        format!(
            "\t-port <port>   TCP port of the message service (default {DEFAULT_PORT})\n\
             \t-evict         replace the incumbent registration on a name collision\n"
        )
    }

    fn parse(&mut self, args: &[String], consumed: &mut [bool]) -> Result<(), UsageError> {
        let mut i = 0;
        while i < args.len() {
            if consumed[i] {
                i += 1;
                continue;
            }
            match args[i].as_str() {
                "-port" => {
                    consumed[i] = true;
                    let value = args.get(i + 1).ok_or(UsageError::MissingValue {
                        option: "-port".to_string(),
                    })?;
                    self.port = Some(value.parse().map_err(|_| UsageError::InvalidValue {
                        option: "-port".to_string(),
                        value: value.clone(),
                    })?);
                    consumed[i + 1] = true;
                    i += 1;
                }
                "-evict" => {
                    consumed[i] = true;
                    self.evict = true;
                }
                _ => {}
            }
            i += 1;
        }
        Ok(())
    }
}

fn init_tracing(task: &Task) {
    let level = match task.log_settings().snapshot().stdout_level {
        1 => "error",
        2 => "warn",
        3 => "info",
        4 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut task = Task::new(BROKER_PROC_NAME);
    let mut options = BrokerOptions::default();

    let outcome = match task.init(&args, &mut options) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{}: {e}", BROKER_PROC_NAME);
            return ExitCode::FAILURE;
        }
    };
    let positionals = match outcome {
        TaskOutcome::Exit => return ExitCode::SUCCESS,
        TaskOutcome::Run { positionals } => positionals,
    };

    init_tracing(&task);
    if !positionals.is_empty() {
        warn!(?positionals, "Ignoring positional arguments");
    }

    let config = BrokerConfig {
        port: options.port.unwrap_or(DEFAULT_PORT),
        policy: if options.evict {
            CollisionPolicy::EvictIncumbent
        } else {
            CollisionPolicy::RejectNewcomer
        },
        ..BrokerConfig::default()
    };
    info!(proc = %task.proc_name(), port = config.port, "Starting message service");

    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Message service failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: BrokerConfig) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            let _ = shutdown_tx.send(true);
        }
    });

    let port = config.port;
    Broker::new(config)
        .run(shutdown_rx)
        .await
        .with_context(|| format!("message service on port {port}"))
}
