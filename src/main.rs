//! Sitepilot
//!
//! Main entry point for the CLI application.

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sitepilot::cli::{commands, Cli, Command};
use sitepilot::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("sitepilot=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    debug!("sitepilot v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };

    let result = match cli.command {
        Command::Run(args) => {
            let interrupt = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            commands::run(args, config, interrupt).await
        }
        Command::Steps { steps_file } => commands::list_steps(steps_file.as_deref()).map(|()| 0),
        Command::Open { url, step_set } => commands::open(url, step_set).map(|()| 0),
        Command::Status { all } => commands::status(&config, all).map(|()| 0),
        Command::Config { init } => commands::show_config(&config, init).map(|()| 0),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}
