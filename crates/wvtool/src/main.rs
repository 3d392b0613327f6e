//! wvtool: command-line front end for the WvTest protocol
//!
//! Protocol output goes to stdout, diagnostics to stderr.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error};
use wvtool::commands::{self, EXIT_USAGE};
use wvtool::config::Config;
use wvtool::error::HarnessError;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize tracing subscriber (stderr, so stdout carries only protocol text)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_level().into()),
        )
        .init();

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::from(EXIT_USAGE);
    }

    match run(&config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<HarnessError>()
                .map_or(1, HarnessError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(config: &Config) -> anyhow::Result<u8> {
    debug!(?config, "starting wvtool");
    let code = commands::execute(config)
        .await
        .context("wvtool run failed")?;
    Ok(code)
}
