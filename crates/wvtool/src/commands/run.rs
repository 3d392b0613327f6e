//! `run` and `runall`: supervise child processes

use std::io::Write;

use tracing::{debug, info};

use crate::commands::write_junit;
use crate::config::Config;
use crate::error::HarnessError;
use crate::logdir::LogDir;
use crate::mux::{MuxOptions, Multiplexer};
use crate::report::Renderer;
use crate::runner::{ProcessCommand, ProcessRunner};

/// Spawn every command, multiplex their output and print the final report
///
/// # Errors
///
/// Returns `HarnessError::Spawn` if any command cannot be started; children
/// started before it are killed.
pub async fn run<W: Write>(
    config: &Config,
    commands: Vec<ProcessCommand>,
    logdir: Option<LogDir>,
    renderer: &mut Renderer<W>,
) -> Result<u8, HarnessError> {
    let runner = ProcessRunner;
    let children = commands
        .iter()
        .map(|command| runner.spawn(command))
        .collect::<Result<Vec<_>, _>>()?;
    info!(children = children.len(), "supervising test programs");

    let options = MuxOptions {
        verbosity: config.verbosity(),
        idle_timeout: config.idle_timeout(),
        junit_prefix: config.junit_prefix(),
        logdir,
        ..Default::default()
    };
    let outcome = Multiplexer::new(options)
        .run(children, renderer, shutdown_signal())
        .await?;

    renderer.finish(&outcome.summary)?;
    write_junit(config.junit_xml.as_deref(), outcome.junit.as_ref())?;

    let code = outcome.summary.exit_code();
    debug!(code, "run finished");
    Ok(u8::try_from(code).unwrap_or(1))
}

/// Resolves when the harness is asked to stop
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => debug!("received interrupt"),
        () = terminate => debug!("received SIGTERM"),
    }
}
