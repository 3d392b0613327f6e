//! Subcommand implementations

pub mod format;
pub mod run;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use tracing::info;
use wvtest::Verbosity;
use wvtest::junit::JunitReport;

use crate::config::{Command, Config};
use crate::error::HarnessError;
use crate::logdir::LogDir;
use crate::report::{self, Progress, Renderer};
use crate::runner::ProcessCommand;

/// Exit code when no subcommand was given
pub const EXIT_USAGE: u8 = 2;

/// Run the subcommand selected by `config` and return the process exit code
///
/// # Errors
///
/// Returns `HarnessError` if a child cannot be started or output cannot be
/// written.
pub async fn execute(config: &Config) -> Result<u8, HarnessError> {
    let Some(command) = &config.command else {
        use clap::CommandFactory;
        Config::command().print_help()?;
        return Ok(EXIT_USAGE);
    };

    let width = config.output_width(report::terminal_width());
    let color = config.color_enabled(report::stdout_is_terminal());
    let renderer = Renderer::new(std::io::stdout(), width, color);
    let logdir = config.logdir.as_ref().map(LogDir::create).transpose()?;

    match command {
        Command::Run { command } => {
            let commands = vec![ProcessCommand::from_argv(command)?];
            let mut renderer = with_progress(config, renderer, width);
            run::run(config, commands, logdir, &mut renderer).await
        }
        Command::Runall { commands } => {
            let commands = commands
                .iter()
                .map(|line| ProcessCommand::parse(line))
                .collect::<Result<Vec<_>, _>>()?;
            let mut renderer = with_progress(config, renderer, width);
            run::run(config, commands, logdir, &mut renderer).await
        }
        Command::Format { files } => {
            let mut renderer = renderer;
            format::format(config, files, logdir.as_ref(), &mut renderer)
        }
    }
}

/// Supervised runs that do not echo every line show the current section
fn with_progress<W: std::io::Write>(
    config: &Config,
    renderer: Renderer<W>,
    width: usize,
) -> Renderer<W> {
    if config.verbosity() == Verbosity::Full {
        renderer
    } else {
        renderer.with_progress(Progress::stderr(width))
    }
}

/// Write `report` to `path` when one was collected
pub(crate) fn write_junit(
    path: Option<&Path>,
    report: Option<&JunitReport>,
) -> Result<(), HarnessError> {
    let (Some(path), Some(report)) = (path, report) else {
        return Ok(());
    };
    let file = File::create(path)?;
    report.write_to(BufWriter::new(file))?;
    info!(path = %path.display(), suites = report.suites.len(), "wrote JUnit report");
    Ok(())
}
