//! Configuration for the wvtool command line
//!
//! Global options control diagnostics, output shape and supervision limits;
//! the subcommand decides where protocol text comes from.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use wvtest::{DEFAULT_WIDTH, Verbosity};

/// wvtool - run and summarise WvTest protocol test programs
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "wvtool")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// What to do
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Enable verbose logging (debug level)
    ///
    /// Diagnostics go to stderr; protocol output on stdout is unaffected.
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,

    /// Quiet mode - only warnings and errors are logged
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,

    /// Print one status line per section instead of every line
    #[arg(short, long, default_value = "false", conflicts_with = "failures_only")]
    pub summary: bool,

    /// Collapse passing sections, show failing sections in full
    #[arg(short, long, default_value = "false")]
    pub failures_only: bool,

    /// Output width in columns
    ///
    /// Defaults to the terminal width, or 80 when stdout is not a terminal.
    #[arg(short, long, env = "COLUMNS")]
    pub width: Option<usize>,

    /// Kill a child after this many seconds without output
    #[arg(long, env = "WVTOOL_TIMEOUT", value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Force colored output
    #[arg(long, default_value = "false", conflicts_with = "no_color")]
    pub color: bool,

    /// Disable colored output
    #[arg(long, default_value = "false")]
    pub no_color: bool,

    /// Also write results as JUnit XML to this file
    #[arg(long, value_name = "FILE")]
    pub junit_xml: Option<PathBuf>,

    /// Prefix for JUnit test suite names
    #[arg(long, default_value = "", value_name = "STR")]
    pub junit_prefix: String,

    /// Store one log file per test section in this directory
    #[arg(long, value_name = "DIR")]
    pub logdir: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run one command and supervise its output
    ///
    /// Example:
    ///   wvtool run ./t/mytest.sh --fast
    Run {
        /// The program and its arguments
        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            value_name = "COMMAND"
        )]
        command: Vec<String>,
    },

    /// Run several commands concurrently, one child per argument
    ///
    /// Example:
    ///   wvtool runall './t/a.sh' './t/b.sh --slow'
    Runall {
        /// Command lines, each split into words like a shell would
        #[arg(required = true, value_name = "COMMAND")]
        commands: Vec<String>,
    },

    /// Reformat protocol output read from files, or stdin when none are given
    Format {
        /// Log files to read
        files: Vec<PathBuf>,
    },
}

impl Config {
    /// Get the log level based on verbose/quiet flags
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::WARN
        } else {
            tracing::Level::INFO
        }
    }

    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.summary {
            Verbosity::Summary
        } else if self.failures_only {
            Verbosity::Failures
        } else {
            Verbosity::Full
        }
    }

    /// Whether to emit ANSI colors, given whether stdout is a terminal
    #[must_use]
    pub fn color_enabled(&self, stdout_is_terminal: bool) -> bool {
        if self.no_color {
            false
        } else {
            self.color || stdout_is_terminal
        }
    }

    /// Output width: the flag, then the detected terminal width, then 80
    #[must_use]
    pub fn output_width(&self, detected: Option<usize>) -> usize {
        self.width.or(detected).unwrap_or(DEFAULT_WIDTH)
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// JUnit suite prefix, when a report was requested
    #[must_use]
    pub fn junit_prefix(&self) -> Option<String> {
        self.junit_xml.as_ref().map(|_| self.junit_prefix.clone())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The width or timeout is zero
    /// - The JUnit report directory doesn't exist
    /// - The log directory is an existing file
    /// - A file given to `format` doesn't exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == Some(0) {
            return Err(ConfigError::InvalidWidth(0));
        }
        if self.timeout == Some(0) {
            return Err(ConfigError::InvalidTimeout(0));
        }

        if let Some(ref path) = self.junit_xml {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.is_dir() {
                    return Err(ConfigError::JunitDirectoryNotFound(parent.to_path_buf()));
                }
            }
        }

        if let Some(ref dir) = self.logdir {
            if dir.exists() && !dir.is_dir() {
                return Err(ConfigError::LogdirNotDirectory(dir.clone()));
            }
        }

        if let Some(Command::Format { files }) = &self.command {
            if let Some(missing) = files.iter().find(|f| !f.exists()) {
                return Err(ConfigError::InputNotFound(missing.clone()));
            }
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Width must be at least one column
    #[error("Invalid output width: {0}")]
    InvalidWidth(usize),

    /// Timeout must be at least one second
    #[error("Invalid timeout: {0} seconds")]
    InvalidTimeout(u64),

    /// Directory for the JUnit report does not exist
    #[error("JUnit report directory not found: {0}")]
    JunitDirectoryNotFound(PathBuf),

    /// `--logdir` names something that is not a directory
    #[error("Log directory is not a directory: {0}")]
    LogdirNotDirectory(PathBuf),

    /// Input file for `format` does not exist
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("wvtool").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.command.is_none());
        assert!(!config.verbose);
        assert!(!config.quiet);
        assert!(config.width.is_none());
        assert!(config.timeout.is_none());
        assert!(config.junit_xml.is_none());
    }

    #[test]
    fn test_log_level() {
        assert_eq!(Config::default().log_level(), tracing::Level::INFO);
        let config = Config {
            verbose: true,
            ..Default::default()
        };
        assert_eq!(config.log_level(), tracing::Level::DEBUG);
        let config = Config {
            quiet: true,
            ..Default::default()
        };
        assert_eq!(config.log_level(), tracing::Level::WARN);
    }

    #[test]
    fn test_run_keeps_child_flags() {
        let config = parse(&["-w", "100", "run", "./t.sh", "-v", "--fast"]);
        assert_eq!(config.width, Some(100));
        assert!(!config.verbose);
        match config.command {
            Some(Command::Run { command }) => {
                assert_eq!(command, vec!["./t.sh", "-v", "--fast"]);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_runall_and_format() {
        let config = parse(&["runall", "./a.sh", "./b.sh --slow"]);
        assert!(matches!(
            config.command,
            Some(Command::Runall { ref commands }) if commands.len() == 2
        ));
        let config = parse(&["format"]);
        assert!(matches!(config.command, Some(Command::Format { ref files }) if files.is_empty()));
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Config::try_parse_from(["wvtool", "run"]).is_err());
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(parse(&["format"]).verbosity(), Verbosity::Full);
        assert_eq!(parse(&["-s", "format"]).verbosity(), Verbosity::Summary);
        assert_eq!(parse(&["-f", "format"]).verbosity(), Verbosity::Failures);
        assert!(Config::try_parse_from(["wvtool", "-s", "-f", "format"]).is_err());
    }

    #[test]
    fn test_color_choice() {
        let config = Config::default();
        assert!(config.color_enabled(true));
        assert!(!config.color_enabled(false));
        let forced = Config {
            color: true,
            ..Default::default()
        };
        assert!(forced.color_enabled(false));
        let disabled = Config {
            no_color: true,
            ..Default::default()
        };
        assert!(!disabled.color_enabled(true));
    }

    #[test]
    fn test_output_width() {
        let config = Config::default();
        assert_eq!(config.output_width(None), 80);
        assert_eq!(config.output_width(Some(132)), 132);
        let config = Config {
            width: Some(40),
            ..Default::default()
        };
        assert_eq!(config.output_width(Some(132)), 40);
    }

    #[test]
    fn test_idle_timeout() {
        let config = Config {
            timeout: Some(5),
            ..Default::default()
        };
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(Config::default().idle_timeout(), None);
    }

    #[test]
    fn test_validate_rejects_zero_width_and_timeout() {
        let config = Config {
            width: Some(0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWidth(0))));
        let config = Config {
            timeout: Some(0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(0))));
    }

    #[test]
    fn test_validate_missing_inputs() {
        let config = Config {
            command: Some(Command::Format {
                files: vec![PathBuf::from("/nonexistent/path/12345.log")],
            }),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InputNotFound(_))));

        let config = Config {
            junit_xml: Some(PathBuf::from("/nonexistent/dir/12345/report.xml")),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::JunitDirectoryNotFound(_))
        ));
    }

    #[test]
    fn test_logdir_flag() {
        let config = parse(&["--logdir", "logs", "run", "./t.sh"]);
        assert_eq!(config.logdir, Some(PathBuf::from("logs")));
        assert!(config.validate().is_ok());

        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let config = Config {
            logdir: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LogdirNotDirectory(_))
        ));
    }

    #[test]
    fn test_validate_relative_junit_path() {
        let config = Config {
            junit_xml: Some(PathBuf::from("report.xml")),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.junit_prefix(), Some(String::new()));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Config::command().debug_assert();
    }
}
