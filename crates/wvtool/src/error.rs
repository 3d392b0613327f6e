// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Error types for wvtool

use thiserror::Error;

/// Exit code for a command that could not be launched
pub const EXIT_SPAWN_FAILURE: u8 = 2;

/// Errors that abort a whole invocation
///
/// Failing checks and misbehaving children are not errors: they end up in
/// the [`wvtest::RunSummary`] verdict. Only problems that prevent supervising
/// the run at all are reported here.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A child process could not be started
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        /// The command line that was attempted
        command: String,
        /// The underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// A command line was empty or could not be split into words
    #[error("Invalid command line '{command}': {message}")]
    InvalidCommand {
        /// The offending command line
        command: String,
        /// What was wrong with it
        message: String,
    },

    /// Error reading child output or writing the report
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the protocol engine
    #[error("Protocol error: {0}")]
    Protocol(#[from] wvtest::ProtocolError),

    /// A supervising task panicked or was aborted
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl HarnessError {
    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            HarnessError::Spawn { .. } | HarnessError::InvalidCommand { .. } => {
                EXIT_SPAWN_FAILURE
            }
            _ => 1,
        }
    }
}
