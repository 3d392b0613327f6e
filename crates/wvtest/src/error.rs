// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Error types for wvtest

use thiserror::Error;

/// Errors that can occur while reading or reporting protocol output
///
/// Classification itself never fails: unrecognised lines are plain text and
/// uninterpretable Result lines count as failed checks.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Error reading protocol input or writing a report
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
