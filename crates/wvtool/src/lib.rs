// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! wvtool: run and supervise WvTest protocol test programs
//!
//! This crate launches test programs, multiplexes their output through the
//! [`wvtest`] engine and renders the aggregated result. The `wvtool` binary
//! is a thin wrapper around [`commands::execute`].

pub mod commands;
pub mod config;
pub mod error;
pub mod logdir;
pub mod mux;
pub mod report;
pub mod runner;

pub use config::{Command, Config, ConfigError};
pub use error::HarnessError;
pub use logdir::LogDir;
pub use mux::{LineSink, MuxOptions, MuxOutcome, Multiplexer};
pub use report::Renderer;
pub use runner::{ProcessCommand, ProcessRunner, SpawnedChild};
