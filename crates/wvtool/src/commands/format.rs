// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! `format`: reformat protocol text that was captured earlier

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use tracing::debug;
use wvtest::junit::{JunitRecorder, JunitReport};
use wvtest::{Aggregator, ProtocolLine, RunResult, RunSummary, Termination, Verbosity, classify};

use crate::commands::write_junit;
use crate::config::Config;
use crate::error::HarnessError;
use crate::logdir::LogDir;
use crate::report::Renderer;

/// Label of the stream read from standard input
pub const STDIN_LABEL: &str = "stdin";

/// Reformat `files`, or stdin when empty, and print the final report
///
/// # Errors
///
/// Returns `HarnessError::Io` if an input cannot be read or output cannot be
/// written.
pub fn format<W: Write>(
    config: &Config,
    files: &[PathBuf],
    logdir: Option<&LogDir>,
    renderer: &mut Renderer<W>,
) -> Result<u8, HarnessError> {
    let verbosity = config.verbosity();
    let junit_prefix = config.junit_prefix();
    let junit_prefix = junit_prefix.as_deref();
    let mut runs = Vec::new();
    let mut junit = junit_prefix.map(|_| JunitReport::default());

    let mut collect = |(result, report): (RunResult, Option<JunitReport>)| {
        if let (Some(all), Some(report)) = (junit.as_mut(), report) {
            all.merge(report);
        }
        runs.push(result);
    };

    if files.is_empty() {
        let stdin = io::stdin().lock();
        collect(format_reader(stdin, STDIN_LABEL, verbosity, junit_prefix, logdir, renderer)?);
    } else {
        for path in files {
            let label = path.display().to_string();
            let reader = BufReader::new(File::open(path)?);
            collect(format_reader(reader, &label, verbosity, junit_prefix, logdir, renderer)?);
        }
    }

    let summary = RunSummary::new(runs);
    renderer.finish(&summary)?;
    write_junit(config.junit_xml.as_deref(), junit.as_ref())?;
    Ok(u8::try_from(summary.exit_code()).unwrap_or(1))
}

/// Aggregate one stream of protocol text, rendering as it goes
///
/// Invalid UTF-8 is replaced rather than rejected.
///
/// # Errors
///
/// Returns `HarnessError::Io` if reading or writing fails.
pub fn format_reader<R: BufRead, W: Write>(
    mut reader: R,
    label: &str,
    verbosity: Verbosity,
    junit_prefix: Option<&str>,
    logdir: Option<&LogDir>,
    renderer: &mut Renderer<W>,
) -> Result<(RunResult, Option<JunitReport>), HarnessError> {
    let mut aggregator = Aggregator::with_verbosity(label, verbosity);
    let mut recorder = junit_prefix.map(|prefix| JunitRecorder::new(prefix, label));
    let mut log = logdir.map(|dir| dir.logger(label));
    let mut buf = Vec::new();
    let mut lines = 0_usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        lines += 1;
        let line = ProtocolLine::from_bytes(&buf);
        let event = classify(line.text());
        if let Some(recorder) = recorder.as_mut() {
            recorder.observe(line.text(), &event);
        }
        if let Some(log) = log.as_mut() {
            log.observe(&event)?;
        }
        for item in aggregator.consume(event) {
            renderer.render(None, &item)?;
        }
    }

    let (result, rest) = aggregator.finish(Termination::Unobserved);
    for item in &rest {
        renderer.render(None, item)?;
    }
    if let Some(log) = log {
        log.finish()?;
    }
    debug!(input = label, lines, "input formatted");
    Ok((result, recorder.map(JunitRecorder::finish)))
}
