//! Result aggregation for a single protocol stream
//!
//! An [`Aggregator`] consumes classified events in arrival order, keeps the
//! running [`Counters`] and the current section, and hands back what should
//! be written to the output. It never rewinds: once a check is counted as
//! failed it stays failed.
//!
//! # Example
//!
//! ```
//! use wvtest::aggregate::Aggregator;
//! use wvtest::classify::classify;
//! use wvtest::result::Termination;
//!
//! let mut aggregator = Aggregator::new("./t.sh");
//! aggregator.consume(classify("! step one ok"));
//! aggregator.consume(classify("! step two FAILED"));
//! let (result, _) = aggregator.finish(Termination::Exited(0));
//! assert_eq!(result.summary_line(), "Total: 2 tests, 1 failed");
//! assert!(!result.verdict().is_pass());
//! ```

use std::fmt;

use crate::classify::{ClassifiedEvent, Outcome};
use crate::result::{Counters, RunResult, SectionResult, Termination};

/// Source shown for the implicit section opened before the first banner
pub const PREAMBLE_SOURCE: &str = "wvtool";

/// How much of a stream is echoed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    /// One status line per section
    Summary,
    /// Passing sections collapse to a status line, failing ones are shown in full
    Failures,
    /// Every line is echoed as it arrives
    #[default]
    Full,
}

/// Something the aggregator wants written out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emitted {
    /// A section banner
    Banner {
        prefix: String,
        section: String,
        source: String,
    },
    /// A well-formed check
    Check {
        prefix: String,
        description: String,
        status: String,
        outcome: Outcome,
    },
    /// A Result line that could not be fully interpreted, exactly as read
    Malformed { raw: String },
    /// Text that is not part of the protocol
    Plain(String),
    /// Collapsed outcome of a whole section
    SectionStatus {
        prefix: String,
        section: String,
        source: String,
        outcome: Outcome,
    },
}

impl Emitted {
    /// Outcome carried by this item, if it reports one
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Emitted::Check { outcome, .. } | Emitted::SectionStatus { outcome, .. } => {
                Some(*outcome)
            }
            Emitted::Malformed { .. } => Some(Outcome::Fail),
            Emitted::Banner { .. } | Emitted::Plain(_) => None,
        }
    }
}

/// The line as it is echoed in full verbosity
impl From<ClassifiedEvent> for Emitted {
    fn from(event: ClassifiedEvent) -> Self {
        match event {
            ClassifiedEvent::Banner {
                prefix,
                section,
                source,
            } => Emitted::Banner {
                prefix,
                section,
                source,
            },
            ClassifiedEvent::Result {
                prefix,
                description,
                status: Some(status),
                outcome,
                malformed: false,
                ..
            } => Emitted::Check {
                prefix,
                description,
                status,
                outcome,
            },
            ClassifiedEvent::Result { raw, .. } => Emitted::Malformed { raw },
            ClassifiedEvent::Plain { text } => Emitted::Plain(text),
        }
    }
}

impl fmt::Display for Emitted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emitted::Banner {
                prefix,
                section,
                source,
            } => write!(f, "{prefix}Testing \"{section}\" in {source}:"),
            Emitted::Check {
                prefix,
                description,
                status,
                ..
            } => write!(f, "{prefix}! {description} {status}"),
            Emitted::Malformed { raw } => f.write_str(raw),
            Emitted::Plain(text) => f.write_str(text),
            Emitted::SectionStatus {
                prefix,
                section,
                source,
                outcome,
            } => write!(
                f,
                "{prefix}! {source}  {section} {}",
                if outcome.is_pass() { "ok" } else { "FAILED" }
            ),
        }
    }
}

#[derive(Debug)]
struct OpenSection {
    prefix: String,
    name: String,
    source: String,
    counters: Counters,
    held: Vec<Emitted>,
}

/// Accumulates counts for one stream
#[derive(Debug)]
pub struct Aggregator {
    label: String,
    verbosity: Verbosity,
    counters: Counters,
    current: Option<OpenSection>,
    sections: Vec<SectionResult>,
    opened: usize,
    seen_banner_or_output: bool,
}

impl Aggregator {
    /// Create an aggregator echoing every line
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_verbosity(label, Verbosity::Full)
    }

    #[must_use]
    pub fn with_verbosity(label: impl Into<String>, verbosity: Verbosity) -> Self {
        Self {
            label: label.into(),
            verbosity,
            counters: Counters::default(),
            current: None,
            sections: Vec::new(),
            opened: 0,
            seen_banner_or_output: false,
        }
    }

    /// The stream label, usually the command line
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Live totals
    #[must_use]
    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Name of the section checks are currently attributed to
    #[must_use]
    pub fn current_section(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.name.as_str())
    }

    /// Where the current section lives
    #[must_use]
    pub fn current_source(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.source.as_str())
    }

    /// Number of sections started so far, the implicit preamble included
    #[must_use]
    pub fn sections_opened(&self) -> usize {
        self.opened
    }

    /// Consume one event and return what should be written out
    pub fn consume(&mut self, event: ClassifiedEvent) -> Vec<Emitted> {
        let mut out = Vec::new();

        if !self.seen_banner_or_output {
            match &event {
                ClassifiedEvent::Banner { .. } => self.seen_banner_or_output = true,
                ClassifiedEvent::Plain { text } if text.is_empty() => {
                    if self.verbosity == Verbosity::Full {
                        out.push(Emitted::Plain(String::new()));
                    }
                    return out;
                }
                _ => {
                    self.seen_banner_or_output = true;
                    let section = format!("Preamble of {}", self.label);
                    self.open_section(String::new(), section, PREAMBLE_SOURCE.to_string(), &mut out);
                }
            }
        }

        match event {
            ClassifiedEvent::Banner {
                prefix,
                section,
                source,
            } => {
                self.close_section(&mut out);
                self.open_section(prefix, section, source, &mut out);
            }
            event @ ClassifiedEvent::Result { .. } => {
                let item = Emitted::from(event);
                if let Emitted::Malformed { raw } = &item {
                    tracing::warn!(stream = %self.label, line = %raw, "malformed result line counted as failure");
                }
                let outcome = item.outcome().unwrap_or(Outcome::Fail);
                self.counters.record(outcome);
                if let Some(section) = self.current.as_mut() {
                    section.counters.record(outcome);
                }
                self.echo(item, &mut out);
            }
            ClassifiedEvent::Plain { text } => self.echo(Emitted::Plain(text), &mut out),
        }

        out
    }

    /// Close the stream and produce its final snapshot
    ///
    /// The returned items are whatever was still held back for the last
    /// section.
    pub fn finish(mut self, termination: Termination) -> (RunResult, Vec<Emitted>) {
        let mut out = Vec::new();
        self.close_section(&mut out);
        tracing::debug!(
            stream = %self.label,
            checked = self.counters.checked(),
            failed = self.counters.failed(),
            %termination,
            "stream finished"
        );
        let result = RunResult {
            label: self.label,
            tag: None,
            counters: self.counters,
            sections: self.sections,
            termination,
        };
        (result, out)
    }

    fn open_section(
        &mut self,
        prefix: String,
        name: String,
        source: String,
        out: &mut Vec<Emitted>,
    ) {
        tracing::debug!(stream = %self.label, section = %name, %source, "section started");
        self.opened += 1;
        let mut section = OpenSection {
            prefix: prefix.clone(),
            name: name.clone(),
            source: source.clone(),
            counters: Counters::default(),
            held: Vec::new(),
        };
        let banner = Emitted::Banner {
            prefix,
            section: name,
            source,
        };
        match self.verbosity {
            Verbosity::Full => out.push(banner),
            Verbosity::Failures => section.held.push(banner),
            Verbosity::Summary => {}
        }
        self.current = Some(section);
    }

    fn close_section(&mut self, out: &mut Vec<Emitted>) {
        let Some(section) = self.current.take() else {
            return;
        };
        let outcome = if section.counters.failed() == 0 {
            Outcome::Pass
        } else {
            Outcome::Fail
        };
        let status = || Emitted::SectionStatus {
            prefix: section.prefix.clone(),
            section: section.name.clone(),
            source: section.source.clone(),
            outcome,
        };
        match self.verbosity {
            Verbosity::Full => {}
            Verbosity::Failures if outcome == Outcome::Fail => {
                out.extend(section.held.iter().cloned());
            }
            Verbosity::Failures | Verbosity::Summary => out.push(status()),
        }
        self.sections.push(SectionResult {
            name: section.name,
            source: section.source,
            counters: section.counters,
        });
    }

    fn echo(&mut self, item: Emitted, out: &mut Vec<Emitted>) {
        match self.verbosity {
            Verbosity::Full => out.push(item),
            Verbosity::Failures => {
                if let Some(section) = self.current.as_mut() {
                    section.held.push(item);
                } else {
                    out.push(item);
                }
            }
            Verbosity::Summary => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::result::Verdict;
    use similar_asserts::assert_eq;

    fn feed(aggregator: &mut Aggregator, lines: &[&str]) -> Vec<String> {
        lines
            .iter()
            .flat_map(|line| aggregator.consume(classify(line)))
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn test_counts_results() {
        let mut aggregator = Aggregator::new("t");
        feed(
            &mut aggregator,
            &[r#"Testing "a" in a.c:"#, "! one ok", "! two FAILED", "noise", "! three ok"],
        );
        assert_eq!(aggregator.counters().checked(), 3);
        assert_eq!(aggregator.counters().failed(), 1);
    }

    #[test]
    fn test_full_echoes_everything() {
        let mut aggregator = Aggregator::new("t");
        let out = feed(
            &mut aggregator,
            &[r#"Testing "a" in a.c:"#, "! one   ok", "plain text"],
        );
        assert_eq!(
            out,
            vec![
                r#"Testing "a" in a.c:"#.to_string(),
                "! one ok".to_string(),
                "plain text".to_string(),
            ]
        );
    }

    #[test]
    fn test_output_before_banner_opens_preamble() {
        let mut aggregator = Aggregator::new("./t.sh");
        let out = feed(&mut aggregator, &["", "starting", r#"Testing "a" in a.c:"#]);
        assert_eq!(
            out,
            vec![
                String::new(),
                r#"Testing "Preamble of ./t.sh" in wvtool:"#.to_string(),
                "starting".to_string(),
                r#"Testing "a" in a.c:"#.to_string(),
            ]
        );
        let (result, _) = aggregator.finish(Termination::Exited(0));
        let names: Vec<&str> = result.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Preamble of ./t.sh", "a"]);
    }

    #[test]
    fn test_blank_lines_alone_open_no_section() {
        let mut aggregator = Aggregator::new("t");
        feed(&mut aggregator, &["", ""]);
        let (result, _) = aggregator.finish(Termination::Exited(0));
        assert!(result.sections.is_empty());
        assert_eq!(result.verdict(), Verdict::Fail(vec![crate::result::FailureReason::ZeroChecks]));
    }

    #[test]
    fn test_sections_are_flat_last_seen_wins() {
        let mut aggregator = Aggregator::new("t");
        feed(
            &mut aggregator,
            &[
                r#"Testing "a" in a.c:"#,
                "! a1 FAILED",
                r#"Testing "b" in b.c:"#,
                "! b1 ok",
                "! b2 ok",
            ],
        );
        assert_eq!(aggregator.current_section(), Some("b"));
        let (result, _) = aggregator.finish(Termination::Exited(0));
        assert_eq!(result.sections.len(), 2);
        assert_eq!(result.sections[0].counters.failed(), 1);
        assert_eq!(result.sections[1].counters.checked(), 2);
        assert_eq!(result.sections_failed(), 1);
    }

    #[test]
    fn test_malformed_line_is_counted_and_kept_verbatim() {
        let mut aggregator = Aggregator::new("t");
        let lines = [r#"Testing "a" in a.c:"#, "! ok", "!", "!FAILED", "!   ok   ", "!\tok"];
        let out = feed(&mut aggregator, &lines);
        assert_eq!(out, lines.map(String::from).to_vec());
        assert_eq!(aggregator.counters().checked(), 5);
        assert_eq!(aggregator.counters().failed(), 5);
    }

    #[test]
    fn test_sections_opened_counts_preamble_and_repeats() {
        let mut aggregator = Aggregator::with_verbosity("t", Verbosity::Summary);
        feed(&mut aggregator, &["", "noise"]);
        assert_eq!(aggregator.sections_opened(), 1);
        assert_eq!(aggregator.current_source(), Some(PREAMBLE_SOURCE));
        feed(&mut aggregator, &[r#"Testing "a" in a.c:"#, r#"Testing "a" in a.c:"#]);
        assert_eq!(aggregator.sections_opened(), 3);
        assert_eq!(aggregator.current_source(), Some("a.c"));
    }

    #[test]
    fn test_full_echo_matches_event_conversion() {
        let lines = [r#"(2) Testing "a" in a.c:"#, "#   ! x .... ok", "! ok", "text"];
        let mut aggregator = Aggregator::new("t");
        for line in lines {
            let expected = Emitted::from(classify(line));
            assert_eq!(aggregator.consume(classify(line)), vec![expected]);
        }
    }

    #[test]
    fn test_summary_verbosity() {
        let mut aggregator = Aggregator::with_verbosity("t", Verbosity::Summary);
        let mut out = feed(
            &mut aggregator,
            &[
                r#"Testing "a" in a.c:"#,
                "! a1 ok",
                r#"Testing "b" in b.c:"#,
                "! b1 FAILED",
            ],
        );
        let (_, rest) = aggregator.finish(Termination::Exited(0));
        out.extend(rest.iter().map(ToString::to_string));
        assert_eq!(
            out,
            vec!["! a.c  a ok".to_string(), "! b.c  b FAILED".to_string()]
        );
    }

    #[test]
    fn test_failures_verbosity_expands_failing_sections() {
        let mut aggregator = Aggregator::with_verbosity("t", Verbosity::Failures);
        let mut out = feed(
            &mut aggregator,
            &[
                r#"Testing "a" in a.c:"#,
                "! a1 ok",
                "chatter",
                r#"Testing "b" in b.c:"#,
                "why it broke",
                "! b1 FAILED",
            ],
        );
        let (_, rest) = aggregator.finish(Termination::Exited(0));
        out.extend(rest.iter().map(ToString::to_string));
        assert_eq!(
            out,
            vec![
                "! a.c  a ok".to_string(),
                r#"Testing "b" in b.c:"#.to_string(),
                "why it broke".to_string(),
                "! b1 FAILED".to_string(),
            ]
        );
    }

    #[test]
    fn test_checked_never_below_failed() {
        let mut aggregator = Aggregator::new("t");
        for line in ["! a FAILED", "!", "! b ok", "! ok", "x"] {
            aggregator.consume(classify(line));
            let counters = aggregator.counters();
            assert!(counters.checked() >= counters.failed());
        }
    }

    #[test]
    fn test_finish_reports_termination() {
        let mut aggregator = Aggregator::new("t");
        feed(&mut aggregator, &["! a ok"]);
        let (result, _) = aggregator.finish(Termination::Signaled(9));
        assert_eq!(result.counters.checked(), 1);
        assert!(!result.verdict().is_pass());
    }
}
