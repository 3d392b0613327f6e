//! Run results and verdicts

use std::fmt;

use crate::classify::Outcome;
use crate::line::ProcessTag;

/// Running check totals for one stream
///
/// `checked >= failed` holds at all times: the only mutator records a check
/// and its failure together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    checked: u64,
    failed: u64,
}

impl Counters {
    /// Record the outcome of one check
    pub fn record(&mut self, outcome: Outcome) {
        self.checked += 1;
        if outcome == Outcome::Fail {
            self.failed += 1;
        }
    }

    /// Number of checks seen
    #[must_use]
    pub fn checked(&self) -> u64 {
        self.checked
    }

    /// Number of failed checks seen
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Sum two sets of counters
    #[must_use]
    pub fn merged(self, other: Counters) -> Counters {
        Counters {
            checked: self.checked + other.checked,
            failed: self.failed + other.failed,
        }
    }
}

/// How a stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The child exited with this code
    Exited(i32),
    /// The child was killed by this signal
    Signaled(i32),
    /// The child produced no output for too long and was killed
    TimedOut,
    /// The harness was interrupted before the child finished
    Cancelled,
    /// No child process: the stream was read from a file or stdin
    Unobserved,
}

impl Termination {
    /// Whether the stream ended the way a healthy run ends
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Termination::Exited(0) | Termination::Unobserved)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with code {code}"),
            Termination::Signaled(signal) => write!(f, "terminated by signal {signal}"),
            Termination::TimedOut => f.write_str("timed out"),
            Termination::Cancelled => f.write_str("cancelled"),
            Termination::Unobserved => f.write_str("end of input"),
        }
    }
}

/// Why a stream counts as failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// At least one check failed
    FailedChecks(u64),
    /// The stream never reported a single check
    ZeroChecks,
    /// The child exited normally, but not with code 0
    NonZeroExit(i32),
    /// The child was killed, timed out, or the run was interrupted
    PrematureTermination(Termination),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::FailedChecks(n) => {
                write!(f, "{n} failed check{}", if *n == 1 { "" } else { "s" })
            }
            FailureReason::ZeroChecks => f.write_str("no checks were recorded"),
            FailureReason::NonZeroExit(code) => {
                write!(f, "returned non-zero exit code {code}")
            }
            FailureReason::PrematureTermination(termination) => write!(f, "{termination}"),
        }
    }
}

/// Overall judgement of one or more streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Checks were recorded, none failed, and everything exited cleanly
    Pass,
    /// Every reason the run failed
    Fail(Vec<FailureReason>),
}

impl Verdict {
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    /// Process exit code for this verdict
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_pass() { 0 } else { 1 }
    }
}

/// Per-section tallies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionResult {
    /// Section name
    pub name: String,
    /// Where the section lives
    pub source: String,
    /// Checks recorded while this section was current
    pub counters: Counters,
}

impl SectionResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.counters.failed() == 0
    }
}

/// Final snapshot of one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Human label, usually the command line
    pub label: String,
    /// Originating process, when multiplexed
    pub tag: Option<ProcessTag>,
    /// Totals for the whole stream
    pub counters: Counters,
    /// Every section that saw output, in order
    pub sections: Vec<SectionResult>,
    /// How the stream ended
    pub termination: Termination,
}

impl RunResult {
    /// Judge this stream
    ///
    /// A stream passes only if it recorded at least one check, none failed,
    /// and it terminated cleanly.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        let mut reasons = Vec::new();
        if self.counters.failed() > 0 {
            reasons.push(FailureReason::FailedChecks(self.counters.failed()));
        }
        match self.termination {
            Termination::Exited(0) | Termination::Unobserved => {}
            Termination::Exited(code) => reasons.push(FailureReason::NonZeroExit(code)),
            other => reasons.push(FailureReason::PrematureTermination(other)),
        }
        if self.counters.checked() == 0 && self.termination != Termination::Cancelled {
            reasons.push(FailureReason::ZeroChecks);
        }

        if reasons.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail(reasons)
        }
    }

    /// Number of sections containing a failed check
    #[must_use]
    pub fn sections_failed(&self) -> usize {
        self.sections.iter().filter(|s| !s.passed()).count()
    }

    #[must_use]
    pub fn summary_line(&self) -> String {
        summary_line(self.counters)
    }
}

/// Aggregate over every stream of an invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// One entry per stream, in completion order
    pub runs: Vec<RunResult>,
}

impl RunSummary {
    #[must_use]
    pub fn new(runs: Vec<RunResult>) -> Self {
        Self { runs }
    }

    /// Totals across streams
    ///
    /// Cancelled streams are incomplete and contribute nothing.
    #[must_use]
    pub fn totals(&self) -> Counters {
        self.runs
            .iter()
            .filter(|r| r.termination != Termination::Cancelled)
            .fold(Counters::default(), |acc, r| acc.merged(r.counters))
    }

    /// Logical OR of every stream's failure
    ///
    /// An invocation with no streams at all fails for lack of checks.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self.runs.is_empty() {
            return Verdict::Fail(vec![FailureReason::ZeroChecks]);
        }
        let reasons: Vec<FailureReason> = self
            .runs
            .iter()
            .filter_map(|r| match r.verdict() {
                Verdict::Pass => None,
                Verdict::Fail(reasons) => Some(reasons),
            })
            .flatten()
            .collect();
        if reasons.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail(reasons)
        }
    }

    /// Streams that did not pass, with their reasons
    #[must_use]
    pub fn failures(&self) -> Vec<(&RunResult, Vec<FailureReason>)> {
        self.runs
            .iter()
            .filter_map(|r| match r.verdict() {
                Verdict::Pass => None,
                Verdict::Fail(reasons) => Some((r, reasons)),
            })
            .collect()
    }

    #[must_use]
    pub fn summary_line(&self) -> String {
        summary_line(self.totals())
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.verdict().exit_code()
    }
}

/// Format `Total: <checked> tests, <failed> failed`
#[must_use]
pub fn summary_line(counters: Counters) -> String {
    format!(
        "Total: {} tests, {} failed",
        counters.checked(),
        counters.failed()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(checked: u64, failed: u64, termination: Termination) -> RunResult {
        let mut counters = Counters::default();
        for i in 0..checked {
            counters.record(if i < failed { Outcome::Fail } else { Outcome::Pass });
        }
        RunResult {
            label: "t".to_string(),
            tag: None,
            counters,
            sections: Vec::new(),
            termination,
        }
    }

    #[test]
    fn test_counters_record() {
        let mut counters = Counters::default();
        counters.record(Outcome::Pass);
        counters.record(Outcome::Fail);
        assert_eq!(counters.checked(), 2);
        assert_eq!(counters.failed(), 1);
    }

    #[test]
    fn test_clean_run_passes() {
        assert_eq!(run(3, 0, Termination::Exited(0)).verdict(), Verdict::Pass);
        assert_eq!(run(3, 0, Termination::Unobserved).verdict(), Verdict::Pass);
    }

    #[test]
    fn test_zero_checks_fails() {
        let verdict = run(0, 0, Termination::Exited(0)).verdict();
        assert_eq!(verdict, Verdict::Fail(vec![FailureReason::ZeroChecks]));
        assert_eq!(verdict.exit_code(), 1);
    }

    #[test]
    fn test_failed_checks_fail() {
        let verdict = run(2, 1, Termination::Exited(0)).verdict();
        assert_eq!(verdict, Verdict::Fail(vec![FailureReason::FailedChecks(1)]));
    }

    #[test]
    fn test_non_zero_exit_fails() {
        let verdict = run(2, 0, Termination::Exited(3)).verdict();
        assert_eq!(verdict, Verdict::Fail(vec![FailureReason::NonZeroExit(3)]));
    }

    #[test]
    fn test_signal_is_premature_termination() {
        let result = run(1, 0, Termination::Signaled(9));
        assert_eq!(result.counters.checked(), 1);
        assert_eq!(result.counters.failed(), 0);
        assert_eq!(
            result.verdict(),
            Verdict::Fail(vec![FailureReason::PrematureTermination(
                Termination::Signaled(9)
            )])
        );
    }

    #[test]
    fn test_summary_totals_and_or_of_failures() {
        let summary = RunSummary::new(vec![
            run(3, 0, Termination::Exited(0)),
            run(2, 0, Termination::Exited(0)),
        ]);
        assert_eq!(summary.summary_line(), "Total: 5 tests, 0 failed");
        assert_eq!(summary.exit_code(), 0);

        let summary = RunSummary::new(vec![
            run(3, 0, Termination::Exited(0)),
            run(0, 0, Termination::Exited(0)),
        ]);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.failures().len(), 1);
    }

    #[test]
    fn test_cancelled_counters_are_discarded() {
        let summary = RunSummary::new(vec![
            run(3, 0, Termination::Exited(0)),
            run(4, 0, Termination::Cancelled),
        ]);
        assert_eq!(summary.totals().checked(), 3);
        assert_eq!(
            summary.verdict(),
            Verdict::Fail(vec![FailureReason::PrematureTermination(
                Termination::Cancelled
            )])
        );
    }

    #[test]
    fn test_empty_summary_fails() {
        let summary = RunSummary::default();
        assert_eq!(summary.summary_line(), "Total: 0 tests, 0 failed");
        assert_eq!(summary.exit_code(), 1);
    }
}
