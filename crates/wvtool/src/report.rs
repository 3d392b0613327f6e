//! Terminal and log rendering
//!
//! Check lines are padded with dots so the status token always starts in the
//! same column, and wrapped to the output width with the tag repeated on
//! every continuation line.

use std::io::{self, Write};

use console::{Style, Term};
use wvtest::classify::split_prefix;
use wvtest::{DEFAULT_WIDTH, Emitted, Outcome, ProcessTag, RunSummary, wrap_line};

use crate::mux::LineSink;

/// Columns reserved at the end of a check line for the status token
pub const RESULT_SPACE: usize = 10;

/// Prefix of the lines the harness itself writes
pub const HARNESS_NAME: &str = "wvtool";

/// Width of stdout if it is an interactive terminal
#[must_use]
pub fn terminal_width() -> Option<usize> {
    let term = Term::stdout();
    if !term.is_term() {
        return None;
    }
    term.size_checked()
        .map(|(_, cols)| usize::from(cols))
        .filter(|&cols| cols > 0)
}

/// Whether stdout is an interactive terminal
#[must_use]
pub fn stdout_is_terminal() -> bool {
    Term::stdout().is_term()
}

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

/// A single self-overwriting status line naming the section being run
#[derive(Debug)]
pub struct Progress<T: Write = Term> {
    out: T,
    width: usize,
    message: String,
    spin: usize,
    shown: bool,
}

impl Progress<Term> {
    /// Progress on stderr, if it is a terminal
    #[must_use]
    pub fn stderr(width: usize) -> Option<Self> {
        let term = Term::stderr();
        term.is_term().then(|| Self::new(term, width))
    }
}

impl<T: Write> Progress<T> {
    #[must_use]
    pub fn new(out: T, width: usize) -> Self {
        Self {
            out,
            width,
            message: String::new(),
            spin: 0,
            shown: false,
        }
    }

    /// Show `message` from now on
    ///
    /// # Errors
    ///
    /// Returns an IO error if writing fails.
    pub fn set(&mut self, message: String) -> io::Result<()> {
        self.clear()?;
        self.message = message;
        self.spin = 0;
        self.tick()
    }

    /// Advance the spinner
    ///
    /// # Errors
    ///
    /// Returns an IO error if writing fails.
    pub fn tick(&mut self) -> io::Result<()> {
        if self.message.is_empty() {
            return Ok(());
        }
        self.spin = (self.spin + 1) % SPINNER.len();
        let text = self.visible();
        write!(self.out, "{text} {}\r", SPINNER[self.spin])?;
        self.shown = true;
        self.out.flush()
    }

    /// Blank the line so other output can take its place
    ///
    /// # Errors
    ///
    /// Returns an IO error if writing fails.
    pub fn clear(&mut self) -> io::Result<()> {
        if !self.shown {
            return Ok(());
        }
        self.shown = false;
        let blank = " ".repeat(self.visible().chars().count() + 2);
        write!(self.out, "{blank}\r")?;
        self.out.flush()
    }

    fn visible(&self) -> String {
        self.message
            .chars()
            .take(self.width.saturating_sub(3))
            .collect()
    }
}

/// Writes aggregated output as human-readable text
#[derive(Debug)]
pub struct Renderer<W: Write> {
    out: W,
    width: usize,
    color: bool,
    progress: Option<Progress>,
}

impl<W: Write> Renderer<W> {
    #[must_use]
    pub fn new(out: W, width: usize, color: bool) -> Self {
        Self {
            out,
            width: width.max(1),
            color,
            progress: None,
        }
    }

    /// Also keep a progress line naming the current section
    #[must_use]
    pub fn with_progress(mut self, progress: Option<Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Plain renderer for logs: 80 columns, no colors
    #[must_use]
    pub fn plain(out: W) -> Self {
        Self::new(out, DEFAULT_WIDTH, false)
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Give back the underlying writer
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Write a single item
    ///
    /// # Errors
    ///
    /// Returns an IO error if writing fails.
    pub fn render(&mut self, tag: Option<ProcessTag>, item: &Emitted) -> io::Result<()> {
        if let Some(progress) = self.progress.as_mut() {
            progress.clear()?;
        }
        let tag = tag.map(ProcessTag::prefix).unwrap_or_default();
        match item {
            Emitted::Banner { .. } => {
                let line = format!("{tag}{item}");
                writeln!(self.out, "{}", self.style(Style::new().bold()).apply_to(line))
            }
            Emitted::Check {
                prefix,
                description,
                status,
                outcome,
            } => self.check(&format!("{tag}{prefix}! {description} "), status, *outcome),
            Emitted::SectionStatus {
                prefix,
                section,
                source,
                outcome,
            } => {
                let status = if outcome.is_pass() { "ok" } else { "FAILED" };
                self.check(&format!("{tag}{prefix}! {source}  {section} "), status, *outcome)
            }
            Emitted::Malformed { raw } => {
                let raw = self.status_style(Outcome::Fail).apply_to(raw);
                writeln!(self.out, "{tag}{raw}")
            }
            Emitted::Plain(text) => writeln!(self.out, "{tag}{text}"),
        }
    }

    /// Write the failure reasons of every failing stream, then the totals
    ///
    /// # Errors
    ///
    /// Returns an IO error if writing fails.
    pub fn finish(&mut self, summary: &RunSummary) -> io::Result<()> {
        if let Some(progress) = self.progress.as_mut() {
            progress.clear()?;
        }
        let failure = self.style(Style::new().red().bold());
        for (run, reasons) in summary.failures() {
            let tag = run.tag.map(ProcessTag::prefix).unwrap_or_default();
            for reason in reasons {
                let line = format!("{tag}{HARNESS_NAME}: Program '{}': {reason}", run.label);
                writeln!(self.out, "{}", failure.apply_to(line))?;
            }
        }
        let totals = self.style(Style::new().bold());
        writeln!(self.out, "{}", totals.apply_to(summary.summary_line()))?;
        self.out.flush()
    }

    /// Pad `body` with dots so `status` lands in the result column
    fn check(&mut self, body: &str, status: &str, outcome: Outcome) -> io::Result<()> {
        let mut chunks = wrap_line(body, self.width);
        let column = self.width.saturating_sub(RESULT_SPACE);
        if column > 0 {
            let fits = chunks
                .last()
                .is_some_and(|last| last.chars().count() <= column);
            if !fits {
                // A deep indent may leave no room for the dots; keep the tag at least
                let (prefix, _) = split_prefix(body);
                let lead = [prefix, tag_part(prefix)]
                    .into_iter()
                    .find(|lead| lead.chars().count() <= column)
                    .unwrap_or_default();
                chunks.push(lead.to_string());
            }
        }

        let styled = self.status_style(outcome).apply_to(status);
        let Some((last, rest)) = chunks.split_last() else {
            return Ok(());
        };
        for chunk in rest {
            writeln!(self.out, "{chunk}")?;
        }
        writeln!(self.out, "{last:.<column$} {styled}")
    }

    fn status_style(&self, outcome: Outcome) -> Style {
        let style = match outcome {
            Outcome::Pass => Style::new().green().bold(),
            Outcome::Fail => Style::new().red().bold(),
        };
        self.style(style)
    }

    fn style(&self, style: Style) -> Style {
        if self.color {
            style.force_styling(true)
        } else {
            style.force_styling(false)
        }
    }
}

/// The `"(<tag>) "` part of a line prefix
fn tag_part(prefix: &str) -> &str {
    match prefix.strip_prefix('(').and_then(|rest| rest.find(") ")) {
        Some(end) => &prefix[..end + 3],
        None => "",
    }
}

impl<W: Write> LineSink for Renderer<W> {
    fn emit(&mut self, tag: Option<ProcessTag>, item: &Emitted) -> io::Result<()> {
        self.render(tag, item)
    }

    fn section_started(
        &mut self,
        tag: Option<ProcessTag>,
        source: &str,
        section: &str,
    ) -> io::Result<()> {
        match self.progress.as_mut() {
            Some(progress) => {
                let tag = tag.map(ProcessTag::prefix).unwrap_or_default();
                progress.set(format!("{tag}! {source}  {section}"))
            }
            None => Ok(()),
        }
    }

    fn line_seen(&mut self) -> io::Result<()> {
        match self.progress.as_mut() {
            Some(progress) => progress.tick(),
            None => Ok(()),
        }
    }
}
