// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! WvTest line classification
//!
//! Every protocol line is exactly one of:
//! - a **Result** line: `! <description> <status>`
//! - a **Banner** line: `Testing "<section>" in <file>:`
//! - a **Plain** line: anything else
//!
//! Both structural forms may be preceded by a process tag `"(<pid>) "` and by
//! any number of `"#   "` indentation markers written by nested emitters.
//!
//! # Example
//!
//! ```
//! use wvtest::classify::{classify, ClassifiedEvent, Outcome};
//!
//! match classify("(42) ! widget renders ok") {
//!     ClassifiedEvent::Result { prefix, description, outcome, .. } => {
//!         assert_eq!(prefix, "(42) ");
//!         assert_eq!(description, "widget renders");
//!         assert_eq!(outcome, Outcome::Pass);
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

/// Indentation marker written by nested protocol emitters
pub const INDENT_MARKER: &str = "#   ";

/// The canonical passing status token
pub const PASS_TOKEN: &str = "ok";

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The check passed
    Pass,
    /// The check failed, or its line could not be interpreted
    Fail,
}

impl Outcome {
    /// Interpret a status token
    ///
    /// Only `ok` (ASCII case-insensitive) passes; every other token fails.
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        if status.eq_ignore_ascii_case(PASS_TOKEN) {
            Outcome::Pass
        } else {
            Outcome::Fail
        }
    }

    #[must_use]
    pub fn is_pass(self) -> bool {
        self == Outcome::Pass
    }
}

/// A classified protocol line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedEvent {
    /// Start of a new test section
    Banner {
        /// Recognised tag/indent prefix
        prefix: String,
        /// Section name (the quoted part)
        section: String,
        /// Where the section lives, usually a source file
        source: String,
    },
    /// Outcome of one check
    Result {
        /// Recognised tag/indent prefix
        prefix: String,
        /// Free-text description, alignment padding removed
        description: String,
        /// The final token, `None` when the line ended after `!`
        status: Option<String>,
        /// Pass only for the canonical pass token
        outcome: Outcome,
        /// No description or no status token was found
        malformed: bool,
        /// The unmodified line
        raw: String,
    },
    /// Anything else, kept verbatim
    Plain {
        /// The unmodified line
        text: String,
    },
}

impl ClassifiedEvent {
    /// A Result line that lacks a description or a status token
    ///
    /// Such lines always count as failures.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, ClassifiedEvent::Result { malformed: true, .. })
    }

    /// The outcome of a Result line, `None` for other events
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            ClassifiedEvent::Result { outcome, .. } => Some(*outcome),
            _ => None,
        }
    }
}

/// Length in bytes of the tag/indent prefix at the start of `line`
///
/// The prefix is an optional `"(<digits>) "` followed by zero or more
/// [`INDENT_MARKER`]s.
#[must_use]
pub fn prefix_len(line: &str) -> usize {
    let mut len = 0;
    if let Some(after) = line.strip_prefix('(') {
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 && after[digits..].starts_with(") ") {
            len = digits + 3;
        }
    }
    while line[len..].starts_with(INDENT_MARKER) {
        len += INDENT_MARKER.len();
    }
    len
}

/// Split `line` into its recognised prefix and the remainder
#[must_use]
pub fn split_prefix(line: &str) -> (&str, &str) {
    line.split_at(prefix_len(line))
}

/// Classify one line of text (without its line ending)
#[must_use]
pub fn classify(line: &str) -> ClassifiedEvent {
    let (prefix, body) = split_prefix(line);

    if let Some(rest) = body.strip_prefix('!') {
        return parse_result(line, prefix, rest);
    }

    if let Some((section, source)) = parse_banner(body) {
        return ClassifiedEvent::Banner {
            prefix: prefix.to_string(),
            section: section.to_string(),
            source: source.to_string(),
        };
    }

    ClassifiedEvent::Plain {
        text: line.to_string(),
    }
}

fn parse_result(line: &str, prefix: &str, rest: &str) -> ClassifiedEvent {
    let rest = rest.trim();

    let (text, status) = match rest.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
        Some((idx, ws)) => (rest[..idx].trim(), &rest[idx + ws.len_utf8()..]),
        None => ("", rest),
    };
    // Emptiness is judged before the alignment padding goes: "! ... ok" passes
    let malformed = text.is_empty() || status.is_empty();
    let description = text.trim_end_matches(['.', ' ', '\t']);

    let status = (!status.is_empty()).then(|| status.to_string());
    let outcome = match &status {
        Some(token) if !malformed => Outcome::from_status(token),
        _ => Outcome::Fail,
    };

    ClassifiedEvent::Result {
        prefix: prefix.to_string(),
        description: description.to_string(),
        status,
        outcome,
        malformed,
        raw: line.to_string(),
    }
}

/// Parse `Testing "<section>" in <source>:` into its two parts
fn parse_banner(body: &str) -> Option<(&str, &str)> {
    let inner = body
        .trim()
        .strip_prefix("Testing \"")?
        .strip_suffix(':')?;
    let split = inner.rfind("\" in ")?;
    Some((&inner[..split], &inner[split + 5..]))
}
