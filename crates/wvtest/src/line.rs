//! Raw protocol lines and their origin tags

use std::fmt;

/// Identifies the child process a multiplexed line came from
///
/// This is the child's OS process id when one is known, otherwise the
/// 1-based launch index assigned by the multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessTag(pub u32);

impl ProcessTag {
    /// The `"(<tag>) "` prefix written in front of tagged lines
    #[must_use]
    pub fn prefix(self) -> String {
        format!("({}) ", self.0)
    }
}

impl fmt::Display for ProcessTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One complete line of protocol output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolLine {
    text: String,
    tag: Option<ProcessTag>,
}

impl ProtocolLine {
    /// Create an untagged line
    ///
    /// Any trailing `\n` or `\r\n` is stripped.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: strip_line_ending(text.into()),
            tag: None,
        }
    }

    /// Attribute the line to a child process
    #[must_use]
    pub fn with_tag(mut self, tag: ProcessTag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Build a line from raw bytes, replacing invalid UTF-8
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(String::from_utf8_lossy(bytes).into_owned())
    }

    /// The line text without its line ending
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The originating process, if the line was multiplexed
    #[must_use]
    pub fn tag(&self) -> Option<ProcessTag> {
        self.tag
    }
}

impl fmt::Display for ProtocolLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Some(tag) => write!(f, "{}{}", tag.prefix(), self.text),
            None => f.write_str(&self.text),
        }
    }
}

fn strip_line_ending(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
    }
    if text.ends_with('\r') {
        text.pop();
    }
    text
}
