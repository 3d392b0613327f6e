//! Wrapping of long protocol lines
//!
//! Long Result lines are cut into chunks of at most `width` characters.
//! Every continuation chunk repeats the line's tag/indent prefix so that
//! searching a log for `"(1234) "` still finds every fragment.

use crate::classify::split_prefix;

/// Width used when no terminal width is available
pub const DEFAULT_WIDTH: usize = 80;

/// Split `line` into chunks no longer than `width` characters
///
/// Lines that already fit are returned unchanged as a single chunk. The
/// first chunk is the first `width` characters of the line; each following
/// chunk is the prefix plus as much of the remainder as fits. When the prefix
/// alone fills the width there is no room to repeat it, and the line is
/// returned unwrapped.
#[must_use]
pub fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    if line.chars().count() <= width {
        return vec![line.to_string()];
    }

    let (prefix, _) = split_prefix(line);
    let room = width.saturating_sub(prefix.chars().count());
    if room == 0 {
        return vec![line.to_string()];
    }

    let mut chars = line.chars();
    let mut chunks = vec![chars.by_ref().take(width).collect::<String>()];
    loop {
        let piece: String = chars.by_ref().take(room).collect();
        if piece.is_empty() {
            break;
        }
        chunks.push(format!("{prefix}{piece}"));
    }
    chunks
}

/// Reassemble chunks produced by [`wrap_line`]
///
/// The prefix of the first chunk is stripped from every later chunk before
/// concatenation.
#[must_use]
pub fn unwrap_chunks(chunks: &[String]) -> String {
    let Some((first, rest)) = chunks.split_first() else {
        return String::new();
    };
    let (prefix, _) = split_prefix(first);
    let mut line = first.clone();
    for chunk in rest {
        line.push_str(chunk.strip_prefix(prefix).unwrap_or(chunk));
    }
    line
}
