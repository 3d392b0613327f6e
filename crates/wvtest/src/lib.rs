// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! wvtest: the WvTest protocol engine
//!
//! This library crate classifies WvTest protocol lines, aggregates check
//! results per stream, wraps long lines for logs and exports JUnit XML. It is
//! pure and synchronous; launching and multiplexing child processes lives in
//! the `wvtool` crate.
//!
//! # Example
//!
//! ```
//! use wvtest::prelude::*;
//!
//! let mut aggregator = Aggregator::new("./t.sh");
//! for line in ["Testing \"math\" in t.c:", "! 1 + 1 == 2 ok", "! 2 + 2 == 5 FAILED"] {
//!     aggregator.consume(classify(line));
//! }
//! let (result, _) = aggregator.finish(Termination::Exited(0));
//! assert_eq!(result.summary_line(), "Total: 2 tests, 1 failed");
//! assert_eq!(result.verdict().exit_code(), 1);
//! ```

pub mod aggregate;
pub mod classify;
pub mod error;
pub mod junit;
pub mod line;
pub mod result;
pub mod wrap;

pub use aggregate::{Aggregator, Emitted, Verbosity};
pub use classify::{ClassifiedEvent, Outcome, classify};
pub use error::ProtocolError;
pub use line::{ProcessTag, ProtocolLine};
pub use result::{Counters, FailureReason, RunResult, RunSummary, Termination, Verdict};
pub use wrap::{DEFAULT_WIDTH, unwrap_chunks, wrap_line};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::aggregate::{Aggregator, Emitted, Verbosity};
    pub use crate::classify::{ClassifiedEvent, Outcome, classify};
    pub use crate::error::ProtocolError;
    pub use crate::line::{ProcessTag, ProtocolLine};
    pub use crate::result::{Counters, RunResult, RunSummary, Termination, Verdict};
    pub use crate::wrap::wrap_line;
}
