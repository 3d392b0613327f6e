// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Fuzz target for line classification, aggregation and wrapping
//!
//! Arbitrary text must never panic, counters must stay consistent and
//! wrapped lines must reassemble exactly.

#![no_main]

use libfuzzer_sys::fuzz_target;

use wvtest::{Aggregator, Termination, classify, unwrap_chunks, wrap_line};

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);
    let mut aggregator = Aggregator::new("fuzz");

    for line in input.lines() {
        aggregator.consume(classify(line));
        let counters = aggregator.counters();
        assert!(counters.checked() >= counters.failed());

        let width = (line.len() % 97) + 1;
        assert_eq!(unwrap_chunks(&wrap_line(line, width)), line);
    }

    let _ = aggregator.finish(Termination::Unobserved);
});
