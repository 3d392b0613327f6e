// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use wvtest::{Aggregator, Termination, classify, wrap_line};

fn sample_log(sections: usize, checks: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for s in 0..sections {
        lines.push(format!("(4242) Testing \"section {s}\" in tests/t{s}.c:"));
        for c in 0..checks {
            let status = if c % 17 == 0 { "FAILED" } else { "ok" };
            lines.push(format!("(4242) #   ! check {c} of section {s} {status}"));
        }
        lines.push("some diagnostic output".to_string());
    }
    lines
}

fn bench_classify(c: &mut Criterion) {
    let lines = sample_log(20, 50);
    c.bench_function("classify_log", |b| {
        b.iter(|| {
            for line in &lines {
                black_box(classify(black_box(line)));
            }
        })
    });
}

fn bench_aggregate(c: &mut Criterion) {
    let lines = sample_log(20, 50);
    c.bench_function("aggregate_log", |b| {
        b.iter(|| {
            let mut aggregator = Aggregator::new("bench");
            for line in &lines {
                black_box(aggregator.consume(classify(line)));
            }
            black_box(aggregator.finish(Termination::Exited(0)))
        })
    });
}

fn bench_wrap(c: &mut Criterion) {
    let line = format!("(4242) ! {} ok", "long description ".repeat(30));
    c.bench_function("wrap_long_line", |b| {
        b.iter(|| black_box(wrap_line(black_box(&line), 80)))
    });
}

criterion_group!(benches, bench_classify, bench_aggregate, bench_wrap);
criterion_main!(benches);
