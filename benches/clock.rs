//! # Clock Benchmarks
//!
//! Hot-path cost of the timestamp engine: the sequence-lock read, the
//! timeout poll built on it, and the read while wrap events are being
//! delivered from another thread.
//!
//! Run with: `cargo bench --bench clock`

use criterion::{criterion_group, criterion_main, Criterion};
use monotick::{Clock, SimClock, Timeout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Benchmark the uncontended sequence-lock read.
fn bench_now(c: &mut Criterion) {
    let sim = SimClock::new(1_000_000);
    sim.advance_ticks(0x1234_5678);

    c.bench_function("now_uncontended", |b| {
        b.iter(|| std::hint::black_box(sim.now()))
    });
}

/// Benchmark the read while a writer keeps delivering wrap events.
fn bench_now_with_writer(c: &mut Criterion) {
    let sim = Arc::new(SimClock::new(1_000_000));
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let sim = Arc::clone(&sim);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                // Quarter-range hops hit a halfway or overflow event
                // every other step.
                sim.advance_ticks(1 << 30);
            }
        })
    };

    c.bench_function("now_with_wrap_traffic", |b| {
        b.iter(|| std::hint::black_box(sim.now()))
    });

    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

/// Benchmark timeout polling, one comparison over now().
fn bench_timeout_poll(c: &mut Criterion) {
    let sim = SimClock::new(1_000_000);
    let timeout = Timeout::after(&sim, 1_000_000);

    c.bench_function("timeout_poll", |b| {
        b.iter(|| std::hint::black_box(timeout.is_done(&sim)))
    });
}

/// Benchmark the microsecond conversion of a tick difference.
fn bench_elapsed_micros(c: &mut Criterion) {
    let sim = SimClock::new(1_000_000);
    sim.advance_ticks(5_000_000);
    let start = sim.now();
    sim.advance_ticks(5_000_000);
    let end = sim.now();

    c.bench_function("elapsed_micros", |b| {
        b.iter(|| std::hint::black_box(sim.clock().elapsed_micros(start, end)))
    });
}

criterion_group!(
    benches,
    bench_now,
    bench_now_with_writer,
    bench_timeout_poll,
    bench_elapsed_micros
);
criterion_main!(benches);
