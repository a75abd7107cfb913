//! Basic usage walkthrough for the monotick crate.
//!
//! Everything runs under simulated time, so the demo finishes
//! instantly while covering minutes of virtual clock.

use monotick::{
    Clock, ProfileRegistry, SimClock, Timeout, TokenBucket, TokenBucketConfig,
};

fn main() {
    println!("=== Monotick Walkthrough ===\n");

    clock_example();
    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    wraparound_example();
    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    timeout_example();
    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    token_bucket_example();
    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    profiling_example();
}

fn clock_example() {
    println!("1. Monotonic Clock:");

    let sim = SimClock::new(1_000_000); // 1 MHz tick source
    println!("   Created a simulated 1 MHz clock");

    let start = sim.now();
    sim.advance_micros(1_500);
    let end = sim.now();

    println!("   Start tick: {}", start);
    println!("   End tick:   {}", end);
    println!(
        "   Elapsed:    {} us",
        sim.clock().elapsed_micros(start, end)
    );
}

fn wraparound_example() {
    println!("2. Surviving the 32-bit Wraparound:");

    let sim = SimClock::new(1_000_000);
    // Park the register one second before the wrap.
    sim.clock().reinit(u32::MAX as u64 - 1_000_000);

    let before = sim.now();
    sim.advance_micros(2_000_000);
    let after = sim.now();

    println!("   Register before: 0x{:08X}", before as u32);
    println!("   Register after:  0x{:08X}", after as u32);
    println!(
        "   64-bit elapsed:  {} us (exactly 2 seconds, wrap and all)",
        sim.clock().elapsed_micros(before, after)
    );
}

fn timeout_example() {
    println!("3. Non-Blocking Timeouts:");

    let sim = SimClock::new(1_000_000);
    let timeout = Timeout::after(&sim, 500);

    let mut polls = 0;
    while !timeout.is_done(&sim) {
        polls += 1;
        sim.advance_micros(100);
    }
    println!("   500us timeout expired after {} polls at 100us", polls);
}

fn token_bucket_example() {
    println!("4. Token Bucket Rate Limiting:");

    let sim = SimClock::new(1_000_000);
    // 1 event per 10 seconds sustained, bursts of up to 4.
    let mut bucket = TokenBucket::new(&sim, TokenBucketConfig::new(1, 10_000_000, 4));

    for request in 1..=6 {
        if bucket.allowed(1) {
            println!("   Request {} - allowed", request);
        } else {
            println!("   Request {} - rate limited", request);
        }
    }

    println!("   ... 10 virtual seconds pass ...");
    sim.advance_micros(10_000_000);
    println!(
        "   One more request - {}",
        if bucket.allowed(1) { "allowed" } else { "rate limited" }
    );
}

fn profiling_example() {
    println!("5. Call Profiling:");

    let sim = SimClock::new(1_000_000);
    let registry = ProfileRegistry::new();
    let sensor = registry.register("sensor_read").unwrap();
    let flush = registry.register("uart_flush").unwrap();

    for _ in 0..120 {
        sensor.begin(&sim);
        sim.advance_micros(250);
        sensor.end(&sim);
    }
    for _ in 0..3 {
        flush.begin(&sim);
        sim.advance_micros(1_800);
        flush.end(&sim);
    }

    println!("{}", registry.report());
}
