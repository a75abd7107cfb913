//! Adaptive backoff demo: watch the cooldown stretch under a hammering
//! caller and relax once the caller goes quiet.

use monotick::{BackoffConfig, BackoffLimiter, SimClock};

fn main() {
    let sim = SimClock::new(1_000_000);
    // 1ms floor, 64ms ceiling, 5ms pressure window, double after two
    // pressured windows.
    let mut limiter = BackoffLimiter::new(&sim, BackoffConfig::new(1_000, 64_000, 5_000, 2));

    println!("Phase 1: polling every 200us (aggressive)");
    let mut granted = 0;
    for _ in 0..400 {
        if limiter.allowed() {
            granted += 1;
            println!(
                "   granted at t={:>6}us, next delay {}us",
                sim.now(),
                limiter.current_delay_us()
            );
        }
        sim.advance_micros(200);
    }
    println!("   {} grants in 80ms of hammering", granted);

    println!("\nPhase 2: backing off, one poll every 50ms");
    for _ in 0..6 {
        sim.advance_micros(50_000);
        if limiter.allowed() {
            println!(
                "   granted at t={:>6}us, next delay {}us",
                sim.now(),
                limiter.current_delay_us()
            );
        }
    }
    println!("   delay recovered to {}us", limiter.current_delay_us());
}
