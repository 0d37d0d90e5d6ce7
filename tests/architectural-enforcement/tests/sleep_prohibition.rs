//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the conductor MUST NOT block a thread to
//! wait. Pauses between fragments, animation intervals, and deadlines all use
//! `tokio::time`, so paused-clock tests stay deterministic and a turn can be
//! interrupted mid-pause.

use architectural_enforcement::{assert_clean, scan_production};

#[test]
fn test_no_thread_sleep_in_production_code() {
    let violations = scan_production(&["std::thread::sleep", "thread::sleep("]);

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking sleep found in production code!");
        eprintln!("\n✅ Use instead:");
        eprintln!("  - tokio::time::sleep().await inside a select! with the interrupt token");
        eprintln!("  - tokio::time::sleep_until(deadline) for turn deadlines");
    }
    assert_clean(&violations, "no blocking sleep");
}
