//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Production code in the conductor MUST NOT use blocking
//! network or console I/O. Provider calls go through async `reqwest`, robot
//! RPCs through async traits, and the CLI reads stdin with `tokio::io`.
//!
//! Reading the config file with `std::fs` happens before any turn runs and
//! is allowed.

use architectural_enforcement::{assert_clean, scan_production};

#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = scan_production(&[
        "reqwest::blocking",
        "std::net::",
        "std::io::stdin()",
        "std::process::Command",
    ]);

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O found in production code!");
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - reqwest::Client (async) for provider calls");
        eprintln!("  - tokio::io::stdin() with AsyncBufReadExt for console input");
        eprintln!("  - tokio::process::Command for subprocesses");
    }
    assert_clean(&violations, "no blocking I/O");
}
