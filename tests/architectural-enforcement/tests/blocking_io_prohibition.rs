//! Integration Test: Blocking I/O Prohibition
//!
//! Request handling runs on the tokio runtime, so production code must not
//! block a worker thread. Configuration loading runs once before the server
//! starts and may read its file synchronously.

use architectural_enforcement::{assert_clean, scan, Rule};

const BLOCKING_IO: Rule = Rule {
    name: "blocking I/O",
    patterns: &[
        "std::fs",
        "std::net::TcpStream",
        "std::net::TcpListener",
        "std::process::Command",
        "reqwest::blocking",
    ],
    allowed_in: &["core/src/config/"],
    allowed_lines: &[],
};

const SLEEPING: Rule = Rule {
    name: "sleeping",
    patterns: &["std::thread::sleep", "thread::sleep(", "tokio::time::sleep"],
    allowed_in: &[],
    allowed_lines: &[],
};

/// Production code uses async I/O only
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = scan(&BLOCKING_IO);
    assert_clean(
        &BLOCKING_IO,
        &violations,
        "Use tokio::fs / tokio::net and the async reqwest client instead.",
    );
}

/// Production code never sleeps; waiting is done with timeouts on real events
#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(&SLEEPING);
    assert_clean(
        &SLEEPING,
        &violations,
        "Use request timeouts or channel receives instead of sleeping.",
    );
}
