//! Integration Test: Error and Logging Discipline
//!
//! Diagnostics go through `tracing` so they honour `RUST_LOG`, and failures
//! propagate as typed errors rather than panics.

use architectural_enforcement::{assert_clean, scan, Rule};

const PRINTING: Rule = Rule {
    name: "stdout/stderr printing",
    patterns: &["println!", "eprintln!", "print!(", "eprint!(", "dbg!("],
    allowed_in: &[],
    allowed_lines: &[],
};

const PANICKING: Rule = Rule {
    name: "unwrap/expect",
    patterns: &[".unwrap()", ".expect("],
    allowed_in: &[],
    // Constant regexes are checked by their unit tests
    allowed_lines: &["Regex::new("],
};

/// Production code logs through tracing only
#[test]
fn test_no_printing_in_production_code() {
    let violations = scan(&PRINTING);
    assert_clean(
        &PRINTING,
        &violations,
        "Use tracing::{info, warn, debug, error} instead.",
    );
}

/// Production code propagates errors instead of unwrapping
#[test]
fn test_no_unwrap_in_production_code() {
    let violations = scan(&PANICKING);
    assert_clean(
        &PANICKING,
        &violations,
        "Return a Result and use `?`, or map the error into the module's error type.",
    );
}
