//! Custom assertion utilities for tests.
//!
//! Provides assertion helpers that give better error messages and
//! standardize common assertion patterns.

use spyglass::{MockError, VerificationReport};

/// Assert that a result is Ok and return the inner value.
///
/// Provides a better error message than `.unwrap()` by including context.
///
/// # Panics
///
/// Panics with a descriptive message (using the error's `Display`, which for
/// engine errors carries the full report) if the result is `Err`.
#[allow(dead_code)]
pub fn assert_ok<T, E: std::fmt::Display>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("{} failed: {}", context, e),
    }
}

/// Assert that a result is Err and return the error.
#[allow(dead_code)]
pub fn assert_err<T, E>(result: Result<T, E>, context: &str) -> E {
    match result {
        Ok(_) => panic!("{} should have failed", context),
        Err(e) => e,
    }
}

/// Assert that an error message contains expected text (case-insensitive).
#[allow(dead_code)]
pub fn assert_error_contains<E: std::fmt::Display>(error: E, expected_text: &str, context: &str) {
    let error_str = error.to_string().to_lowercase();
    let expected_lower = expected_text.to_lowercase();

    assert!(
        error_str.contains(&expected_lower),
        "{}: error message should contain '{}', got: {}",
        context,
        expected_text,
        error
    );
}

/// Assert that an error message contains any of the expected texts.
#[allow(dead_code)]
pub fn assert_error_contains_any<E: std::fmt::Display>(
    error: E,
    expected_texts: &[&str],
    context: &str,
) {
    let error_str = error.to_string().to_lowercase();

    let found = expected_texts
        .iter()
        .any(|text| error_str.contains(&text.to_lowercase()));

    assert!(
        found,
        "{}: error message should contain one of {:?}, got: {}",
        context, expected_texts, error
    );
}

/// Assert that a verification failed and return its report.
#[allow(dead_code)]
pub fn assert_verification_failed<T>(
    result: Result<T, MockError>,
    context: &str,
) -> VerificationReport {
    match result {
        Ok(_) => panic!("{}: verification should have failed", context),
        Err(MockError::VerificationFailed { report }) => *report,
        Err(other) => panic!("{}: expected VerificationFailed, got: {}", context, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_ok() {
        let result: Result<i32, &str> = Ok(42);
        let value = assert_ok(result, "test operation");
        assert_eq!(value, 42);
    }

    #[test]
    #[should_panic(expected = "test operation failed")]
    fn test_assert_ok_fails() {
        let result: Result<i32, &str> = Err("error");
        assert_ok(result, "test operation");
    }

    #[test]
    fn test_assert_err() {
        let result: Result<i32, &str> = Err("error");
        assert_eq!(assert_err(result, "test operation"), "error");
    }

    #[test]
    fn test_assert_error_contains() {
        let error = "no answer found for: Calculator#1.add(3, 3)";
        assert_error_contains(error, "No answer found", "unmatched call");
        assert_error_contains_any(error, &["missing", "no answer"], "unmatched call");
    }
}
