#![allow(unused_imports)]
#![allow(dead_code)]
//! Shared test utilities for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: hand-written proxies (Calculator, Service, Root/Child, Repo,
//!   Counter, Clock) and context constructors
//! - `assertions`: custom assertion helpers

pub mod assertions;
pub mod fixtures;

// Re-export commonly used items for convenience
pub use fixtures::{
    arg, config, ctx, shared_registry, Calculator, Child, Clock, Counter, Repo, Root, Service,
};

// Re-export assertion helpers for better test error messages
pub use assertions::{
    assert_err, assert_error_contains, assert_error_contains_any, assert_ok,
    assert_verification_failed,
};
