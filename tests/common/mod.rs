//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod fake_toolchain;

use std::time::Duration;

/// Upper bound for waiting on a session response in tests
pub fn test_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Upper bound for a session's teardown after its response
pub fn teardown_timeout() -> Duration {
    Duration::from_secs(10)
}
