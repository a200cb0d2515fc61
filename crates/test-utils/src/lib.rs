//! Shared test utilities for the photometer reader workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Registry fixtures (the CTIO site with TESS-W 4C or SQM-LE devices)
//! - Recording and failing sinks
//! - Capture of `tracing` output
//! - A scripted SQM-LE device speaking the TCP protocol
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../../crates/test-utils" }
//! ```

pub mod device;
pub mod fixtures;
pub mod logs;
pub mod sinks;

pub use device::FakeSqmle;
pub use fixtures::*;
pub use logs::LogCapture;
pub use sinks::{FailingSink, RecordingSink};

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(12.3401_f64, 12.34_f64, 0.001_f64); // passes
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  \
                 diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(12.3401_f64, 12.34_f64, 0.001_f64);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(12.5_f64, 12.34_f64, 0.001_f64);
    }
}
