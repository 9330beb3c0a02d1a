//! Duration conversion helpers

use std::time::Duration;

/// Convert milliseconds (config values) to duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Convert fractional seconds (engine time readouts) to a duration
///
/// Negative, NaN and infinite inputs collapse to zero.
pub fn secs_f64_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}
