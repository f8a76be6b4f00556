// SPDX-License-Identifier: MPL-2.0
//! Time unit conversions for playback timestamps.
//!
//! All internal timestamps are signed microseconds (`i64`). Cut times and
//! effect windows arrive from the storyboard in milliseconds; these helpers
//! keep the conversions in one place.

use std::time::Duration;

/// Microseconds per millisecond.
pub const MICROS_PER_MILLI: i64 = 1_000;

/// Microseconds per second.
pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Converts milliseconds (storyboard/cut times) to microseconds.
#[inline]
pub fn ms_to_us(ms: u32) -> i64 {
    i64::from(ms) * MICROS_PER_MILLI
}

/// Converts microseconds to milliseconds, truncating toward zero.
#[inline]
pub fn us_to_ms(us: i64) -> i64 {
    us / MICROS_PER_MILLI
}

/// Converts a non-negative microsecond delay to a [`Duration`].
/// Negative values clamp to zero.
#[inline]
pub fn duration_from_us(us: i64) -> Duration {
    Duration::from_micros(us.max(0) as u64)
}
