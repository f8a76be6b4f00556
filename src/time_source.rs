// SPDX-License-Identifier: MPL-2.0
//! Time sources for AV synchronization.
//!
//! The video loop measures frame lateness against "now" from one of two
//! clocks: the monotonic system clock, or the shared audio player's media
//! clock. The audio clock is authoritative while audio is playing; the
//! system clock takes over once audio reaches end-of-stream.

use std::sync::PoisonError;
use std::time::Instant;

use crate::audio::SharedAudioPlayer;

/// A clock the player can measure frame lateness against.
pub trait TimeSource: Send {
    /// Current time in microseconds. The zero point is arbitrary but fixed
    /// for the lifetime of the source; only deltas are meaningful.
    fn real_time_us(&self) -> i64;
}

/// Monotonic wall-clock time source.
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    epoch: Instant,
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemTimeSource {
    /// A time source anchored at the moment of creation.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn real_time_us(&self) -> i64 {
        self.epoch.elapsed().as_micros() as i64
    }
}

/// Bridges the shared audio player's media clock into the time-source
/// contract. Reads go through the player mutex; callers must not hold the
/// audio player locked while querying.
pub struct AudioClockSource {
    player: SharedAudioPlayer,
}

impl AudioClockSource {
    /// Wraps the shared audio player as a time source.
    pub fn new(player: SharedAudioPlayer) -> Self {
        Self { player }
    }

    /// The `(real_time_us, media_time_us)` pair used to recalibrate the
    /// player's time-source delta after jitter, when the audio player can
    /// provide one.
    pub fn media_time_mapping(&self) -> Option<(i64, i64)> {
        self.player
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .media_time_mapping()
    }
}

impl TimeSource for AudioClockSource {
    fn real_time_us(&self) -> i64 {
        self.player
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .media_time_us()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn system_time_is_monotonic() {
        let source = SystemTimeSource::new();
        let a = source.real_time_us();
        std::thread::sleep(Duration::from_millis(5));
        let b = source.real_time_us();
        assert!(b > a);
    }

    #[test]
    fn system_time_starts_near_zero() {
        let source = SystemTimeSource::new();
        assert!(source.real_time_us() < 50_000);
    }
}
