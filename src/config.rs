// SPDX-License-Identifier: MPL-2.0
//! Playback tuning parameters.
//!
//! The sync policy thresholds live here rather than as scattered literals so
//! that integrators can persist and reload a tuned profile. Defaults match
//! the values the engine was calibrated with: frames more than 40 ms behind
//! the media clock are dropped, frames more than 25 ms early are retried
//! 25 ms later, still-image clips are paced at ~30 fps.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Frames later than this are dropped instead of rendered.
pub const DEFAULT_MAX_LATENESS_US: i64 = 40_000;

/// Frames earlier than this margin are held and retried.
pub const DEFAULT_EARLY_MARGIN_US: i64 = 25_000;

/// Delay before retrying an early frame.
pub const DEFAULT_EARLY_REPOST_DELAY_US: i64 = 25_000;

/// Frame interval for still-image clips (~30 fps).
pub const DEFAULT_STILL_FRAME_INTERVAL_US: i64 = 33_000;

/// Remaining playback below this triggers the start-next-clip notification.
pub const DEFAULT_START_NEXT_THRESHOLD_US: i64 = 1_500_000;

/// Default delay for a video event posted without an explicit delay.
pub const DEFAULT_VIDEO_EVENT_DELAY_US: i64 = 10_000;

/// Default progress-callback interval in decoded frames.
pub const DEFAULT_PROGRESS_INTERVAL_FRAMES: u32 = 1;

/// Synchronization and pacing configuration for a preview player.
///
/// Serialized as TOML so a controller can ship per-device profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Lateness above which a frame is dropped, in microseconds.
    pub max_lateness_us: i64,

    /// Earliness margin below which a frame is held, in microseconds.
    pub early_margin_us: i64,

    /// Repost delay for early frames, in microseconds.
    pub early_repost_delay_us: i64,

    /// Interval between still-image frames, in microseconds.
    pub still_frame_interval_us: i64,

    /// Remaining-playback threshold for the start-next notification,
    /// in microseconds.
    pub start_next_threshold_us: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_lateness_us: DEFAULT_MAX_LATENESS_US,
            early_margin_us: DEFAULT_EARLY_MARGIN_US,
            early_repost_delay_us: DEFAULT_EARLY_REPOST_DELAY_US,
            still_frame_interval_us: DEFAULT_STILL_FRAME_INTERVAL_US,
            start_next_threshold_us: DEFAULT_START_NEXT_THRESHOLD_US,
        }
    }
}

impl SyncConfig {
    /// Loads a configuration from a TOML file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Saves the configuration to a TOML file.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }
}
