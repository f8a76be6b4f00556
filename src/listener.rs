// SPDX-License-Identifier: MPL-2.0
//! Listener notifications emitted by the player.

use crate::error::PlayerError;

/// Wire code for the prepared notification.
pub const MEDIA_PREPARED: u32 = 1;

/// Wire code for playback completion.
pub const MEDIA_PLAYBACK_COMPLETE: u32 = 2;

/// Wire code for seek completion.
pub const MEDIA_SEEK_COMPLETE: u32 = 4;

/// Wire code for video size discovery/changes.
pub const MEDIA_SET_VIDEO_SIZE: u32 = 5;

/// Wire code for errors.
pub const MEDIA_ERROR: u32 = 100;

/// Wire code for the progress callback.
pub const MEDIA_INFO: u32 = 200;

/// Private wire code telling the controller to prefetch the next clip.
pub const MEDIA_START_NEXT_PLAYER: u32 = 0xAAAA_AAAA;

/// Private wire code telling the controller to upload or clear the framing
/// overlay image.
pub const MEDIA_OVERLAY_UPDATE: u32 = 0xBBBB_BBBB;

/// A notification from the player to its listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Preparation finished successfully.
    Prepared,

    /// The video's display size was discovered or changed.
    /// `(0, 0)` is reported for audio-only sources.
    SetVideoSize { width: u32, height: u32 },

    /// A requested seek completed.
    SeekComplete,

    /// Playback of the clip finished. Emitted at most once per play
    /// session.
    PlaybackComplete,

    /// Playback failed.
    Error(PlayerError),

    /// Progress callback carrying the storyboard-relative position in
    /// milliseconds.
    Info { progress_ms: i64 },

    /// Remaining playback dropped below the prefetch threshold; the
    /// controller should start preparing the next clip.
    StartNextPlayer,

    /// The framing overlay became active (`active == true`, upload pixels
    /// for `effect_index`) or inactive (`active == false`, clear it).
    OverlayUpdate { active: bool, effect_index: usize },
}

impl Notification {
    /// The raw wire code for this notification.
    pub fn code(&self) -> u32 {
        match self {
            Notification::Prepared => MEDIA_PREPARED,
            Notification::SetVideoSize { .. } => MEDIA_SET_VIDEO_SIZE,
            Notification::SeekComplete => MEDIA_SEEK_COMPLETE,
            Notification::PlaybackComplete => MEDIA_PLAYBACK_COMPLETE,
            Notification::Error(_) => MEDIA_ERROR,
            Notification::Info { .. } => MEDIA_INFO,
            Notification::StartNextPlayer => MEDIA_START_NEXT_PLAYER,
            Notification::OverlayUpdate { .. } => MEDIA_OVERLAY_UPDATE,
        }
    }
}

/// Receives player notifications.
///
/// Callbacks may arrive on the event worker thread with player state
/// locked; implementations must not call back into the player
/// synchronously.
pub trait PlayerListener: Send + Sync {
    /// Delivers one notification.
    fn notify(&self, notification: Notification);
}
