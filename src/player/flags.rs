// SPDX-License-Identifier: MPL-2.0
//! Player state bitmask.
//!
//! Playback state is a set of independent flags rather than a single enum:
//! most transitions flip one or two bits while leaving the rest untouched,
//! and several states legitimately coexist (PLAYING while VIDEO_AT_EOS,
//! PREPARED while SEEK_PREVIEW, …).

use std::fmt;

/// Bitmask of player states.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerFlags(u32);

impl PlayerFlags {
    /// Actively playing.
    pub const PLAYING: PlayerFlags = PlayerFlags(1);

    /// Restart from the beginning at end-of-stream.
    pub const LOOPING: PlayerFlags = PlayerFlags(1 << 1);

    /// The next accepted frame anchors the time-source delta.
    pub const FIRST_FRAME: PlayerFlags = PlayerFlags(1 << 2);

    /// An async prepare is in flight.
    pub const PREPARING: PlayerFlags = PlayerFlags(1 << 3);

    /// Preparation completed successfully.
    pub const PREPARED: PlayerFlags = PlayerFlags(1 << 4);

    /// Both streams (or their absences) reached end-of-stream.
    pub const AT_EOS: PlayerFlags = PlayerFlags(1 << 5);

    /// `reset` cancelled an in-flight prepare.
    pub const PREPARE_CANCELLED: PlayerFlags = PlayerFlags(1 << 6);

    /// A networked cache ran dry (cleared on `play`).
    pub const CACHE_UNDERRUN: PlayerFlags = PlayerFlags(1 << 7);

    /// The audio stream finished.
    pub const AUDIO_AT_EOS: PlayerFlags = PlayerFlags(1 << 8);

    /// The video stream finished.
    pub const VIDEO_AT_EOS: PlayerFlags = PlayerFlags(1 << 9);

    /// Container metadata requested looping.
    pub const AUTO_LOOPING: PlayerFlags = PlayerFlags(1 << 10);

    /// One video event will display a single frame while paused to satisfy
    /// a seek visually.
    pub const SEEK_PREVIEW: PlayerFlags = PlayerFlags(1 << 12);

    /// The shared audio player is actively producing sound for us.
    pub const AUDIO_RUNNING: PlayerFlags = PlayerFlags(1 << 13);

    /// The shared audio player has been started at least once for this
    /// session (subsequent starts are resumes).
    pub const AUDIOPLAYER_STARTED: PlayerFlags = PlayerFlags(1 << 14);

    /// Playback-complete has been delivered for this play session. Two
    /// players can share one audio player across a clip transition; without
    /// this latch the completion of the carried-over silent source would
    /// fire a second notification.
    pub const INFORMED_AV_EOS: PlayerFlags = PlayerFlags(1 << 16);

    /// No flags set.
    pub fn empty() -> Self {
        PlayerFlags(0)
    }

    /// Raw bit representation.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Returns true when all bits of `other` are set.
    pub fn contains(self, other: PlayerFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true when any bit of `other` is set.
    pub fn intersects(self, other: PlayerFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Sets all bits of `other`.
    pub fn insert(&mut self, other: PlayerFlags) {
        self.0 |= other.0;
    }

    /// Clears all bits of `other`.
    pub fn remove(&mut self, other: PlayerFlags) {
        self.0 &= !other.0;
    }

    /// Clears every flag.
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Combines two flag sets.
    pub fn union(self, other: PlayerFlags) -> PlayerFlags {
        PlayerFlags(self.0 | other.0)
    }

    /// Checks the documented state invariants. Exercised by tests; the
    /// transitions themselves are written to preserve these.
    pub fn invariants_hold(self) -> bool {
        // PREPARED and PREPARING are mutually exclusive.
        if self.contains(PlayerFlags::PREPARED) && self.contains(PlayerFlags::PREPARING) {
            return false;
        }
        // AUDIO_RUNNING implies AUDIOPLAYER_STARTED and PLAYING.
        if self.contains(PlayerFlags::AUDIO_RUNNING)
            && !self.contains(PlayerFlags::AUDIOPLAYER_STARTED.union(PlayerFlags::PLAYING))
        {
            return false;
        }
        // AT_EOS implies not PLAYING.
        if self.contains(PlayerFlags::AT_EOS) && self.contains(PlayerFlags::PLAYING) {
            return false;
        }
        true
    }
}

impl fmt::Debug for PlayerFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (PlayerFlags::PLAYING, "PLAYING"),
            (PlayerFlags::LOOPING, "LOOPING"),
            (PlayerFlags::FIRST_FRAME, "FIRST_FRAME"),
            (PlayerFlags::PREPARING, "PREPARING"),
            (PlayerFlags::PREPARED, "PREPARED"),
            (PlayerFlags::AT_EOS, "AT_EOS"),
            (PlayerFlags::PREPARE_CANCELLED, "PREPARE_CANCELLED"),
            (PlayerFlags::CACHE_UNDERRUN, "CACHE_UNDERRUN"),
            (PlayerFlags::AUDIO_AT_EOS, "AUDIO_AT_EOS"),
            (PlayerFlags::VIDEO_AT_EOS, "VIDEO_AT_EOS"),
            (PlayerFlags::AUTO_LOOPING, "AUTO_LOOPING"),
            (PlayerFlags::SEEK_PREVIEW, "SEEK_PREVIEW"),
            (PlayerFlags::AUDIO_RUNNING, "AUDIO_RUNNING"),
            (PlayerFlags::AUDIOPLAYER_STARTED, "AUDIOPLAYER_STARTED"),
            (PlayerFlags::INFORMED_AV_EOS, "INFORMED_AV_EOS"),
        ];
        let mut list = f.debug_list();
        for (flag, name) in names {
            if self.contains(flag) {
                list.entry(&name);
            }
        }
        list.finish()
    }
}
