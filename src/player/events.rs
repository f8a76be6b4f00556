// SPDX-License-Identifier: MPL-2.0
//! Event identities and dispatch glue.
//!
//! The queue owns events by scheduled time; the player owns them by id. A
//! posted event is a closure capturing a weak player handle plus a kind
//! tag, so a player that has been dropped simply stops receiving events.

use std::sync::Weak;

use crate::event_queue::{EventId, TimedEventQueue};

use super::PlayerShared;

/// The event kinds a player posts onto its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlayerEventKind {
    Video,
    StreamDone,
    CheckAudioStatus,
    ProgressCallback,
    OverlayUpdate,
    AsyncPrepare,
}

/// The player's fixed event ids, allocated once at construction so that
/// cancellation by id survives arbitrarily many reposts.
pub(crate) struct PlayerEvents {
    pub(crate) video: EventId,
    pub(crate) stream_done: EventId,
    pub(crate) check_audio: EventId,
    pub(crate) progress: EventId,
    pub(crate) overlay: EventId,
    pub(crate) async_prepare: EventId,
}

impl PlayerEvents {
    pub(crate) fn allocate(queue: &TimedEventQueue) -> Self {
        Self {
            video: queue.next_event_id(),
            stream_done: queue.next_event_id(),
            check_audio: queue.next_event_id(),
            progress: queue.next_event_id(),
            overlay: queue.next_event_id(),
            async_prepare: queue.next_event_id(),
        }
    }

    pub(crate) fn id(&self, kind: PlayerEventKind) -> EventId {
        match kind {
            PlayerEventKind::Video => self.video,
            PlayerEventKind::StreamDone => self.stream_done,
            PlayerEventKind::CheckAudioStatus => self.check_audio,
            PlayerEventKind::ProgressCallback => self.progress,
            PlayerEventKind::OverlayUpdate => self.overlay,
            PlayerEventKind::AsyncPrepare => self.async_prepare,
        }
    }
}

/// Runs one event against the player, if it is still alive.
pub(crate) fn dispatch(shared: &Weak<PlayerShared>, kind: PlayerEventKind) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    match kind {
        PlayerEventKind::Video => shared.on_video_event(),
        PlayerEventKind::StreamDone => shared.on_stream_done(),
        PlayerEventKind::CheckAudioStatus => shared.on_check_audio_status(),
        PlayerEventKind::ProgressCallback => shared.on_progress_event(),
        PlayerEventKind::OverlayUpdate => shared.on_overlay_update_event(),
        PlayerEventKind::AsyncPrepare => shared.on_prepare_async_event(),
    }
}
