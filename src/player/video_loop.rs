// SPDX-License-Identifier: MPL-2.0
//! The per-frame video loop.
//!
//! Every video event runs one pass: acquire a frame (applying any pending
//! seek), measure its lateness against the authoritative clock, drop or
//! hold it if outside the sync window, evaluate the effect windows on the
//! storyboard timeline, render, and schedule the next pass. End-of-stream
//! and trim-boundary crossings post the stream-done event instead of
//! rescheduling.

use std::sync::{Arc, PoisonError};
use tracing::{trace, warn};

use crate::effects::{EffectKind, frame_storyboard_ms};
use crate::error::Result;
use crate::listener::Notification;
use crate::media::source::{ReadEvent, ReadOptions, SeekMode, StreamStatus};
use crate::time_source::{AudioClockSource, TimeSource};
use crate::time_units::us_to_ms;

use super::flags::PlayerFlags;
use super::{PlayerInner, PlayerShared, SeekState};

impl PlayerShared {
    pub(crate) fn on_video_event(&self) {
        let mut inner = self.lock_inner();
        if !inner.video_event_pending {
            // Cancelled after this occurrence was already dequeued.
            return;
        }
        inner.video_event_pending = false;

        if inner.flags.contains(PlayerFlags::SEEK_PREVIEW) && inner.seeking == SeekState::None {
            // The one preview frame was already displayed; this occurrence
            // is stale.
            inner.flags.remove(PlayerFlags::SEEK_PREVIEW);
            return;
        }

        if inner.seeking != SeekState::None {
            // A held frame predates the seek target.
            inner.video_buffer = None;

            if inner.audio_source.is_some() {
                // Video seeks first. Pause the audio side so its codec's
                // prefetching cannot drag the demuxer read head away from
                // the new video position.
                if inner.flags.contains(PlayerFlags::AUDIO_RUNNING) {
                    if let Some(player) = inner.audio_player.as_ref() {
                        player
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .pause(false);
                    }
                    inner.flags.remove(PlayerFlags::AUDIO_RUNNING);
                }
                if let Some(source) = inner.audio_source.as_ref() {
                    source
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pause();
                }
            }
        }

        if inner.video_buffer.is_none() && !self.acquire_frame_locked(&mut inner) {
            return;
        }

        inner.frames_since_progress += 1;
        let time_us = match inner.video_buffer.as_ref() {
            Some(frame) => frame.time_us,
            None => return,
        };
        self.lock_misc().video_time_us = time_us;

        if !inner.start_next_notified {
            let remaining_us = inner.clip.end_cut_us() - time_us;
            if remaining_us <= self.config.start_next_threshold_us {
                // Give the controller time to prefetch the next clip.
                inner.start_next_notified = true;
                self.notify_locked(&inner, Notification::StartNextPlayer);
            }
        }

        let was_seeking = inner.seeking;
        self.finish_seek_if_necessary(&mut inner, time_us);

        if inner.audio_player.is_some()
            && !inner
                .flags
                .intersects(PlayerFlags::AUDIO_RUNNING.union(PlayerFlags::SEEK_PREVIEW))
        {
            if let Err(e) = self.start_audio_player_locked(&mut inner) {
                warn!("starting the audio player failed: {e}");
                return;
            }
        }

        // Still-image clips are paced by the repost interval alone; the
        // lateness policy only applies to decoded video.
        if !inner.is_still_source && !self.frame_passes_sync_locked(&mut inner, time_us, was_seeking)
        {
            return;
        }

        if inner.video_renderer.is_none() {
            self.init_renderer_locked(&mut inner);
        }

        let end_cut_ms = i64::from(inner.clip.end_cut_ms);
        if us_to_ms(time_us) > end_cut_ms || inner.clip.is_empty() {
            // Past the trim window: finish without rendering this frame.
            self.enter_video_eos_locked(&mut inner);
            return;
        }

        inner.decoded_video_ts_us = time_us;

        self.evaluate_effect_windows_locked(&mut inner, time_us);
        self.signal_framing_overlay_locked(&mut inner);

        let effects = inner.current_effects;
        let mode = inner.clip.rendering_mode;
        let is_still = inner.is_still_source;
        if let Some(frame) = inner.video_buffer.take() {
            if let Some(renderer) = inner.video_renderer.as_mut() {
                renderer.render(&frame, effects, mode, is_still);
            }
            // Buffer released here, immediately after the render call.
        }

        if was_seeking != SeekState::None && inner.flags.contains(PlayerFlags::SEEK_PREVIEW) {
            // The single paused-preview frame is on screen; stop here.
            inner.flags.remove(PlayerFlags::SEEK_PREVIEW);
            return;
        }

        if inner.frames_since_progress >= inner.clip.progress_interval_frames {
            self.post_progress_event_locked(&mut inner);
            inner.frames_since_progress = 0;
        }

        if us_to_ms(time_us) >= end_cut_ms {
            self.enter_video_eos_locked(&mut inner);
        } else {
            let delay_us = if is_still {
                self.config.still_frame_interval_us
            } else {
                0
            };
            self.post_video_event_locked(&mut inner, delay_us);
        }
    }

    /// Reads until an acceptable frame is held in `video_buffer`. Returns
    /// false when the pass ended (EOS, error, or the source vanished).
    fn acquire_frame_locked(&self, inner: &mut PlayerInner) -> bool {
        let mut options = ReadOptions::default();
        if inner.seeking != SeekState::None {
            let mode = if inner.seeking == SeekState::VideoOnly {
                SeekMode::NextSync
            } else {
                SeekMode::Closest
            };
            trace!(target_us = inner.seek_time_us, "seeking video source");
            options.set_seek_to(inner.seek_time_us, mode);
        }

        loop {
            let read_event = match inner.video_source.as_mut() {
                Some(video) => video.read(&options),
                None => return false,
            };
            options.clear_seek_to();

            match read_event {
                ReadEvent::FormatChanged => {
                    trace!("video source signalled format change");
                    self.notify_video_size_locked(inner);
                    self.init_renderer_locked(inner);
                    if let Some(format) = inner.video_source.as_ref().map(|v| v.format()) {
                        self.update_size_to_render_locked(inner, &format);
                    }
                }
                ReadEvent::EndOfStream => {
                    if inner.seeking != SeekState::None {
                        trace!("video stream ended while seeking");
                    }
                    self.finish_seek_if_necessary(inner, -1);
                    self.enter_video_eos_locked(inner);
                    return false;
                }
                ReadEvent::Error(err) => {
                    self.finish_seek_if_necessary(inner, -1);
                    inner
                        .flags
                        .insert(PlayerFlags::VIDEO_AT_EOS.union(PlayerFlags::AUDIO_AT_EOS));
                    inner.overlay_posted = false;
                    inner.decoded_video_ts_us = inner.clip.end_cut_us();
                    self.post_stream_done_locked(inner, StreamStatus::Error(err));
                    return false;
                }
                ReadEvent::Frame(frame) => {
                    if frame.is_empty() {
                        // Spurious empty decoder buffer.
                        continue;
                    }
                    if inner.seeking != SeekState::None {
                        if frame.time_us < inner.seek_time_us {
                            // Before the seek target.
                            continue;
                        }
                    } else if us_to_ms(frame.time_us) < i64::from(inner.clip.begin_cut_ms) {
                        // Before the begin cut; never rendered.
                        continue;
                    }
                    inner.video_buffer = Some(frame);
                    return true;
                }
            }
        }
    }

    /// Applies the lateness policy. Returns true when the frame should be
    /// rendered now; otherwise the frame was dropped or deferred and the
    /// next event is already scheduled.
    fn frame_passes_sync_locked(
        &self,
        inner: &mut PlayerInner,
        time_us: i64,
        was_seeking: SeekState,
    ) -> bool {
        let now_source_us = self.authoritative_time_us(inner);

        if inner.flags.contains(PlayerFlags::FIRST_FRAME) {
            inner.flags.remove(PlayerFlags::FIRST_FRAME);
            inner.time_source_delta_us = now_source_us - time_us;
        }

        if !inner.flags.contains(PlayerFlags::AUDIO_AT_EOS) {
            if let Some(player) = inner.audio_player.as_ref() {
                let mapping = AudioClockSource::new(Arc::clone(player)).media_time_mapping();
                if let Some((real_us, media_us)) = mapping {
                    inner.time_source_delta_us = real_us - media_us;
                }
            }
        }

        let now_us = now_source_us - inner.time_source_delta_us;
        let mut lateness_us = now_us - time_us;
        if was_seeking != SeekState::None {
            // Display the first frame after a seek right away.
            lateness_us = 0;
        }

        if lateness_us > self.config.max_lateness_us {
            trace!(lateness_us, time_us, "dropping late frame");
            inner.video_buffer = None;
            self.post_video_event_locked(inner, 0);
            return false;
        }

        if lateness_us < -self.config.early_margin_us {
            trace!(lateness_us, time_us, "frame early; holding");
            self.post_video_event_locked(inner, self.config.early_repost_delay_us);
            return false;
        }

        true
    }

    fn authoritative_time_us(&self, inner: &PlayerInner) -> i64 {
        if !inner.flags.contains(PlayerFlags::AUDIO_AT_EOS) {
            if let Some(player) = inner.audio_player.as_ref() {
                return AudioClockSource::new(Arc::clone(player)).real_time_us();
            }
        }
        self.system_time.real_time_us()
    }

    /// Marks both streams finished at the trim boundary and posts
    /// stream-done.
    fn enter_video_eos_locked(&self, inner: &mut PlayerInner) {
        inner.video_buffer = None;
        inner
            .flags
            .insert(PlayerFlags::VIDEO_AT_EOS.union(PlayerFlags::AUDIO_AT_EOS));
        inner.overlay_posted = false;
        inner.decoded_video_ts_us = inner.clip.end_cut_us();
        self.post_stream_done_locked(inner, StreamStatus::EndOfStream);
    }

    /// Video seeks first; once a frame at or past the target is accepted,
    /// chase the audio to the accepted video timestamp (or the original
    /// target if video ended mid-seek). Video-only playback reports
    /// seek-complete directly; otherwise the audio status watcher does.
    pub(crate) fn finish_seek_if_necessary(&self, inner: &mut PlayerInner, video_ts_us: i64) {
        if inner.seeking == SeekState::VideoOnly {
            inner.seeking = SeekState::None;
            return;
        }
        if inner.seeking == SeekState::None || inner.flags.contains(PlayerFlags::SEEK_PREVIEW) {
            return;
        }

        if let Some(player) = inner.audio_player.as_ref().map(Arc::clone) {
            let target_us = if video_ts_us < 0 {
                inner.seek_time_us
            } else {
                video_ts_us
            };
            trace!(target_us, "seeking audio to accepted video time");
            let _ = player
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .seek_to(target_us);
            inner.watch_audio_seek_complete = true;
            inner.watch_audio_eos = true;
        } else if !inner.seek_notification_sent {
            self.notify_locked(inner, Notification::SeekComplete);
            inner.seek_notification_sent = true;
        }

        inner.flags.insert(PlayerFlags::FIRST_FRAME);
        inner.seeking = SeekState::None;
    }

    /// Toggles each effect's enable bit from its storyboard window.
    /// Effects whose window lies outside this clip are skipped entirely.
    fn evaluate_effect_windows_locked(&self, inner: &mut PlayerInner, time_us: i64) {
        let window_start_ms = us_to_ms(inner.storyboard_ts_us);
        let begin_cut_ms = inner.clip.begin_cut_ms;
        let end_cut_ms = inner.clip.end_cut_ms;
        let fts_ms = frame_storyboard_ms(time_us, inner.storyboard_ts_us, begin_cut_ms);

        let toggles: Vec<(EffectKind, bool)> = inner
            .effects
            .iter()
            .filter(|effect| effect.belongs_to_clip(window_start_ms, begin_cut_ms, end_cut_ms))
            .map(|effect| (effect.kind, effect.applies_at(fts_ms)))
            .collect();
        for (kind, enabled) in toggles {
            inner.current_effects.set(kind, enabled);
        }
    }

    /// The framing effect is composited from out-of-band overlay pixels,
    /// never through the render mask. Post a one-shot overlay-update when
    /// it becomes active (carrying the effect's index) and again when it
    /// goes inactive (the clear).
    fn signal_framing_overlay_locked(&self, inner: &mut PlayerInner) {
        if inner.current_effects.contains(EffectKind::Framing) {
            inner.current_effects.remove(EffectKind::Framing);
            if !inner.overlay_posted {
                let frame_ms = us_to_ms(inner.decoded_video_ts_us)
                    + us_to_ms(inner.storyboard_ts_us)
                    - i64::from(inner.clip.begin_cut_ms);
                let found = inner.effects.iter().position(|effect| {
                    effect.kind == EffectKind::Framing
                        && i64::from(effect.start_ms) + 1 <= frame_ms
                        && i64::from(effect.start_ms) + i64::from(effect.duration_ms) - 1
                            >= frame_ms
                });
                if let Some(index) = found {
                    inner.current_framing_index = index;
                    inner.overlay_posted = true;
                    self.post_overlay_update_locked(inner);
                } else {
                    trace!("no framing effect covers this frame");
                }
            }
        } else if inner.overlay_posted {
            inner.overlay_posted = false;
            self.post_overlay_update_locked(inner);
        }
    }

    /// Decode-only read of the first in-range frame, for paused previews.
    /// The frame stays held as the in-flight buffer.
    pub(crate) fn read_first_video_frame_locked(&self, inner: &mut PlayerInner) -> Result<()> {
        if inner.video_buffer.is_none() && !self.acquire_frame_locked(inner) {
            return Ok(());
        }

        let time_us = match inner.video_buffer.as_ref() {
            Some(frame) => frame.time_us,
            None => return Ok(()),
        };
        self.lock_misc().video_time_us = time_us;
        inner.decoded_video_ts_us = time_us;
        Ok(())
    }

    pub(crate) fn on_progress_event(&self) {
        let mut inner = self.lock_inner();
        if !inner.progress_pending {
            return;
        }
        inner.progress_pending = false;

        // Playback resumed from an earlier sync frame still reports the
        // storyboard base, never a pre-cut timestamp.
        let begin_cut_ms = i64::from(inner.clip.begin_cut_ms);
        let progress_ms = if us_to_ms(inner.decoded_video_ts_us) < begin_cut_ms {
            us_to_ms(inner.storyboard_ts_us)
        } else {
            us_to_ms(inner.decoded_video_ts_us + inner.storyboard_ts_us) - begin_cut_ms
        };
        self.notify_locked(&inner, Notification::Info { progress_ms });
    }

    pub(crate) fn on_overlay_update_event(&self) {
        let mut inner = self.lock_inner();
        if !inner.overlay_event_pending {
            return;
        }
        inner.overlay_event_pending = false;

        let notification = Notification::OverlayUpdate {
            active: inner.overlay_posted,
            effect_index: inner.current_framing_index,
        };
        self.notify_locked(&inner, notification);
    }
}
