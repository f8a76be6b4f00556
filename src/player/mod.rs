// SPDX-License-Identifier: MPL-2.0
//! The single-clip preview player.
//!
//! [`PreviewPlayer`] is the playback core of the storyboard preview engine:
//! given one clip (with trim boundaries, a storyboard offset, time-windowed
//! effects, and an optional audio-mix overlay) it produces synchronized,
//! effect-processed frames to a renderer and audio to the shared audio
//! player, responding to play/pause/seek from any thread.
//!
//! All state mutation is serialized by one player mutex. A dedicated worker
//! thread (the timed event queue) runs the video loop, stream-done
//! handling, and the audio status watcher; public operations post events
//! and return. `prepare` blocks on a condition variable until the async
//! prepare event finishes or is cancelled.

mod events;
mod flags;
mod video_loop;

pub use flags::PlayerFlags;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::audio::{
    AudioMixSettings, AudioObserver, AudioPlayerFactory, AudioSink, PcmFileHandle,
    SharedAudioPlayer,
};
use crate::clip::ClipContext;
use crate::config::{DEFAULT_VIDEO_EVENT_DELAY_US, SyncConfig};
use crate::effects::{EffectMask, EffectSettings};
use crate::error::{Error, PlayerError, Result};
use crate::event_queue::TimedEventQueue;
use crate::listener::{Notification, PlayerListener};
use crate::media::dummy_audio::DummyAudioSource;
use crate::media::dummy_video::DummyVideoSource;
use crate::media::extractor::{DataSource, ExtractorFactory, ExtractorFlags, MediaExtractor};
use crate::media::format::{MIME_AUDIO_QCELP, MIME_AUDIO_VORBIS, MediaFormat};
use crate::media::resample::ResampleSource;
use crate::media::source::{
    DecoderFactory, FrameBuffer, MediaSource, SharedSource, StreamStatus,
};
use crate::render::{RenderInput, RendererFactory, RenderingMode, TargetWindow};
use crate::time_source::SystemTimeSource;
use crate::time_units::{ms_to_us, us_to_ms};

use events::{PlayerEventKind, PlayerEvents, dispatch};

/// Seek progress. At most one seek is in flight; a new request supersedes a
/// pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekState {
    /// No seek pending.
    #[default]
    None,

    /// Seek both streams, video first.
    Seek,

    /// Seek video only (catch-up after falling far behind the audio clock).
    VideoOnly,
}

/// The external collaborators a player is built from.
#[derive(Clone)]
pub struct PlayerComponents {
    /// Opens containers from URIs and file regions.
    pub extractors: Arc<dyn ExtractorFactory>,

    /// Creates hardware/software decoders for demuxed tracks.
    pub decoders: Arc<dyn DecoderFactory>,

    /// Creates frame sinks bound to the compositor surface.
    pub renderers: Arc<dyn RendererFactory>,

    /// Creates audio players when no shared player has been injected yet.
    pub audio_players: Arc<dyn AudioPlayerFactory>,
}

/// Binary semaphore exposed to the controller so that stopping one player
/// cannot race another player's stream-done notification. Acquire/release
/// are split operations because the controller holds it across calls.
pub(crate) struct ControlLock {
    locked: Mutex<bool>,
    cond: Condvar,
}

impl ControlLock {
    fn new() -> Self {
        Self {
            locked: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        while *locked {
            locked = self
                .cond
                .wait(locked)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *locked = true;
    }

    fn release(&self) {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        *locked = false;
        drop(locked);
        self.cond.notify_one();
    }
}

/// Duration and last-video-time bookkeeping, under its own mutex so that
/// duration discovery during decoder start cannot deadlock against the
/// player mutex.
pub(crate) struct MiscState {
    /// Total duration in microseconds; negative while unknown.
    pub(crate) duration_us: i64,

    /// Timestamp of the most recently accepted video frame.
    pub(crate) video_time_us: i64,
}

pub(crate) struct PlayerInner {
    pub(crate) flags: PlayerFlags,
    pub(crate) queue_started: bool,
    pub(crate) listener: Option<Weak<dyn PlayerListener>>,

    pub(crate) data_source: Option<DataSource>,
    pub(crate) extractor_flags: ExtractorFlags,

    pub(crate) video_track: Option<Box<dyn MediaSource>>,
    pub(crate) video_track_format: Option<MediaFormat>,
    pub(crate) audio_track: Option<Box<dyn MediaSource>>,

    pub(crate) video_source: Option<Box<dyn MediaSource>>,
    pub(crate) audio_source: Option<SharedSource>,

    pub(crate) surface: Option<TargetWindow>,
    pub(crate) video_renderer: Option<Box<dyn RenderInput>>,

    pub(crate) audio_sink: Option<Arc<dyn AudioSink>>,
    pub(crate) audio_player: Option<SharedAudioPlayer>,
    pub(crate) is_change_source_required: bool,

    pub(crate) time_source_delta_us: i64,
    pub(crate) video_buffer: Option<FrameBuffer>,

    pub(crate) seeking: SeekState,
    pub(crate) seek_time_us: i64,
    pub(crate) seek_notification_sent: bool,
    pub(crate) watch_audio_seek_complete: bool,
    pub(crate) watch_audio_eos: bool,

    pub(crate) clip: ClipContext,
    pub(crate) effects: Vec<EffectSettings>,
    pub(crate) current_effects: EffectMask,
    pub(crate) overlay_posted: bool,
    pub(crate) current_framing_index: usize,

    pub(crate) decoded_video_ts_us: i64,
    pub(crate) storyboard_ts_us: i64,
    pub(crate) storyboard_start_ms: u32,
    pub(crate) frames_since_progress: u32,
    pub(crate) start_next_notified: bool,
    pub(crate) is_still_source: bool,

    pub(crate) audio_mix_settings: AudioMixSettings,
    pub(crate) audio_mix_pcm: Option<PcmFileHandle>,
    pub(crate) audio_mix_storyboard_ts_ms: u32,
    pub(crate) audio_mix_begin_cut_ms: u32,
    pub(crate) audio_mix_primary_volume: u32,

    pub(crate) is_async_prepare: bool,
    pub(crate) prepare_result: Result<()>,
    pub(crate) stream_done_status: Option<StreamStatus>,

    pub(crate) video_event_pending: bool,
    pub(crate) stream_done_pending: bool,
    pub(crate) audio_status_pending: bool,
    pub(crate) progress_pending: bool,
    pub(crate) overlay_event_pending: bool,
}

impl PlayerInner {
    fn new() -> Self {
        Self {
            flags: PlayerFlags::empty(),
            queue_started: false,
            listener: None,
            data_source: None,
            extractor_flags: ExtractorFlags::default(),
            video_track: None,
            video_track_format: None,
            audio_track: None,
            video_source: None,
            audio_source: None,
            surface: None,
            video_renderer: None,
            audio_sink: None,
            audio_player: None,
            is_change_source_required: true,
            time_source_delta_us: 0,
            video_buffer: None,
            seeking: SeekState::None,
            seek_time_us: 0,
            seek_notification_sent: false,
            watch_audio_seek_complete: false,
            watch_audio_eos: false,
            clip: ClipContext::default(),
            effects: Vec::new(),
            current_effects: EffectMask::NONE,
            overlay_posted: false,
            current_framing_index: 0,
            decoded_video_ts_us: 0,
            storyboard_ts_us: 0,
            storyboard_start_ms: 0,
            frames_since_progress: 0,
            start_next_notified: false,
            is_still_source: false,
            audio_mix_settings: AudioMixSettings::default(),
            audio_mix_pcm: None,
            audio_mix_storyboard_ts_ms: 0,
            audio_mix_begin_cut_ms: 0,
            audio_mix_primary_volume: 0,
            is_async_prepare: false,
            prepare_result: Ok(()),
            stream_done_status: None,
            video_event_pending: false,
            stream_done_pending: false,
            audio_status_pending: false,
            progress_pending: false,
            overlay_event_pending: false,
        }
    }
}

pub(crate) struct PlayerShared {
    self_ref: Weak<PlayerShared>,
    pub(crate) inner: Mutex<PlayerInner>,
    pub(crate) prepared_cond: Condvar,
    pub(crate) misc: Mutex<MiscState>,
    pub(crate) control: ControlLock,
    pub(crate) queue: TimedEventQueue,
    pub(crate) events: PlayerEvents,
    pub(crate) components: PlayerComponents,
    pub(crate) config: SyncConfig,
    pub(crate) system_time: SystemTimeSource,
}

/// Observer handed to the audio player; forwards its callbacks onto the
/// event queue.
struct PlayerAudioObserver {
    shared: Weak<PlayerShared>,
}

impl AudioObserver for PlayerAudioObserver {
    fn post_audio_eos(&self, delay: Duration) {
        if let Some(shared) = self.shared.upgrade() {
            let mut inner = shared.lock_inner();
            shared.post_check_audio_status_locked(&mut inner, delay.as_micros() as i64);
        }
    }

    fn post_audio_seek_complete(&self) {
        if let Some(shared) = self.shared.upgrade() {
            let mut inner = shared.lock_inner();
            shared.post_check_audio_status_locked(&mut inner, 0);
        }
    }
}

/// The preview player's public controller surface.
pub struct PreviewPlayer {
    shared: Arc<PlayerShared>,
}

impl PreviewPlayer {
    /// Creates a player wired to the given external components, with the
    /// default sync policy.
    pub fn new(components: PlayerComponents) -> Self {
        Self::with_config(components, SyncConfig::default())
    }

    /// Creates a player with an explicit sync policy.
    pub fn with_config(components: PlayerComponents, config: SyncConfig) -> Self {
        let queue = TimedEventQueue::new();
        let events = PlayerEvents::allocate(&queue);
        let shared = Arc::new_cyclic(|self_ref| PlayerShared {
            self_ref: self_ref.clone(),
            inner: Mutex::new(PlayerInner::new()),
            prepared_cond: Condvar::new(),
            misc: Mutex::new(MiscState {
                duration_us: -1,
                video_time_us: 0,
            }),
            control: ControlLock::new(),
            queue,
            events,
            components,
            config,
            system_time: SystemTimeSource::new(),
        });
        Self { shared }
    }

    /// Registers the notification listener. Held weakly; the caller keeps
    /// ownership.
    pub fn set_listener(&self, listener: &Arc<dyn PlayerListener>) {
        let mut inner = self.shared.lock_inner();
        inner.listener = Some(Arc::downgrade(listener));
    }

    /// Points the player at a clip URI. Clears all previous state. The
    /// actual open happens during prepare so this never blocks on I/O.
    pub fn set_data_source(&self, uri: &str) -> Result<()> {
        let inner = self.shared.lock_inner();
        let mut inner = self.shared.reset_with_guard(inner);
        inner.data_source = Some(DataSource::Uri(uri.to_string()));
        debug!(uri, "data source set");
        Ok(())
    }

    /// Points the player at a region of an already-open file.
    pub fn set_data_source_fd(
        &self,
        path: std::path::PathBuf,
        offset: u64,
        length: u64,
    ) -> Result<()> {
        let inner = self.shared.lock_inner();
        let mut inner = self.shared.reset_with_guard(inner);
        inner.data_source = Some(DataSource::FileRange {
            path,
            offset,
            length,
        });
        Ok(())
    }

    /// Prepares the clip synchronously: opens the source, selects tracks,
    /// initializes decoders. Blocks until done or cancelled. Idempotent
    /// once prepared.
    pub fn prepare(&self) -> Result<()> {
        let mut inner = self.shared.lock_inner();
        if inner.flags.contains(PlayerFlags::PREPARED) {
            return Ok(());
        }
        if inner.flags.contains(PlayerFlags::PREPARING) {
            return Err(PlayerError::InvalidState("prepare already in progress").into());
        }
        inner.is_async_prepare = false;
        self.shared.prepare_async_locked(&mut inner)?;
        let (_inner, result) = self.shared.wait_prepared(inner);
        result
    }

    /// Starts preparation without blocking; completion is reported through
    /// the listener (`Prepared` or `Error`).
    pub fn prepare_async(&self) -> Result<()> {
        let mut inner = self.shared.lock_inner();
        if inner.flags.contains(PlayerFlags::PREPARING) {
            return Err(PlayerError::InvalidState("prepare already in progress").into());
        }
        inner.is_async_prepare = true;
        self.shared.prepare_async_locked(&mut inner)
    }

    /// Starts or resumes playback.
    pub fn play(&self) -> Result<()> {
        let mut inner = self.shared.lock_inner();
        inner
            .flags
            .remove(PlayerFlags::CACHE_UNDERRUN.union(PlayerFlags::INFORMED_AV_EOS));
        let (_inner, result) = self.shared.play_with_guard(inner);
        result
    }

    /// Pauses playback, keeping position.
    pub fn pause(&self) -> Result<()> {
        let mut inner = self.shared.lock_inner();
        inner.flags.remove(PlayerFlags::CACHE_UNDERRUN);
        self.shared.pause_locked(&mut inner, false)
    }

    /// Seeks to `time_us` on the clip timeline. Ignored when the container
    /// cannot seek (always allowed for still-image clips). While paused,
    /// seek-complete is notified immediately and a single preview frame is
    /// displayed.
    pub fn seek_to(&self, time_us: i64) -> Result<()> {
        let mut inner = self.shared.lock_inner();
        if !inner.extractor_flags.contains(ExtractorFlags::CAN_SEEK) && !inner.is_still_source {
            return Ok(());
        }
        self.shared.seek_to_locked(&mut inner, time_us)
    }

    /// Stops everything and returns the player to its initial state.
    /// Cancels an in-flight prepare and waits for it to drain.
    pub fn reset(&self) {
        let inner = self.shared.lock_inner();
        let _inner = self.shared.reset_with_guard(inner);
    }

    /// Binds the compositor window frames are rendered into.
    pub fn set_surface(&self, surface: TargetWindow) {
        let mut inner = self.shared.lock_inner();
        inner.surface = Some(surface);
    }

    /// Sets the audio output sink used when this player has to create the
    /// audio player itself (first clip of a storyboard).
    pub fn set_audio_sink(&self, sink: Arc<dyn AudioSink>) {
        let mut inner = self.shared.lock_inner();
        inner.audio_sink = Some(sink);
    }

    /// Injects the audio player shared with the previous clip's player, and
    /// decides whether its source must be swapped on `play`. When both the
    /// outgoing and incoming audio are silent stand-ins (and the video is a
    /// still image), the old source is kept and merely extended, avoiding
    /// an audible glitch at the transition.
    pub fn set_audio_player(&self, audio_player: SharedAudioPlayer) -> Result<()> {
        let mut inner = self.shared.lock_inner();
        if inner.flags.contains(PlayerFlags::PLAYING) {
            return Err(PlayerError::InvalidState("cannot swap audio player while playing").into());
        }
        inner.is_change_source_required = true;
        let end_cut_us = inner.clip.end_cut_us();

        let current_source = {
            let player = audio_player.lock().unwrap_or_else(PoisonError::into_inner);
            player.source()
        };
        inner.audio_player = Some(audio_player);

        let Some(current_source) = current_source else {
            // The shared player has no source yet; nothing to preserve.
            return Ok(());
        };

        // A real video clip always swaps; keeping the old audio source
        // would force frame drops to hold AV sync.
        if let Some(video) = inner.video_source.as_ref() {
            if !video.format().is_dummy_video() {
                trace!("video clip with silent audio; source swap required");
                return Ok(());
            }
        }

        let current_is_dummy = current_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .format()
            .is_dummy_audio();
        let ours_is_dummy = inner.audio_source.as_ref().is_some_and(|source| {
            source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .format()
                .is_dummy_audio()
        });

        if current_is_dummy && ours_is_dummy {
            debug!("silent-to-silent transition; extending shared source instead of swapping");
            inner.is_change_source_required = false;
            current_source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .set_duration(end_cut_us);
            if let Some(ours) = inner.audio_source.as_ref() {
                let _ = ours
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .stop();
            }
        }
        Ok(())
    }

    /// Loads the clip's effect list. Effects are expressed on the
    /// storyboard timeline and evaluated per frame.
    pub fn load_effects_settings(&self, effects: Vec<EffectSettings>) {
        let mut inner = self.shared.lock_inner();
        inner.effects = effects;
    }

    /// Applies overlay-mix parameters, forwarded to the audio player on
    /// `play`.
    pub fn load_audio_mix_settings(&self, settings: AudioMixSettings) {
        let mut inner = self.shared.lock_inner();
        inner.audio_mix_settings = settings;
    }

    /// Attaches the precomputed PCM overlay file.
    pub fn set_audio_mix_pcm_handle(&self, handle: Option<PcmFileHandle>) {
        let mut inner = self.shared.lock_inner();
        inner.audio_mix_pcm = handle;
    }

    /// Storyboard alignment for the audio mixer: the storyboard timestamp
    /// where this clip starts, its begin-cut, and the primary track volume.
    pub fn set_audio_mix_storyboard_params(
        &self,
        storyboard_ts_ms: u32,
        begin_cut_ms: u32,
        primary_volume: u32,
    ) {
        let mut inner = self.shared.lock_inner();
        inner.audio_mix_storyboard_ts_ms = storyboard_ts_ms;
        inner.audio_mix_begin_cut_ms = begin_cut_ms;
        inner.audio_mix_primary_volume = primary_volume;
    }

    /// Sets the clip's trim start in milliseconds.
    pub fn set_playback_begin_time(&self, ms: u32) {
        self.shared.lock_inner().clip.begin_cut_ms = ms;
    }

    /// Sets the clip's trim end in milliseconds.
    pub fn set_playback_end_time(&self, ms: u32) {
        self.shared.lock_inner().clip.end_cut_ms = ms;
    }

    /// Sets where this clip starts on the storyboard timeline.
    pub fn set_storyboard_start_time(&self, ms: u32) {
        let mut inner = self.shared.lock_inner();
        inner.storyboard_start_ms = ms;
        inner.storyboard_ts_us = ms_to_us(ms);
    }

    /// Sets the progress callback cadence in decoded frames.
    pub fn set_progress_callback_interval(&self, frames: u32) {
        self.shared.lock_inner().clip.progress_interval_frames = frames;
    }

    /// Sets how frames are fitted to the output and the target size.
    pub fn set_media_rendering_mode(&self, mode: RenderingMode, output_size: (u32, u32)) {
        let mut inner = self.shared.lock_inner();
        inner.clip.rendering_mode = mode;
        inner.clip.output_width = output_size.0;
        inner.clip.output_height = output_size.1;
    }

    /// Declares the pixel dimensions of a raw image clip (`.rgb` buffers
    /// carry no header).
    pub fn set_image_clip_properties(&self, width: u32, height: u32) {
        let mut inner = self.shared.lock_inner();
        inner.clip.image_width = width;
        inner.clip.image_height = height;
    }

    /// Decodes (without rendering) the first in-range frame, honoring a
    /// pending seek. Used for paused previews; the frame is retained as the
    /// in-flight buffer.
    pub fn read_first_video_frame(&self) -> Result<()> {
        let mut inner = self.shared.lock_inner();
        self.shared.read_first_video_frame_locked(&mut inner)
    }

    /// Storyboard-relative timestamp (ms) of the last decoded frame.
    pub fn last_rendered_time_ms(&self) -> i64 {
        let inner = self.shared.lock_inner();
        us_to_ms(inner.decoded_video_ts_us + inner.storyboard_ts_us)
            - i64::from(inner.clip.begin_cut_ms)
    }

    /// Re-anchors the progress timestamp base to the storyboard start time.
    /// Called by the controller when restarting a preview from this clip.
    pub fn reset_callback_timestamp(&self) {
        let mut inner = self.shared.lock_inner();
        inner.storyboard_ts_us = ms_to_us(inner.storyboard_start_ms);
    }

    /// Enables or disables looping playback.
    pub fn set_looping(&self, looping: bool) {
        let mut inner = self.shared.lock_inner();
        if looping {
            inner.flags.insert(PlayerFlags::LOOPING);
        } else {
            inner.flags.remove(PlayerFlags::LOOPING);
        }
    }

    /// True while playback is active.
    pub fn is_playing(&self) -> bool {
        self.shared
            .lock_inner()
            .flags
            .intersects(PlayerFlags::PLAYING.union(PlayerFlags::CACHE_UNDERRUN))
    }

    /// Total duration in microseconds, when known.
    pub fn duration_us(&self) -> Option<i64> {
        let misc = self.shared.lock_misc();
        (misc.duration_us >= 0).then_some(misc.duration_us)
    }

    /// Current position in microseconds: the pending seek target, else the
    /// last video time, else the audio clock.
    pub fn position_us(&self) -> i64 {
        let inner = self.shared.lock_inner();
        if inner.seeking != SeekState::None {
            return inner.seek_time_us;
        }
        if inner.video_source.is_some()
            && (inner.audio_player.is_none() || !inner.flags.contains(PlayerFlags::VIDEO_AT_EOS))
        {
            return self.shared.lock_misc().video_time_us;
        }
        if let Some(player) = inner.audio_player.as_ref() {
            return player
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .media_time_us();
        }
        0
    }

    /// The video's coded dimensions, once known.
    pub fn video_dimensions(&self) -> Option<(u32, u32)> {
        let inner = self.shared.lock_inner();
        let format = inner
            .video_source
            .as_ref()
            .map(|source| source.format())
            .or_else(|| inner.video_track_format.clone())?;
        (format.width > 0 && format.height > 0).then_some((format.width, format.height))
    }

    /// Whether `play` will swap the shared audio player's source for this
    /// clip (false on the silent-to-silent glitch-avoidance path).
    pub fn is_source_swap_required(&self) -> bool {
        self.shared.lock_inner().is_change_source_required
    }

    /// Snapshot of the internal state flags, for diagnostics.
    pub fn state_flags(&self) -> PlayerFlags {
        self.shared.lock_inner().flags
    }

    /// Takes the inter-player control lock. The holder is guaranteed not to
    /// race a playback-complete notification from any player sharing the
    /// lock's scope. Pair with [`release_control_lock`].
    ///
    /// [`release_control_lock`]: PreviewPlayer::release_control_lock
    pub fn acquire_control_lock(&self) {
        self.shared.control.acquire();
    }

    /// Releases the inter-player control lock.
    pub fn release_control_lock(&self) {
        self.shared.control.release();
    }
}

impl Drop for PreviewPlayer {
    fn drop(&mut self) {
        self.shared.queue.stop();
        let inner = self.shared.lock_inner();
        let _inner = self.shared.reset_with_guard(inner);
    }
}

impl PlayerShared {
    pub(crate) fn lock_inner(&self) -> MutexGuard<'_, PlayerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_misc(&self) -> MutexGuard<'_, MiscState> {
        self.misc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify_locked(&self, inner: &PlayerInner, notification: Notification) {
        if let Some(listener) = inner.listener.as_ref().and_then(Weak::upgrade) {
            listener.notify(notification);
        }
    }

    fn notify_unlocked(&self, listener: &Option<Weak<dyn PlayerListener>>, n: Notification) {
        if let Some(listener) = listener.as_ref().and_then(Weak::upgrade) {
            listener.notify(n);
        }
    }

    fn observer(&self) -> Arc<dyn AudioObserver> {
        Arc::new(PlayerAudioObserver {
            shared: self.self_ref.clone(),
        })
    }

    // ---- event posting -------------------------------------------------

    fn post_event(&self, kind: PlayerEventKind, delay_us: i64) {
        let weak = self.self_ref.clone();
        self.queue
            .post_with_delay(self.events.id(kind), delay_us, move || {
                dispatch(&weak, kind);
            });
    }

    pub(crate) fn post_video_event_locked(&self, inner: &mut PlayerInner, delay_us: i64) {
        if inner.video_event_pending {
            return;
        }
        inner.video_event_pending = true;
        let delay_us = if delay_us < 0 {
            DEFAULT_VIDEO_EVENT_DELAY_US
        } else {
            delay_us
        };
        self.post_event(PlayerEventKind::Video, delay_us);
    }

    pub(crate) fn post_stream_done_locked(&self, inner: &mut PlayerInner, status: StreamStatus) {
        if inner.stream_done_pending {
            return;
        }
        inner.stream_done_pending = true;
        inner.stream_done_status = Some(status);
        self.post_event(PlayerEventKind::StreamDone, 0);
    }

    pub(crate) fn post_check_audio_status_locked(&self, inner: &mut PlayerInner, delay_us: i64) {
        if inner.audio_status_pending {
            return;
        }
        inner.audio_status_pending = true;
        self.post_event(PlayerEventKind::CheckAudioStatus, delay_us);
    }

    pub(crate) fn post_progress_event_locked(&self, inner: &mut PlayerInner) {
        if inner.progress_pending {
            return;
        }
        inner.progress_pending = true;
        self.post_event(PlayerEventKind::ProgressCallback, 0);
    }

    pub(crate) fn post_overlay_update_locked(&self, inner: &mut PlayerInner) {
        if inner.overlay_event_pending {
            return;
        }
        inner.overlay_event_pending = true;
        self.post_event(PlayerEventKind::OverlayUpdate, 0);
    }

    fn cancel_player_events_locked(&self, inner: &mut PlayerInner) {
        self.queue.cancel(self.events.video);
        inner.video_event_pending = false;
        self.queue.cancel(self.events.stream_done);
        inner.stream_done_pending = false;
        self.queue.cancel(self.events.check_audio);
        inner.audio_status_pending = false;
        self.queue.cancel(self.events.progress);
        inner.progress_pending = false;
    }

    // ---- prepare -------------------------------------------------------

    fn prepare_async_locked(&self, inner: &mut PlayerInner) -> Result<()> {
        if inner.flags.contains(PlayerFlags::PREPARING) {
            return Err(PlayerError::InvalidState("prepare already in progress").into());
        }
        if !inner.queue_started {
            self.queue.start();
            inner.queue_started = true;
        }
        inner.flags.insert(PlayerFlags::PREPARING);
        self.post_event(PlayerEventKind::AsyncPrepare, 0);
        Ok(())
    }

    fn wait_prepared<'a>(
        &self,
        mut inner: MutexGuard<'a, PlayerInner>,
    ) -> (MutexGuard<'a, PlayerInner>, Result<()>) {
        while inner.flags.contains(PlayerFlags::PREPARING) {
            inner = self
                .prepared_cond
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let result = inner.prepare_result.clone();
        (inner, result)
    }

    pub(crate) fn on_prepare_async_event(&self) {
        let mut inner = self.lock_inner();
        trace!("async prepare event");

        if inner.flags.contains(PlayerFlags::PREPARE_CANCELLED) {
            debug!("prepare was cancelled before doing anything");
            self.abort_prepare_locked(&mut inner, PlayerError::PrepareCancelled.into());
            return;
        }

        if inner.data_source.is_some() {
            if let Err(e) = self.finish_set_data_source_locked(&mut inner) {
                self.abort_prepare_locked(&mut inner, e);
                return;
            }
        }

        if inner.video_track.is_some() && inner.video_source.is_none() {
            if let Err(e) = self.init_video_decoder_locked(&mut inner) {
                self.abort_prepare_locked(&mut inner, e);
                return;
            }
        }

        if inner.audio_track.is_some() && inner.audio_source.is_none() {
            if let Err(e) = self.init_audio_decoder_locked(&mut inner) {
                self.abort_prepare_locked(&mut inner, e);
                return;
            }
        }

        self.finish_async_prepare_locked(&mut inner);
    }

    fn finish_async_prepare_locked(&self, inner: &mut PlayerInner) {
        if inner.is_async_prepare {
            if inner.video_source.is_none() {
                self.notify_locked(
                    inner,
                    Notification::SetVideoSize {
                        width: 0,
                        height: 0,
                    },
                );
            } else {
                self.notify_video_size_locked(inner);
            }
            self.notify_locked(inner, Notification::Prepared);
        }

        inner.prepare_result = Ok(());
        inner
            .flags
            .remove(PlayerFlags::PREPARING.union(PlayerFlags::PREPARE_CANCELLED));
        inner.flags.insert(PlayerFlags::PREPARED);
        self.prepared_cond.notify_all();
    }

    fn abort_prepare_locked(&self, inner: &mut PlayerInner, err: Error) {
        warn!("prepare aborted: {err}");
        if inner.is_async_prepare {
            self.notify_locked(inner, Notification::Error(err.to_player_error()));
        }
        inner.prepare_result = Err(err);
        inner
            .flags
            .remove(PlayerFlags::PREPARING.union(PlayerFlags::PREPARE_CANCELLED));
        self.prepared_cond.notify_all();
    }

    fn finish_set_data_source_locked(&self, inner: &mut PlayerInner) -> Result<()> {
        let Some(source) = inner.data_source.clone() else {
            return Err(PlayerError::SourceOpen("no data source set".into()).into());
        };

        if source.is_still_image() {
            return self.set_data_source_still_locked(inner);
        }

        match self.components.extractors.create(&source) {
            Ok(extractor) => self.select_tracks_locked(inner, extractor),
            Err(e) => {
                if source.uri().is_some() {
                    // Not a container the extractor understands: preview it
                    // as a still image over silence.
                    debug!("extractor creation failed ({e}); trying still-image preview");
                    self.set_data_source_still_locked(inner)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn select_tracks_locked(
        &self,
        inner: &mut PlayerInner,
        mut extractor: Box<dyn MediaExtractor>,
    ) -> Result<()> {
        let mut have_audio = false;
        let mut have_video = false;

        for index in 0..extractor.track_count() {
            let Some(format) = extractor.track_format(index) else {
                continue;
            };

            if !have_video && format.is_video() {
                inner.video_track = Some(extractor.track(index)?);
                inner.video_track_format = Some(format);
                have_video = true;
            } else if !have_audio && format.is_audio() {
                if format.mime.eq_ignore_ascii_case(MIME_AUDIO_VORBIS) && extractor.auto_loop() {
                    inner.flags.insert(PlayerFlags::AUTO_LOOPING);
                }
                inner.audio_track = Some(extractor.track(index)?);
                have_audio = true;
            }

            if have_audio && have_video {
                break;
            }
        }

        if !have_audio {
            debug!("no audio track; substituting silent source");
            let silence = DummyAudioSource::with_duration(inner.clip.end_cut_us());
            inner.audio_track = Some(Box::new(silence));
            have_audio = true;
        }

        if !have_audio && !have_video {
            return Err(PlayerError::SourceOpen("container has no usable tracks".into()).into());
        }

        inner.extractor_flags = extractor.flags();
        Ok(())
    }

    fn set_data_source_still_locked(&self, inner: &mut PlayerInner) -> Result<()> {
        let Some(uri) = inner.data_source.as_ref().and_then(DataSource::uri) else {
            return Err(PlayerError::SourceOpen("still-image preview needs a URI".into()).into());
        };
        let uri = uri.to_string();

        let mut silence = DummyAudioSource::with_duration(inner.clip.end_cut_us());
        silence.start()?;
        inner.audio_source = Some(Arc::new(Mutex::new(
            Box::new(silence) as Box<dyn MediaSource>
        )));

        {
            let mut misc = self.lock_misc();
            misc.duration_us = inner.clip.duration_us();
        }

        let mut video = DummyVideoSource::from_uri(
            &uri,
            inner.clip.image_width,
            inner.clip.image_height,
            inner.clip.duration_us(),
        )?;
        video.start()?;
        self.update_size_to_render_locked(inner, &video.format());
        inner.video_source = Some(Box::new(video));
        inner.is_still_source = true;
        Ok(())
    }

    // ---- decoder/renderer init -----------------------------------------

    pub(crate) fn init_renderer_locked(&self, inner: &mut PlayerInner) {
        if inner.surface.is_none() {
            return;
        }
        if inner.video_renderer.is_none() {
            let mut input = self.components.renderers.create_render_input();
            if let Some(video) = inner.video_source.as_ref() {
                input.update_video_size(&video.format());
            }
            inner.video_renderer = Some(input);
        }
    }

    fn init_video_decoder_locked(&self, inner: &mut PlayerInner) -> Result<()> {
        self.init_renderer_locked(inner);
        let Some(renderer) = inner.video_renderer.as_ref() else {
            return Err(PlayerError::InvalidState("no rendering surface attached").into());
        };
        let target = renderer.target_window();

        let Some(track) = inner.video_track.take() else {
            return Ok(());
        };
        let format = track.format();
        self.merge_duration(format.duration_us);
        inner.video_track_format = Some(format.clone());

        let mut source = self.components.decoders.create_video_decoder(track, target)?;
        self.update_size_to_render_locked(inner, &format);
        source
            .start()
            .map_err(|e| PlayerError::DecoderStart(format!("video: {e}")))?;
        inner.video_source = Some(source);
        Ok(())
    }

    fn init_audio_decoder_locked(&self, inner: &mut PlayerInner) -> Result<()> {
        let Some(track) = inner.audio_track.take() else {
            return Ok(());
        };
        let format = track.format();
        self.merge_duration(format.duration_us);

        let decoded: Box<dyn MediaSource> = if format.is_raw_audio() {
            track
        } else {
            match self.components.decoders.create_audio_decoder(track) {
                Ok(decoded) => decoded,
                Err(e) => {
                    if format.mime.eq_ignore_ascii_case(MIME_AUDIO_QCELP) {
                        // Legacy tolerance: missing QCELP decoders do not
                        // abort playback, the clip just plays silently.
                        debug!("no QCELP decoder available; continuing without audio");
                        return Ok(());
                    }
                    return Err(e);
                }
            }
        };

        let mut source = self.interpose_resampler(inner, decoded);
        source
            .start()
            .map_err(|e| PlayerError::DecoderStart(format!("audio: {e}")))?;
        inner.audio_source = Some(Arc::new(Mutex::new(source)));
        Ok(())
    }

    fn interpose_resampler(
        &self,
        inner: &PlayerInner,
        source: Box<dyn MediaSource>,
    ) -> Box<dyn MediaSource> {
        let Some(sink) = inner.audio_sink.as_ref() else {
            return source;
        };
        let format = source.format();
        if format.sample_rate == sink.sample_rate() && format.channel_count == sink.channel_count()
        {
            return source;
        }
        debug!(
            from_rate = format.sample_rate,
            to_rate = sink.sample_rate(),
            "interposing sample-rate converter"
        );
        Box::new(ResampleSource::new(
            source,
            sink.sample_rate(),
            sink.channel_count(),
        ))
    }

    fn merge_duration(&self, duration_us: Option<i64>) {
        if let Some(duration_us) = duration_us {
            let mut misc = self.lock_misc();
            if misc.duration_us < 0 || duration_us > misc.duration_us {
                misc.duration_us = duration_us;
            }
        }
    }

    pub(crate) fn update_size_to_render_locked(&self, inner: &mut PlayerInner, format: &MediaFormat) {
        if let Some(renderer) = inner.video_renderer.as_mut() {
            renderer.update_video_size(format);
        }
    }

    pub(crate) fn notify_video_size_locked(&self, inner: &mut PlayerInner) {
        let Some(video) = inner.video_source.as_ref() else {
            self.notify_locked(
                inner,
                Notification::SetVideoSize {
                    width: 0,
                    height: 0,
                },
            );
            return;
        };
        let mut format = video.format();
        if format.rotation_degrees == 0 {
            if let Some(track_format) = inner.video_track_format.as_ref() {
                format.rotation_degrees = track_format.rotation_degrees;
            }
        }
        let (width, height) = format.display_size();
        self.notify_locked(inner, Notification::SetVideoSize { width, height });
    }

    // ---- play / pause --------------------------------------------------

    fn play_with_guard<'a>(
        &self,
        mut inner: MutexGuard<'a, PlayerInner>,
    ) -> (MutexGuard<'a, PlayerInner>, Result<()>) {
        inner.flags.remove(PlayerFlags::SEEK_PREVIEW);
        if inner.flags.contains(PlayerFlags::PLAYING) {
            return (inner, Ok(()));
        }
        inner.start_next_notified = false;

        if !inner.flags.contains(PlayerFlags::PREPARED) {
            if inner.flags.contains(PlayerFlags::PREPARING) {
                return (
                    inner,
                    Err(PlayerError::InvalidState("prepare already in progress").into()),
                );
            }
            inner.is_async_prepare = false;
            if let Err(e) = self.prepare_async_locked(&mut inner) {
                return (inner, Err(e));
            }
            let (guard, result) = self.wait_prepared(inner);
            inner = guard;
            if let Err(e) = result {
                return (inner, Err(e));
            }
        }

        let result = self.start_playback_locked(&mut inner);
        (inner, result)
    }

    fn start_playback_locked(&self, inner: &mut PlayerInner) -> Result<()> {
        inner
            .flags
            .insert(PlayerFlags::PLAYING.union(PlayerFlags::FIRST_FRAME));

        let mut deferred_audio_seek = false;

        if inner.audio_source.is_some() {
            if inner.audio_player.is_none() {
                if let Some(sink) = inner.audio_sink.clone() {
                    debug!("creating audio player for first clip");
                    let player = self.components.audio_players.create(sink);
                    self.configure_audio_player_locked(inner, &player);
                    inner.flags.insert(PlayerFlags::AUDIOPLAYER_STARTED);

                    let start_result = player
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .start(true);
                    if let Err(e) = start_result {
                        inner
                            .flags
                            .remove(PlayerFlags::PLAYING.union(PlayerFlags::FIRST_FRAME));
                        return Err(e);
                    }
                    inner.audio_player = Some(player);
                    inner.flags.insert(PlayerFlags::AUDIO_RUNNING);
                    deferred_audio_seek = true;
                    inner.watch_audio_seek_complete = false;
                    inner.watch_audio_eos = true;
                }
            } else {
                let player = inner
                    .audio_player
                    .as_ref()
                    .map(Arc::clone)
                    .ok_or(PlayerError::InvalidState("audio player vanished"))?;
                let started = player
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_started();

                if inner.is_change_source_required {
                    trace!("play: swapping audio source on shared player");
                    if started {
                        player
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .pause(false);
                    }
                    self.configure_audio_player_locked(inner, &player);
                    if started {
                        player
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .resume();
                    } else {
                        let start_result = player
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .start(true);
                        if let Err(e) = start_result {
                            inner.audio_player = None;
                            inner
                                .flags
                                .remove(PlayerFlags::PLAYING.union(PlayerFlags::FIRST_FRAME));
                            return Err(e);
                        }
                    }
                } else {
                    trace!("play: continuing with the shared player's current source");
                    let mut guard = player.lock().unwrap_or_else(PoisonError::into_inner);
                    guard.set_mix_storyboard_skim(
                        inner.audio_mix_storyboard_ts_ms,
                        inner.audio_mix_begin_cut_ms,
                        inner.audio_mix_primary_volume,
                    );
                    guard.resume();
                }

                inner.flags.insert(
                    PlayerFlags::AUDIOPLAYER_STARTED.union(PlayerFlags::AUDIO_RUNNING),
                );
                deferred_audio_seek = true;
                inner.watch_audio_seek_complete = false;
                inner.watch_audio_eos = true;
            }
        }

        if inner.is_still_source {
            // Re-read once with a seek option: still sources restart their
            // timestamp clock from it, which anchors image playback.
            let seek_time_us = inner.seek_time_us;
            if let Some(video) = inner.video_source.as_mut() {
                let options = crate::media::source::ReadOptions::with_seek(
                    seek_time_us,
                    crate::media::source::SeekMode::Closest,
                );
                let _ = video.read(&options);
            }
        }

        if inner.video_source.is_some() {
            self.post_video_event_locked(inner, -1);
        }

        if deferred_audio_seek {
            // A seek requested while paused is honored now that audio runs.
            self.seek_audio_if_necessary_locked(inner);
        }

        if inner.flags.contains(PlayerFlags::AT_EOS) {
            // Legacy behaviour: starting again after completion replays
            // from the beginning.
            let _ = self.seek_to_locked(inner, 0);
        }

        Ok(())
    }

    fn configure_audio_player_locked(
        &self,
        inner: &mut PlayerInner,
        player: &SharedAudioPlayer,
    ) {
        let mut guard = player.lock().unwrap_or_else(PoisonError::into_inner);
        guard.set_observer(self.observer());
        if let Some(source) = inner.audio_source.as_ref() {
            if let Err(e) = guard.set_source(Arc::clone(source)) {
                warn!("audio player rejected source: {e}");
            }
        }
        guard.set_mix_settings(inner.audio_mix_settings.clone());
        guard.set_mix_pcm_handle(inner.audio_mix_pcm.clone());
        guard.set_mix_storyboard_skim(
            inner.audio_mix_storyboard_ts_ms,
            inner.audio_mix_begin_cut_ms,
            inner.audio_mix_primary_volume,
        );
    }

    pub(crate) fn start_audio_player_locked(&self, inner: &mut PlayerInner) -> Result<()> {
        if inner.audio_source.is_none() || inner.audio_player.is_none() {
            return Ok(());
        }
        let player = inner
            .audio_player
            .as_ref()
            .map(Arc::clone)
            .ok_or(PlayerError::InvalidState("audio player vanished"))?;

        if !inner.flags.contains(PlayerFlags::AUDIOPLAYER_STARTED) {
            inner.flags.insert(PlayerFlags::AUDIOPLAYER_STARTED);
            let result = player
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .start(true);
            if let Err(e) = result {
                self.notify_locked(inner, Notification::Error(e.to_player_error()));
                return Err(e);
            }
        } else {
            player
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .resume();
        }

        inner.flags.insert(PlayerFlags::AUDIO_RUNNING);
        inner.watch_audio_eos = true;
        Ok(())
    }

    pub(crate) fn pause_locked(&self, inner: &mut PlayerInner, at_eos: bool) -> Result<()> {
        if !inner.flags.contains(PlayerFlags::PLAYING) {
            return Ok(());
        }

        self.cancel_player_events_locked(inner);

        if inner.flags.contains(PlayerFlags::AUDIO_RUNNING) {
            if let Some(player) = inner.audio_player.as_ref() {
                player
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pause(at_eos);
            }
            inner.flags.remove(PlayerFlags::AUDIO_RUNNING);
        }

        inner.flags.remove(PlayerFlags::PLAYING);
        Ok(())
    }

    // ---- seeking -------------------------------------------------------

    pub(crate) fn seek_to_locked(&self, inner: &mut PlayerInner, time_us: i64) -> Result<()> {
        trace!(time_us, "seek requested");

        if inner.flags.contains(PlayerFlags::PLAYING)
            && inner.video_source.is_some()
            && inner.flags.contains(PlayerFlags::VIDEO_AT_EOS)
        {
            // Video already completed so no video event is in flight; post
            // one or the new seek would never be honored.
            self.post_video_event_locked(inner, DEFAULT_VIDEO_EVENT_DELAY_US);
        }

        inner.seeking = SeekState::Seek;
        inner.seek_time_us = time_us;
        inner.seek_notification_sent = false;
        inner.flags.remove(
            PlayerFlags::AT_EOS
                .union(PlayerFlags::AUDIO_AT_EOS)
                .union(PlayerFlags::VIDEO_AT_EOS),
        );

        self.seek_audio_if_necessary_locked(inner);

        if !inner.flags.contains(PlayerFlags::PLAYING) {
            trace!("seeking while paused; sending seek-complete immediately");
            self.notify_locked(inner, Notification::SeekComplete);
            inner.seek_notification_sent = true;

            if inner.flags.contains(PlayerFlags::PREPARED) && inner.video_source.is_some() {
                inner.flags.insert(PlayerFlags::SEEK_PREVIEW);
                self.post_video_event_locked(inner, 0);
            }
        }
        Ok(())
    }

    pub(crate) fn seek_audio_if_necessary_locked(&self, inner: &mut PlayerInner) {
        if inner.seeking != SeekState::None
            && inner.video_source.is_none()
            && inner.audio_player.is_some()
        {
            if let Some(player) = inner.audio_player.as_ref() {
                let _ = player
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .seek_to(inner.seek_time_us);
            }
            inner.watch_audio_seek_complete = true;
            inner.watch_audio_eos = true;
        }
    }

    // ---- stream done / audio status ------------------------------------

    pub(crate) fn on_stream_done(&self) {
        let mut inner = self.lock_inner();
        if !inner.stream_done_pending {
            return;
        }
        inner.stream_done_pending = false;

        let status = inner
            .stream_done_status
            .take()
            .unwrap_or(StreamStatus::EndOfStream);

        if let StreamStatus::Error(err) = status {
            warn!("stream finished with error: {err}");
            self.notify_locked(&inner, Notification::Error(err));
            let _ = self.pause_locked(&mut inner, true);
            inner.flags.insert(PlayerFlags::AT_EOS);
            return;
        }

        let all_done = (inner.video_source.is_none()
            || inner.flags.contains(PlayerFlags::VIDEO_AT_EOS))
            && (inner.audio_source.is_none() || inner.flags.contains(PlayerFlags::AUDIO_AT_EOS));
        if !all_done {
            return;
        }

        if inner
            .flags
            .intersects(PlayerFlags::LOOPING.union(PlayerFlags::AUTO_LOOPING))
        {
            debug!("stream done; looping back to start");
            let _ = self.seek_to_locked(&mut inner, 0);
            if inner.video_source.is_some() {
                self.post_video_event_locked(&mut inner, -1);
            }
            return;
        }

        debug!("playback complete");
        let _ = self.pause_locked(&mut inner, true);

        // One completion per play session: when two players share one audio
        // player across a silent transition, the carried-over source
        // finishing for the *next* clip must not re-notify this one.
        let should_notify = !inner.flags.contains(PlayerFlags::INFORMED_AV_EOS);
        if should_notify {
            inner.flags.insert(PlayerFlags::INFORMED_AV_EOS);
        }
        inner.flags.insert(PlayerFlags::AT_EOS);
        let listener = inner.listener.clone();
        drop(inner);

        // The control lock is held across the notification so a controller
        // stopping this player cannot race the completion callback.
        self.control.acquire();
        if should_notify {
            self.notify_unlocked(&listener, Notification::PlaybackComplete);
        }
        self.control.release();
    }

    pub(crate) fn on_check_audio_status(&self) {
        let mut inner = self.lock_inner();
        if !inner.audio_status_pending {
            return;
        }
        inner.audio_status_pending = false;

        let Some(player) = inner.audio_player.as_ref().map(Arc::clone) else {
            return;
        };

        if inner.watch_audio_seek_complete {
            let seeking = player
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_seeking();
            if !seeking {
                inner.watch_audio_seek_complete = false;
                if !inner.seek_notification_sent {
                    self.notify_locked(&inner, Notification::SeekComplete);
                    inner.seek_notification_sent = true;
                }
                inner.seeking = SeekState::None;
            }
        }

        if inner.watch_audio_eos {
            let status = player
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .reached_eos();
            if let Some(status) = status {
                inner.watch_audio_eos = false;
                inner
                    .flags
                    .insert(PlayerFlags::AUDIO_AT_EOS.union(PlayerFlags::FIRST_FRAME));
                self.post_stream_done_locked(&mut inner, status);
            }
        }
    }

    // ---- reset ---------------------------------------------------------

    fn reset_with_guard<'a>(
        &self,
        mut inner: MutexGuard<'a, PlayerInner>,
    ) -> MutexGuard<'a, PlayerInner> {
        if inner.flags.contains(PlayerFlags::PREPARING) {
            inner.flags.insert(PlayerFlags::PREPARE_CANCELLED);
        }
        while inner.flags.contains(PlayerFlags::PREPARING) {
            if !self.queue.is_running() {
                // The queue was stopped with the prepare event still
                // pending; it will never fire, so drain the state here.
                inner
                    .flags
                    .remove(PlayerFlags::PREPARING.union(PlayerFlags::PREPARE_CANCELLED));
                inner.prepare_result = Err(PlayerError::PrepareCancelled.into());
                break;
            }
            inner = self
                .prepared_cond
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }

        self.cancel_player_events_locked(&mut inner);

        inner.video_track = None;
        inner.video_track_format = None;
        inner.audio_track = None;

        // Shut audio down first so the reset feels instantaneous; the audio
        // player owns stopping a source it has taken possession of.
        if inner.audio_player.is_none() {
            if let Some(source) = inner.audio_source.take() {
                let _ = source
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .stop();
            }
        }
        inner.audio_source = None;

        // The audio player itself is shared and outlives us; the controller
        // releases it.
        inner.audio_player = None;

        inner.video_buffer = None;

        if let Some(mut video) = inner.video_source.take() {
            let _ = video.stop();
            // The decoder may release asynchronously; wait it out or the
            // next instantiation of the same component fails.
            video.await_release();
        }

        {
            let mut misc = self.lock_misc();
            misc.duration_us = -1;
            misc.video_time_us = 0;
        }

        inner.flags.clear();
        inner.extractor_flags = ExtractorFlags::default();
        inner.time_source_delta_us = 0;
        inner.seeking = SeekState::None;
        inner.seek_notification_sent = false;
        inner.seek_time_us = 0;
        inner.data_source = None;
        inner.current_effects = EffectMask::NONE;
        inner.overlay_posted = false;
        inner.is_still_source = false;
        inner.decoded_video_ts_us = 0;
        inner.frames_since_progress = 0;
        inner.start_next_notified = false;
        inner.is_change_source_required = true;
        inner.prepare_result = Ok(());
        inner.stream_done_status = None;
        inner
    }
}
