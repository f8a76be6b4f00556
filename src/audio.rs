// SPDX-License-Identifier: MPL-2.0
//! The shared audio player contract.
//!
//! The audio player is owned by the storyboard controller and shared across
//! successive preview players so that audio keeps flowing through clip
//! transitions. This module defines the surface the engine drives — source
//! swapping, mix configuration, transport, and the media clock — plus the
//! observer through which the audio player posts events back.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::Result;
use crate::media::source::{SharedSource, StreamStatus};

/// Mix parameters for blending the overlay PCM into the primary track.
/// The engine forwards these opaquely; interpretation belongs to the mixer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioMixSettings {
    /// Storyboard time at which the overlay starts mixing, in milliseconds.
    pub overlay_start_ms: u32,

    /// Overlay track volume, percent.
    pub overlay_volume: u32,

    /// Whether the overlay loops for the remainder of the storyboard.
    pub loop_overlay: bool,
}

/// Handle to a precomputed PCM overlay file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmFileHandle(pub PathBuf);

/// The audio output device boundary. Only the PCM layout matters to the
/// engine: it decides whether a decoded track needs rate conversion.
pub trait AudioSink: Send + Sync {
    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Output channel count.
    fn channel_count(&self) -> u16;
}

/// Callbacks from the audio player back into the engine.
///
/// Implementations post events onto the player's queue; the audio player
/// must invoke them from its own thread, never synchronously from inside a
/// control call, or it will deadlock against the player mutex.
pub trait AudioObserver: Send + Sync {
    /// Audio reached end-of-stream; check status after `delay`.
    fn post_audio_eos(&self, delay: Duration);

    /// A previously requested audio seek completed.
    fn post_audio_seek_complete(&self);
}

/// The externally-owned audio player the engine configures and drives.
pub trait AudioPlayer: Send {
    /// Swaps in a new audio source. May fail while running.
    fn set_source(&mut self, source: SharedSource) -> Result<()>;

    /// The currently attached source, if any.
    fn source(&self) -> Option<SharedSource>;

    /// Registers the engine's observer for EOS/seek callbacks.
    fn set_observer(&mut self, observer: Arc<dyn AudioObserver>);

    /// Applies overlay mix parameters.
    fn set_mix_settings(&mut self, settings: AudioMixSettings);

    /// Attaches (or detaches) the overlay PCM file.
    fn set_mix_pcm_handle(&mut self, handle: Option<PcmFileHandle>);

    /// Realigns the mixer to the storyboard on a clip transition: the
    /// storyboard timestamp, the new clip's begin-cut, and the primary
    /// track volume (percent).
    fn set_mix_storyboard_skim(
        &mut self,
        storyboard_ts_ms: u32,
        begin_cut_ms: u32,
        primary_volume: u32,
    );

    /// Starts playback. `source_already_started` indicates the engine
    /// already started the media source to enable prefetching.
    fn start(&mut self, source_already_started: bool) -> Result<()>;

    /// Pauses playback. With `play_pending_samples`, queued samples are
    /// drained first (used when pausing at end-of-stream).
    fn pause(&mut self, play_pending_samples: bool);

    /// Resumes after a pause.
    fn resume(&mut self);

    /// Seeks the audio stream.
    fn seek_to(&mut self, time_us: i64) -> Result<()>;

    /// Current media clock position in microseconds.
    fn media_time_us(&self) -> i64;

    /// A `(real_time_us, media_time_us)` calibration pair, when available.
    fn media_time_mapping(&self) -> Option<(i64, i64)>;

    /// Terminal status once the audio stream has finished, else `None`.
    fn reached_eos(&self) -> Option<StreamStatus>;

    /// True while a requested seek is still in flight.
    fn is_seeking(&self) -> bool;

    /// True once `start` has succeeded.
    fn is_started(&self) -> bool;
}

/// Reference-counted handle to the shared audio player. Mutating
/// operations are serialized by the mutex; cross-player ordering is the
/// controller's responsibility via the control lock.
pub type SharedAudioPlayer = Arc<Mutex<dyn AudioPlayer>>;

/// Creates audio players bound to a sink. Used for the first clip, before
/// the controller has a player to share.
pub trait AudioPlayerFactory: Send + Sync {
    /// Creates a stopped audio player outputting to `sink`.
    fn create(&self, sink: Arc<dyn AudioSink>) -> SharedAudioPlayer;
}
