// SPDX-License-Identifier: MPL-2.0
//! Decoder facade: the read contract between the player and its sources.
//!
//! Everything the video event loop consumes — hardware decoders, software
//! decoders, the synthetic dummy sources — implements [`MediaSource`]. The
//! engine never sees codec internals; it sees timestamped buffers, format
//! change notices, and end-of-stream.

use std::sync::{Arc, Mutex};

use crate::error::{PlayerError, Result};
use crate::media::format::MediaFormat;
use crate::render::TargetWindow;

/// How a seek target is resolved by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Seek to the frame closest to the target (used for exact-timestamp
    /// previews).
    Closest,

    /// Seek to the next sync frame at or after the target.
    NextSync,
}

/// Per-read options. A seek target applies to a single read; callers clear
/// it once consumed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    seek_to: Option<(i64, SeekMode)>,
}

impl ReadOptions {
    /// Options carrying a seek request.
    pub fn with_seek(time_us: i64, mode: SeekMode) -> Self {
        Self {
            seek_to: Some((time_us, mode)),
        }
    }

    /// Sets the seek target for the next read.
    pub fn set_seek_to(&mut self, time_us: i64, mode: SeekMode) {
        self.seek_to = Some((time_us, mode));
    }

    /// Clears a pending seek target.
    pub fn clear_seek_to(&mut self) {
        self.seek_to = None;
    }

    /// Returns the pending seek target, if any.
    pub fn seek_target(&self) -> Option<(i64, SeekMode)> {
        self.seek_to
    }
}

/// A decoded buffer handed from a source to the player.
///
/// The player holds at most one of these in flight; ownership transfers to
/// the renderer only for the duration of a render call.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    /// Payload bytes (pixel data for video, interleaved PCM for audio).
    pub data: Arc<Vec<u8>>,

    /// Valid byte length within `data`. Decoders occasionally emit spurious
    /// zero-length buffers which consumers skip.
    pub range_length: usize,

    /// Presentation timestamp in microseconds on the clip timeline.
    pub time_us: i64,
}

impl FrameBuffer {
    /// A buffer owning `data` in full.
    pub fn new(data: Vec<u8>, time_us: i64) -> Self {
        let range_length = data.len();
        Self {
            data: Arc::new(data),
            range_length,
            time_us,
        }
    }

    /// A zero-length buffer, as some decoders spuriously produce.
    pub fn empty(time_us: i64) -> Self {
        Self {
            data: Arc::new(Vec::new()),
            range_length: 0,
            time_us,
        }
    }

    /// Returns true when the buffer carries no payload.
    pub fn is_empty(&self) -> bool {
        self.range_length == 0
    }
}

/// Result of a single read from a source.
#[derive(Debug)]
pub enum ReadEvent {
    /// A decoded buffer.
    Frame(FrameBuffer),

    /// The output format changed; re-query [`MediaSource::format`] and
    /// reinitialize downstream consumers before reading again.
    FormatChanged,

    /// No more data; the stream finished normally.
    EndOfStream,

    /// The decoder failed.
    Error(PlayerError),
}

/// Terminal status of a stream, carried by the stream-done event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// The stream finished normally.
    EndOfStream,

    /// The stream failed with the given error.
    Error(PlayerError),
}

/// The facade every audio/video source implements.
pub trait MediaSource: Send {
    /// Starts producing data. Must be called before the first read.
    fn start(&mut self) -> Result<()>;

    /// Stops the source and releases decoder resources.
    fn stop(&mut self) -> Result<()>;

    /// Temporarily stops the demuxer read-head without releasing resources.
    /// Called on the audio source while a video seek is in flight so the
    /// audio codec's prefetching cannot race the video seek.
    fn pause(&mut self) {}

    /// Reads the next buffer, honoring a seek target in `options`.
    fn read(&mut self, options: &ReadOptions) -> ReadEvent;

    /// Current output format.
    fn format(&self) -> MediaFormat;

    /// Updates the source's total duration. Only synthetic sources honor
    /// this; the shared audio player uses it to extend a silent source
    /// across a clip transition instead of swapping sources.
    fn set_duration(&mut self, _duration_us: i64) {}

    /// Blocks until an asynchronously-releasing backend (e.g. a hardware
    /// codec) has fully let go of its resources, so the same component can
    /// be instantiated again. Default: release is synchronous.
    fn await_release(&mut self) {}
}

/// An audio source shared between a player and the audio player that
/// consumes it.
pub type SharedSource = Arc<Mutex<Box<dyn MediaSource>>>;

/// Creates the external decoders behind the facade.
pub trait DecoderFactory: Send + Sync {
    /// Wraps a demuxed video track in a decoder whose output is attached to
    /// the renderer's target window.
    fn create_video_decoder(
        &self,
        track: Box<dyn MediaSource>,
        target: TargetWindow,
    ) -> Result<Box<dyn MediaSource>>;

    /// Wraps a demuxed audio track in a decoder producing PCM.
    fn create_audio_decoder(&self, track: Box<dyn MediaSource>) -> Result<Box<dyn MediaSource>>;
}
