// SPDX-License-Identifier: MPL-2.0
//! Track and source format metadata.

/// MIME prefix identifying video tracks.
pub const MIME_VIDEO_PREFIX: &str = "video/";

/// MIME prefix identifying audio tracks.
pub const MIME_AUDIO_PREFIX: &str = "audio/";

/// Uncompressed PCM audio.
pub const MIME_AUDIO_RAW: &str = "audio/raw";

/// Uncompressed RGB video frames.
pub const MIME_VIDEO_RAW: &str = "video/raw";

/// QCELP voice codec. A missing decoder for this format is tolerated and
/// playback continues silently.
pub const MIME_AUDIO_QCELP: &str = "audio/qcelp";

/// Vorbis audio; the only format whose container metadata can request
/// auto-looping playback.
pub const MIME_AUDIO_VORBIS: &str = "audio/vorbis";

/// Component name advertised by the synthetic silent-audio source.
pub const COMPONENT_DUMMY_AUDIO: &str = "DummyAudioSource";

/// Component name advertised by the synthetic still-image source.
pub const COMPONENT_DUMMY_VIDEO: &str = "DummyVideoSource";

/// Format metadata for a track or decoded source.
///
/// A plain struct stands in for the original key/value metadata bag: every
/// consumer in the engine reads a fixed set of keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaFormat {
    /// MIME type, e.g. `video/avc` or `audio/raw`.
    pub mime: String,

    /// Name of the component producing this data. Synthetic sources use
    /// [`COMPONENT_DUMMY_AUDIO`] / [`COMPONENT_DUMMY_VIDEO`] so the state
    /// machine can detect same-kind transitions between clips.
    pub decoder_component: String,

    /// Coded frame width in pixels (video only).
    pub width: u32,

    /// Coded frame height in pixels (video only).
    pub height: u32,

    /// Display width override, when the container advertises one.
    pub display_width: Option<u32>,

    /// Display height override, when the container advertises one.
    pub display_height: Option<u32>,

    /// Rotation in degrees (0, 90, 180, 270).
    pub rotation_degrees: i32,

    /// Track duration in microseconds, when known.
    pub duration_us: Option<i64>,

    /// Sample rate in Hz (audio only).
    pub sample_rate: u32,

    /// Channel count (audio only).
    pub channel_count: u16,
}

impl MediaFormat {
    /// Returns true for video tracks.
    pub fn is_video(&self) -> bool {
        self.mime.starts_with(MIME_VIDEO_PREFIX)
    }

    /// Returns true for audio tracks.
    pub fn is_audio(&self) -> bool {
        self.mime.starts_with(MIME_AUDIO_PREFIX)
    }

    /// Returns true when the track carries uncompressed PCM.
    pub fn is_raw_audio(&self) -> bool {
        self.mime.eq_ignore_ascii_case(MIME_AUDIO_RAW)
    }

    /// Returns true for the synthetic silent-audio source.
    pub fn is_dummy_audio(&self) -> bool {
        self.decoder_component == COMPONENT_DUMMY_AUDIO
    }

    /// Returns true for the synthetic still-image source.
    pub fn is_dummy_video(&self) -> bool {
        self.decoder_component == COMPONENT_DUMMY_VIDEO
    }

    /// Effective display size, falling back to the coded size and swapping
    /// axes for 90/270 degree rotations.
    pub fn display_size(&self) -> (u32, u32) {
        let width = self.display_width.unwrap_or(self.width);
        let height = self.display_height.unwrap_or(self.height);
        if self.rotation_degrees == 90 || self.rotation_degrees == 270 {
            (height, width)
        } else {
            (width, height)
        }
    }
}
