// SPDX-License-Identifier: MPL-2.0
//! Synthetic silent-audio source.
//!
//! When a clip has no audio track, the shared audio player still needs a
//! source to consume — swapping it out or letting it run dry produces an
//! audible glitch at clip boundaries. This source feeds zeroed PCM for a
//! duration that can be extended while it is playing, so a transition
//! between two silent clips never touches the audio player at all.

use std::sync::Arc;
use tracing::trace;

use crate::error::{PlayerError, Result};
use crate::media::format::{COMPONENT_DUMMY_AUDIO, MIME_AUDIO_RAW, MediaFormat};
use crate::media::source::{FrameBuffer, MediaSource, ReadEvent, ReadOptions};
use crate::time_units::MICROS_PER_SECOND;

/// Default sample rate of the silent source.
pub const DUMMY_AUDIO_SAMPLE_RATE: u32 = 32_000;

/// Default channel count of the silent source.
pub const DUMMY_AUDIO_CHANNELS: u16 = 2;

/// Default buffer duration per read.
pub const DUMMY_AUDIO_FRAME_US: i64 = 20_000;

const BYTES_PER_SAMPLE: usize = 2; // 16-bit PCM

/// Produces zeroed 16-bit PCM at a fixed rate until its duration elapses.
pub struct DummyAudioSource {
    sample_rate: u32,
    channel_count: u16,
    frame_duration_us: i64,
    duration_us: i64,
    position_us: i64,
    started: bool,
}

impl DummyAudioSource {
    /// Creates a silent source of `duration_us` at the given PCM layout.
    pub fn new(
        sample_rate: u32,
        channel_count: u16,
        frame_duration_us: i64,
        duration_us: i64,
    ) -> Self {
        Self {
            sample_rate,
            channel_count,
            frame_duration_us,
            duration_us: duration_us.max(0),
            position_us: 0,
            started: false,
        }
    }

    /// A silent source with the default layout (32 kHz stereo, 20 ms reads).
    pub fn with_duration(duration_us: i64) -> Self {
        Self::new(
            DUMMY_AUDIO_SAMPLE_RATE,
            DUMMY_AUDIO_CHANNELS,
            DUMMY_AUDIO_FRAME_US,
            duration_us,
        )
    }

    fn samples_for(&self, duration_us: i64) -> usize {
        let per_channel =
            (i64::from(self.sample_rate) * duration_us / MICROS_PER_SECOND).max(0) as usize;
        per_channel * usize::from(self.channel_count)
    }
}

impl MediaSource for DummyAudioSource {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        self.position_us = 0;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn read(&mut self, options: &ReadOptions) -> ReadEvent {
        if !self.started {
            return ReadEvent::Error(PlayerError::InvalidState("silent source not started"));
        }

        if let Some((target_us, _mode)) = options.seek_target() {
            self.position_us = target_us.clamp(0, self.duration_us);
        }

        if self.position_us >= self.duration_us {
            return ReadEvent::EndOfStream;
        }

        let chunk_us = self.frame_duration_us.min(self.duration_us - self.position_us);
        let data = vec![0u8; self.samples_for(chunk_us) * BYTES_PER_SAMPLE];
        let frame = FrameBuffer::new(data, self.position_us);
        self.position_us += chunk_us;
        ReadEvent::Frame(frame)
    }

    fn format(&self) -> MediaFormat {
        MediaFormat {
            mime: MIME_AUDIO_RAW.into(),
            decoder_component: COMPONENT_DUMMY_AUDIO.into(),
            duration_us: Some(self.duration_us),
            sample_rate: self.sample_rate,
            channel_count: self.channel_count,
            ..MediaFormat::default()
        }
    }

    fn set_duration(&mut self, duration_us: i64) {
        trace!(
            from = self.duration_us,
            to = duration_us,
            "extending silent source duration"
        );
        self.duration_us = duration_us.max(0);
    }
}

/// Convenience constructor for a shared silent source.
pub fn shared_silence(duration_us: i64) -> crate::media::source::SharedSource {
    Arc::new(std::sync::Mutex::new(
        Box::new(DummyAudioSource::with_duration(duration_us)) as Box<dyn MediaSource>,
    ))
}
