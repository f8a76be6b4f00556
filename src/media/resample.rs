// SPDX-License-Identifier: MPL-2.0
//! Sample-rate and channel conversion for decoded audio.
//!
//! The audio mixer consumes PCM at one fixed rate; decoders produce
//! whatever the track was encoded at. This wrapper interposes between the
//! two, converting 16-bit interleaved PCM by linear interpolation. It is
//! transparent to everything else: timestamps, format changes, and
//! end-of-stream pass straight through.

use crate::error::Result;
use crate::media::format::MediaFormat;
use crate::media::source::{FrameBuffer, MediaSource, ReadEvent, ReadOptions};

/// Wraps an audio source, converting its PCM to a target rate and layout.
pub struct ResampleSource {
    inner: Box<dyn MediaSource>,
    out_rate: u32,
    out_channels: u16,
}

impl ResampleSource {
    /// Creates a converter producing `out_rate` Hz, `out_channels`-channel
    /// PCM from `inner`.
    pub fn new(inner: Box<dyn MediaSource>, out_rate: u32, out_channels: u16) -> Self {
        Self {
            inner,
            out_rate,
            out_channels,
        }
    }

    fn convert(&self, frame: FrameBuffer) -> FrameBuffer {
        let format = self.inner.format();
        let in_rate = format.sample_rate;
        let in_channels = format.channel_count;
        if in_rate == self.out_rate && in_channels == self.out_channels {
            return frame;
        }

        let samples = bytes_to_samples(&frame.data[..frame.range_length]);
        let routed = convert_channels(&samples, in_channels, self.out_channels);
        let resampled = resample_linear(&routed, self.out_channels, in_rate, self.out_rate);
        FrameBuffer::new(samples_to_bytes(&resampled), frame.time_us)
    }
}

impl MediaSource for ResampleSource {
    fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    fn stop(&mut self) -> Result<()> {
        self.inner.stop()
    }

    fn pause(&mut self) {
        self.inner.pause();
    }

    fn read(&mut self, options: &ReadOptions) -> ReadEvent {
        match self.inner.read(options) {
            ReadEvent::Frame(frame) => ReadEvent::Frame(self.convert(frame)),
            other => other,
        }
    }

    fn format(&self) -> MediaFormat {
        MediaFormat {
            sample_rate: self.out_rate,
            channel_count: self.out_channels,
            ..self.inner.format()
        }
    }

    fn await_release(&mut self) {
        self.inner.await_release();
    }
}

fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

fn convert_channels(samples: &[i16], in_channels: u16, out_channels: u16) -> Vec<i16> {
    let in_channels = usize::from(in_channels.max(1));
    let out_channels = usize::from(out_channels.max(1));
    if in_channels == out_channels {
        return samples.to_vec();
    }

    let frames = samples.len() / in_channels;
    let mut out = Vec::with_capacity(frames * out_channels);
    for frame in samples.chunks_exact(in_channels) {
        match (in_channels, out_channels) {
            (1, 2) => {
                out.push(frame[0]);
                out.push(frame[0]);
            }
            (2, 1) => {
                out.push(((i32::from(frame[0]) + i32::from(frame[1])) / 2) as i16);
            }
            _ => {
                // General case: copy what maps, repeat the last channel to pad.
                for ch in 0..out_channels {
                    out.push(frame[ch.min(in_channels - 1)]);
                }
            }
        }
    }
    out
}

fn resample_linear(samples: &[i16], channels: u16, in_rate: u32, out_rate: u32) -> Vec<i16> {
    if in_rate == out_rate || in_rate == 0 || out_rate == 0 {
        return samples.to_vec();
    }

    let channels = usize::from(channels.max(1));
    let in_frames = samples.len() / channels;
    if in_frames == 0 {
        return Vec::new();
    }

    let out_frames =
        ((in_frames as u64 * u64::from(out_rate)) / u64::from(in_rate)).max(1) as usize;
    let step = in_frames as f64 / out_frames as f64;

    let mut out = Vec::with_capacity(out_frames * channels);
    for i in 0..out_frames {
        let pos = i as f64 * step;
        let index = pos as usize;
        let frac = pos - index as f64;
        let next = (index + 1).min(in_frames - 1);
        for ch in 0..channels {
            let a = f64::from(samples[index * channels + ch]);
            let b = f64::from(samples[next * channels + ch]);
            out.push((a + (b - a) * frac).round() as i16);
        }
    }
    out
}
