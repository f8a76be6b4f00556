// SPDX-License-Identifier: MPL-2.0
//! Synthetic still-image source.
//!
//! Image clips are previewed by decoding one frame up front and re-emitting
//! it on every read, with timestamps advancing in real time, until the
//! requested duration elapses. `.rgb` URIs are raw RGB888 buffers at the
//! clip's configured size; anything else goes through the image decoder.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::{PlayerError, Result};
use crate::media::format::{COMPONENT_DUMMY_VIDEO, MIME_VIDEO_RAW, MediaFormat};
use crate::media::source::{FrameBuffer, MediaSource, ReadEvent, ReadOptions};

const BYTES_PER_PIXEL: usize = 3; // RGB888

/// Emits a fixed frame with real-time timestamps for a set duration.
pub struct DummyVideoSource {
    frame: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    duration_us: i64,
    base_us: i64,
    started_at: Option<Instant>,
    started: bool,
}

impl DummyVideoSource {
    /// Decodes the still frame behind `uri` at the clip's configured size.
    pub fn from_uri(uri: &str, width: u32, height: u32, duration_us: i64) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PlayerError::SourceOpen(
                "image clip dimensions are not configured".into(),
            )
            .into());
        }

        let path = strip_file_scheme(uri);
        let frame = if uri.to_ascii_lowercase().ends_with(".rgb") {
            load_raw_rgb(Path::new(path), width, height)?
        } else {
            decode_image(Path::new(path), width, height)?
        };

        debug!(uri, width, height, duration_us, "loaded still frame");
        Ok(Self {
            frame: Arc::new(frame),
            width,
            height,
            duration_us: duration_us.max(0),
            base_us: 0,
            started_at: None,
            started: false,
        })
    }

    fn current_time_us(&mut self) -> i64 {
        let started_at = *self.started_at.get_or_insert_with(Instant::now);
        self.base_us + started_at.elapsed().as_micros() as i64
    }
}

impl MediaSource for DummyVideoSource {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        self.started_at = None;
        self.base_us = 0;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn read(&mut self, options: &ReadOptions) -> ReadEvent {
        if !self.started {
            return ReadEvent::Error(PlayerError::InvalidState("still source not started"));
        }

        if let Some((target_us, _mode)) = options.seek_target() {
            // Restart the timestamp clock at the seek target.
            self.base_us = target_us.max(0);
            self.started_at = Some(Instant::now());
        }

        let time_us = self.current_time_us();
        if time_us >= self.duration_us {
            return ReadEvent::EndOfStream;
        }

        ReadEvent::Frame(FrameBuffer {
            data: Arc::clone(&self.frame),
            range_length: self.frame.len(),
            time_us,
        })
    }

    fn format(&self) -> MediaFormat {
        MediaFormat {
            mime: MIME_VIDEO_RAW.into(),
            decoder_component: COMPONENT_DUMMY_VIDEO.into(),
            width: self.width,
            height: self.height,
            duration_us: Some(self.duration_us),
            ..MediaFormat::default()
        }
    }

    fn set_duration(&mut self, duration_us: i64) {
        self.duration_us = duration_us.max(0);
    }
}

fn strip_file_scheme(uri: &str) -> &str {
    uri.strip_prefix("file://").unwrap_or(uri)
}

fn load_raw_rgb(path: &Path, width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = width as usize * height as usize * BYTES_PER_PIXEL;
    let mut data = fs::read(path)?;
    if data.len() < expected {
        return Err(PlayerError::SourceOpen(format!(
            "raw RGB buffer {} is {} bytes, need {} for {}x{}",
            path.display(),
            data.len(),
            expected,
            width,
            height
        ))
        .into());
    }
    data.truncate(expected);
    Ok(data)
}

fn decode_image(path: &Path, width: u32, height: u32) -> Result<Vec<u8>> {
    let image = image_rs::open(path)
        .map_err(|e| PlayerError::SourceOpen(format!("cannot decode {}: {e}", path.display())))?
        .to_rgb8();

    if image.dimensions() == (width, height) {
        return Ok(image.into_raw());
    }

    let resized = image_rs::imageops::resize(
        &image,
        width,
        height,
        image_rs::imageops::FilterType::Triangle,
    );
    Ok(resized.into_raw())
}
