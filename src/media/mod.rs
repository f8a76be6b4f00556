// SPDX-License-Identifier: MPL-2.0
//! Media sources: the decoder facade, container boundary, and the synthetic
//! sources that stand in for missing tracks.

pub mod dummy_audio;
pub mod dummy_video;
pub mod extractor;
pub mod format;
pub mod resample;
pub mod source;

pub use dummy_audio::{DummyAudioSource, shared_silence};
pub use dummy_video::DummyVideoSource;
pub use extractor::{DataSource, ExtractorFactory, ExtractorFlags, MediaExtractor};
pub use format::MediaFormat;
pub use resample::ResampleSource;
pub use source::{
    DecoderFactory, FrameBuffer, MediaSource, ReadEvent, ReadOptions, SeekMode, SharedSource,
    StreamStatus,
};
