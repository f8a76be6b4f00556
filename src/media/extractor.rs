// SPDX-License-Identifier: MPL-2.0
//! Container extractor boundary.
//!
//! The demuxer is an external collaborator; the player only needs to
//! enumerate tracks, take the first audio and first video track, and ask
//! whether the container supports seeking.

use std::path::PathBuf;

use crate::error::Result;
use crate::media::format::MediaFormat;
use crate::media::source::MediaSource;

/// Capability flags advertised by an extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractorFlags(u32);

impl ExtractorFlags {
    /// The container supports seeking.
    pub const CAN_SEEK: ExtractorFlags = ExtractorFlags(1);

    /// Returns flags with `other` added.
    pub fn with(self, other: ExtractorFlags) -> Self {
        ExtractorFlags(self.0 | other.0)
    }

    /// Returns true when all bits of `other` are present.
    pub fn contains(self, other: ExtractorFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Where the clip bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// A `file:` path, raw local path, or any URI the factory recognises.
    /// A `.rgb` suffix routes around the extractor entirely (still image).
    Uri(String),

    /// An already-open file region.
    FileRange {
        path: PathBuf,
        offset: u64,
        length: u64,
    },
}

impl DataSource {
    /// Returns the URI string when this source is URI-backed.
    pub fn uri(&self) -> Option<&str> {
        match self {
            DataSource::Uri(uri) => Some(uri),
            DataSource::FileRange { .. } => None,
        }
    }

    /// Returns true for URIs naming a raw RGB still-image buffer.
    pub fn is_still_image(&self) -> bool {
        self.uri()
            .is_some_and(|uri| uri.to_ascii_lowercase().ends_with(".rgb"))
    }
}

/// A demuxed container.
pub trait MediaExtractor: Send {
    /// Number of tracks in the container.
    fn track_count(&self) -> usize;

    /// Format metadata for track `index`.
    fn track_format(&self, index: usize) -> Option<MediaFormat>;

    /// Takes ownership of track `index` as a readable source.
    fn track(&mut self, index: usize) -> Result<Box<dyn MediaSource>>;

    /// Capability flags.
    fn flags(&self) -> ExtractorFlags;

    /// Container metadata requested auto-looping playback (only honored for
    /// Vorbis audio tracks).
    fn auto_loop(&self) -> bool {
        false
    }
}

/// Opens containers from data sources.
pub trait ExtractorFactory: Send + Sync {
    /// Creates an extractor for `source`. Failure routes still-image clips
    /// to the synthetic source fallback.
    fn create(&self, source: &DataSource) -> Result<Box<dyn MediaExtractor>>;
}
