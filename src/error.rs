// SPDX-License-Identifier: MPL-2.0
use std::fmt;

#[derive(Debug, Clone)]
pub enum Error {
    Io(String),
    Config(String),
    Player(PlayerError),
}

/// Specific error types for preview playback.
/// Kept separate from [`Error`] so the stream-done path can carry a precise
/// cause upward without losing the I/O and configuration variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    /// The data source could not be opened (bad URI, missing file,
    /// extractor creation failure with no still-image fallback).
    SourceOpen(String),

    /// A decoder could not be created or failed to start.
    DecoderStart(String),

    /// A running decoder reported an error on the read path.
    Codec(String),

    /// The track's format is not supported by any available decoder.
    UnsupportedFormat(String),

    /// `prepare` was cancelled by `reset` before it completed.
    PrepareCancelled,

    /// The operation is not valid in the player's current state.
    InvalidState(&'static str),
}

impl PlayerError {
    /// Returns the numeric code reported through the listener's error
    /// notification. Codes are stable so controllers can switch on them.
    pub fn code(&self) -> i32 {
        match self {
            PlayerError::SourceOpen(_) => -1,
            PlayerError::DecoderStart(_) => -2,
            PlayerError::Codec(_) => -3,
            PlayerError::UnsupportedFormat(_) => -4,
            PlayerError::PrepareCancelled => -5,
            PlayerError::InvalidState(_) => -6,
        }
    }
}

impl Error {
    /// Collapses any error into the player-domain error carried by listener
    /// notifications.
    pub fn to_player_error(&self) -> PlayerError {
        match self {
            Error::Player(err) => err.clone(),
            Error::Io(msg) | Error::Config(msg) => PlayerError::SourceOpen(msg.clone()),
        }
    }
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerError::SourceOpen(msg) => write!(f, "Failed to open source: {}", msg),
            PlayerError::DecoderStart(msg) => write!(f, "Decoder failed to start: {}", msg),
            PlayerError::Codec(msg) => write!(f, "Codec error: {}", msg),
            PlayerError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            PlayerError::PrepareCancelled => write!(f, "Prepare was cancelled"),
            PlayerError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O Error: {}", e),
            Error::Config(e) => write!(f, "Config Error: {}", e),
            Error::Player(e) => write!(f, "Player Error: {}", e),
        }
    }
}

impl From<PlayerError> for Error {
    fn from(err: PlayerError) -> Self {
        Error::Player(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
