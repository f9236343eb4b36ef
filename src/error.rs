//! Errors surfaced to callers of the player
//!
//! Device absence, resolution failures, transport write failures and sample
//! read failures are handled where they happen and only logged. What remains
//! here is what a caller can act on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    /// Track numbers are one-based; `available` is the track count when known.
    #[error("invalid track number {track} (available: {available:?})")]
    InvalidTrackNumber { track: u32, available: Option<usize> },

    #[error("invalid volume {0}, expected 0-256")]
    InvalidVolume(u32),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
