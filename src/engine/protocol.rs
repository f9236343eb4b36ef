//! Line-oriented remote-control (RC) commands understood by the media engine
//!
//! One command per line, newline-terminated. Responses are never parsed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PlayerError, Result};

/// Highest value accepted by `volume`
pub const MAX_VOLUME: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcCommand {
    Play,
    Pause,
    Next,
    Prev,
    /// One-based track
    Seek(u32),
    /// Zero-based playlist entry
    Goto(u32),
    Volume(u32),
    Shutdown,
}

impl RcCommand {
    pub fn volume(level: u32) -> Result<Self> {
        if level > MAX_VOLUME {
            return Err(PlayerError::InvalidVolume(level));
        }
        Ok(RcCommand::Volume(level))
    }
}

impl fmt::Display for RcCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RcCommand::Play => write!(f, "play"),
            RcCommand::Pause => write!(f, "pause"),
            RcCommand::Next => write!(f, "next"),
            RcCommand::Prev => write!(f, "prev"),
            RcCommand::Seek(track) => write!(f, "seek {}", track),
            RcCommand::Goto(index) => write!(f, "goto {}", index),
            RcCommand::Volume(level) => write!(f, "volume {}", level),
            RcCommand::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// How a track number is expressed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackAddressing {
    /// `seek <n>`, one-based
    Seek,
    /// `goto <n-1>`, zero-based
    Goto,
}

impl TrackAddressing {
    /// Command that jumps to one-based `track`
    pub fn command_for_track(self, track: u32) -> Result<RcCommand> {
        if track == 0 {
            return Err(PlayerError::InvalidTrackNumber {
                track,
                available: None,
            });
        }
        Ok(match self {
            TrackAddressing::Seek => RcCommand::Seek(track),
            TrackAddressing::Goto => RcCommand::Goto(track - 1),
        })
    }
}
