//! Media engine control
//!
//! The engine is an external long-running process driven over its RC
//! interface:
//! - `protocol`: the command lines it understands
//! - `transport`: process lifecycle and the command pipe
//! - `session`: the playback record shared with the analyzer
//! - `controller`: play/stop/track-change semantics on top of all three

pub mod controller;
pub mod protocol;
pub mod session;
pub mod transport;

pub use controller::{LaunchMode, PlaybackController, PlayerState};
pub use protocol::{RcCommand, TrackAddressing};
pub use session::{PlaybackState, SharedPlayback};
pub use transport::{ProcessTransport, Transport};
