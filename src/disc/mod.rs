//! Disc presence detection and device addressing

pub mod monitor;
pub mod resolve;

pub use monitor::{create_monitor, MonitorLoop, PresenceEvent, PresenceMonitor};
pub use resolve::{list_audio_tracks, resolve_target, ResolvedTarget};
