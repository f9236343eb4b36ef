//! Playback record shared between the controller and the spectrum analyzer

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything the analyzer needs to know about playback, read as one unit
///
/// Kept as a single record so a reader never sees a new track index paired
/// with the previous track's start time.
#[derive(Debug, Clone)]
pub struct PlaybackState {
    /// An engine session has been launched and not yet stopped
    pub active: bool,
    /// A device or track transition is in flight; positions are meaningless
    pub seeking: bool,
    /// One-based
    pub track_index: u32,
    /// Origin for elapsed-time sampling offsets
    pub started_at: Instant,
    /// Bumped by every transition; delayed completions carry the value they started with
    pub generation: u64,
    /// Track files when playing a directory of tracks, empty for drive playback
    pub tracks: Arc<Vec<PathBuf>>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            active: false,
            seeking: false,
            track_index: 1,
            started_at: Instant::now(),
            generation: 0,
            tracks: Arc::new(Vec::new()),
        }
    }
}

impl PlaybackState {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// File for the current track, if playing from files
    pub fn current_track_file(&self) -> Option<&PathBuf> {
        let index = self.track_index.checked_sub(1)? as usize;
        self.tracks.get(index)
    }
}

#[derive(Debug, Default)]
pub struct SharedPlayback {
    state: Mutex<PlaybackState>,
}

impl SharedPlayback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copy of the current record
    pub fn snapshot(&self) -> PlaybackState {
        self.state.lock().clone()
    }

    pub fn track_index(&self) -> u32 {
        self.state.lock().track_index
    }

    pub fn is_seeking(&self) -> bool {
        self.state.lock().seeking
    }

    /// Mark a transition as started and return its generation
    pub fn begin_transition(&self) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.seeking = true;
        state.generation
    }

    /// Clear `seeking` and restart the elapsed clock, unless a newer transition began since
    pub fn finish_transition(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.seeking = false;
        state.started_at = Instant::now();
        true
    }

    /// Install a freshly launched session; stays seeking until its transition finishes
    pub fn start_session(&self, tracks: Vec<PathBuf>, track_index: u32) {
        let mut state = self.state.lock();
        state.active = true;
        state.tracks = Arc::new(tracks);
        state.track_index = track_index.max(1);
        state.started_at = Instant::now();
    }

    /// Move to another track and begin its transition in one step
    pub fn change_track(&self, track_index: u32) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.seeking = true;
        state.track_index = track_index.max(1);
        state.generation
    }

    /// Step one track forward or back and begin its transition, all under one lock
    ///
    /// Back stops at track 1. Forward returns `None` at `last` when the count is known.
    pub fn step_track(&self, forward: bool, last: Option<usize>) -> Option<(u32, u64)> {
        let mut state = self.state.lock();
        let track = if forward {
            if last.is_some_and(|last| state.track_index as usize >= last) {
                return None;
            }
            state.track_index + 1
        } else {
            state.track_index.saturating_sub(1).max(1)
        };

        state.generation += 1;
        state.seeking = true;
        state.track_index = track;
        Some((track, state.generation))
    }

    /// The engine went away on its own; analysis stops and pending transitions are dropped
    pub fn engine_exited(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.active = false;
        state.seeking = false;
    }

    /// Return to idle. Any transition still in flight is superseded.
    pub fn end_session(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.active = false;
        state.seeking = false;
        state.track_index = 1;
        state.tracks = Arc::new(Vec::new());
    }
}
