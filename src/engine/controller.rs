//! Playback controller: disc in, engine session out
//!
//! Resolves what the engine should open, launches it through a [`Transport`],
//! and keeps the shared playback record in step with track changes so the
//! analyzer never samples across a transition.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::protocol::{RcCommand, TrackAddressing, MAX_VOLUME};
use super::session::SharedPlayback;
use super::transport::{OutputSink, ProcessTransport, Transport};
use crate::config::Config;
use crate::disc::resolve::{self, ResolvedTarget};
use crate::error::{PlayerError, Result};

/// How often a running session checks that its engine is still there
const ENGINE_WATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Resolving,
    Starting,
    Playing,
    Paused,
    Stopped,
    Ejected,
}

/// What the engine was pointed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// Drive playback through a disc-audio MRL; the engine addresses tracks
    Disc { target: ResolvedTarget },
    /// The mounted disc exposes one file per track
    Files { tracks: Vec<PathBuf> },
}

impl LaunchMode {
    /// Track addressing the engine uses for this kind of target
    pub fn default_addressing(&self) -> TrackAddressing {
        match self {
            LaunchMode::Disc { .. } => TrackAddressing::Goto,
            LaunchMode::Files { .. } => TrackAddressing::Seek,
        }
    }

    fn track_count(&self) -> Option<usize> {
        match self {
            LaunchMode::Disc { .. } => None,
            LaunchMode::Files { tracks } => Some(tracks.len()),
        }
    }
}

struct Session {
    /// Distinguishes this launch from later ones for its engine watch
    id: u64,
    mount: PathBuf,
    mode: LaunchMode,
    addressing: TrackAddressing,
    transport: Box<dyn Transport>,
}

pub type TransportFactory = Box<dyn Fn(&Config) -> Box<dyn Transport> + Send + Sync>;

pub struct PlaybackController {
    config: Config,
    shared: Arc<SharedPlayback>,
    session: Arc<Mutex<Option<Session>>>,
    state: Arc<Mutex<PlayerState>>,
    /// Serializes play/stop/eject so only one launch is ever in progress
    launch: Mutex<()>,
    next_session_id: AtomicU64,
    new_transport: TransportFactory,
}

impl PlaybackController {
    pub fn new(config: Config, shared: Arc<SharedPlayback>) -> Self {
        Self::with_transport_factory(config, shared, Box::new(process_transport))
    }

    pub fn with_transport_factory(
        config: Config,
        shared: Arc<SharedPlayback>,
        new_transport: TransportFactory,
    ) -> Self {
        Self {
            config,
            shared,
            session: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(PlayerState::Idle)),
            launch: Mutex::new(()),
            next_session_id: AtomicU64::new(1),
            new_transport,
        }
    }

    pub fn shared(&self) -> Arc<SharedPlayback> {
        Arc::clone(&self.shared)
    }

    pub fn state(&self) -> PlayerState {
        *self.state.lock()
    }

    fn set_state(&self, state: PlayerState) {
        transition(&self.state, state);
    }

    /// Start playing the disc at `path` from one-based `track`
    ///
    /// Blocks for the engine settle delay; call it off any polling loop.
    pub fn play_disc(&self, path: &Path, track: u32) -> Result<()> {
        if track == 0 {
            return Err(PlayerError::InvalidTrackNumber {
                track,
                available: None,
            });
        }

        let _launch = self.launch.lock();

        if self.session.lock().is_some() {
            self.stop_session();
            // Let the engine release the drive
            thread::sleep(self.config.timing.restart_grace());
        }

        self.set_state(PlayerState::Resolving);
        let generation = self.shared.begin_transition();

        let mode = self.launch_mode(path);
        if let Some(count) = mode.track_count() {
            if track as usize > count {
                self.shared.end_session();
                self.set_state(PlayerState::Idle);
                return Err(PlayerError::InvalidTrackNumber {
                    track,
                    available: Some(count),
                });
            }
        }

        let addressing = self
            .config
            .engine
            .addressing
            .unwrap_or_else(|| mode.default_addressing());

        let mut args = self.config.engine.interface_args.clone();
        let tracks = match &mode {
            LaunchMode::Disc { target } => {
                log::info!("PlaybackController: starting playback of {}", target.mrl());
                args.push(target.mrl());
                Vec::new()
            }
            LaunchMode::Files { tracks } => {
                log::info!(
                    "PlaybackController: starting playback of {} track files from {}",
                    tracks.len(),
                    path.display()
                );
                args.extend(tracks.iter().map(|t| t.to_string_lossy().into_owned()));
                tracks.clone()
            }
        };

        self.set_state(PlayerState::Starting);
        let mut transport = (self.new_transport)(&self.config);
        if transport.start(&args).is_none() {
            log::error!("PlaybackController: media engine could not be started");
            self.shared.end_session();
            self.set_state(PlayerState::Idle);
            return Ok(());
        }

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        *self.session.lock() = Some(Session {
            id,
            mount: path.to_path_buf(),
            mode,
            addressing,
            transport,
        });
        self.shared.start_session(tracks, track);
        self.watch_engine(id);

        // The engine ignores commands until it has initialized
        thread::sleep(self.config.engine.settle_delay());

        {
            let mut session = self.session.lock();
            let Some(session) = session.as_mut() else {
                return Ok(());
            };

            if !session.transport.is_alive() {
                log::error!("PlaybackController: media engine exited during startup");
                self.shared.engine_exited();
                self.set_state(PlayerState::Stopped);
                return Ok(());
            }

            let volume = RcCommand::volume(self.config.engine.volume).unwrap_or_else(|e| {
                log::warn!("PlaybackController: {}, using {}", e, MAX_VOLUME);
                RcCommand::Volume(MAX_VOLUME)
            });
            session.transport.send(&volume);

            if track > 1 {
                session.transport.send(&session.addressing.command_for_track(track)?);
            }

            // Still under the session lock so an engine exit cannot be overwritten
            self.set_state(PlayerState::Playing);
            self.shared.finish_transition(generation);
        }

        Ok(())
    }

    /// Files on the disc if it exposes any, otherwise the resolved drive
    fn launch_mode(&self, path: &Path) -> LaunchMode {
        let tracks = resolve::list_audio_tracks(path, &self.config.audio_extensions);
        if !tracks.is_empty() {
            return LaunchMode::Files { tracks };
        }

        let timing = &self.config.timing;
        let target = resolve::resolve_target(path, timing.resolve_attempts, timing.resolve_retry());
        LaunchMode::Disc { target }
    }

    /// Shut the engine down and forget the session
    pub fn stop(&self) {
        let _launch = self.launch.lock();
        self.stop_session();
    }

    fn stop_session(&self) {
        let session = self.session.lock().take();
        if let Some(mut session) = session {
            log::info!("PlaybackController: stopping {}", session.mount.display());
            session.transport.terminate();
            self.shared.end_session();
            self.set_state(PlayerState::Stopped);
        }
    }

    /// Send a command to the running engine, if any
    fn send(&self, command: RcCommand) -> bool {
        match self.session.lock().as_mut() {
            Some(session) => {
                session.transport.send(&command);
                true
            }
            None => {
                log::debug!("PlaybackController: no session for '{}'", command);
                false
            }
        }
    }

    pub fn play(&self) {
        if self.send(RcCommand::Play) {
            self.set_state(PlayerState::Playing);
        }
    }

    pub fn pause(&self) {
        if self.send(RcCommand::Pause) {
            self.set_state(PlayerState::Paused);
        }
    }

    pub fn toggle_pause(&self) {
        if self.state() == PlayerState::Paused {
            self.play();
        } else {
            self.pause();
        }
    }

    pub fn next(&self) {
        let step = {
            let mut session = self.session.lock();
            let Some(session) = session.as_mut() else {
                log::debug!("PlaybackController: next with no session");
                return;
            };

            let step = self.shared.step_track(true, session.mode.track_count());
            match step {
                Some(_) => session.transport.send(&RcCommand::Next),
                None => log::info!("PlaybackController: already on the last track"),
            }
            step
        };

        if let Some((track, generation)) = step {
            self.settle_track_change(track, generation);
        }
    }

    pub fn prev(&self) {
        let step = {
            let mut session = self.session.lock();
            let Some(session) = session.as_mut() else {
                log::debug!("PlaybackController: prev with no session");
                return;
            };
            session.transport.send(&RcCommand::Prev);
            self.shared.step_track(false, None)
        };

        if let Some((track, generation)) = step {
            self.settle_track_change(track, generation);
        }
    }

    /// Jump straight to one-based `track`
    pub fn seek_track(&self, track: u32) -> Result<()> {
        let generation = {
            let mut session = self.session.lock();
            let Some(session) = session.as_mut() else {
                log::debug!("PlaybackController: seek with no session");
                return Ok(());
            };

            if let Some(count) = session.mode.track_count() {
                if track as usize > count {
                    return Err(PlayerError::InvalidTrackNumber {
                        track,
                        available: Some(count),
                    });
                }
            }
            let command = session.addressing.command_for_track(track)?;
            session.transport.send(&command);
            self.shared.change_track(track)
        };

        self.settle_track_change(track, generation);
        Ok(())
    }

    /// Hold analysis off while the drive repositions; only the newest change may release it
    fn settle_track_change(&self, track: u32, generation: u64) {
        log::info!("PlaybackController: track {} (transition {})", track, generation);

        let shared = Arc::clone(&self.shared);
        let settle = self.config.timing.track_settle();
        thread::spawn(move || {
            thread::sleep(settle);
            if !shared.finish_transition(generation) {
                log::debug!("PlaybackController: transition {} superseded", generation);
            }
        });
    }

    /// Poll the session's engine until it exits or the session is replaced
    ///
    /// An engine that quits on its own takes the shared record out of the
    /// active state so analysis fades instead of sampling a dead session.
    fn watch_engine(&self, id: u64) {
        let session = Arc::clone(&self.session);
        let shared = Arc::clone(&self.shared);
        let state = Arc::clone(&self.state);

        thread::spawn(move || loop {
            thread::sleep(ENGINE_WATCH_INTERVAL);

            let mut guard = session.lock();
            let Some(current) = guard.as_mut().filter(|s| s.id == id) else {
                return;
            };
            if !current.transport.is_alive() {
                log::warn!("PlaybackController: media engine exited ({})", current.mount.display());
                shared.engine_exited();
                transition(&state, PlayerState::Stopped);
                return;
            }
        });
    }

    /// Stop playback and open the tray
    pub fn eject(&self) {
        let _launch = self.launch.lock();

        let device = self.session.lock().as_ref().map(|s| match &s.mode {
            LaunchMode::Disc { target } => target.target.clone(),
            LaunchMode::Files { .. } => s.mount.to_string_lossy().into_owned(),
        });
        self.stop_session();

        let argv = self
            .config
            .eject_command
            .clone()
            .unwrap_or_else(|| resolve::default_eject_command(device.as_deref()));

        log::info!("PlaybackController: ejecting disc");
        thread::spawn(move || resolve::run_eject(&argv));
        self.set_state(PlayerState::Ejected);
    }

    pub fn is_playing(&self) -> bool {
        self.session
            .lock()
            .as_mut()
            .map(|s| s.transport.is_alive())
            .unwrap_or(false)
    }

    pub fn current_track_index(&self) -> u32 {
        self.shared.track_index()
    }

    /// Mount path of the active session
    pub fn current_mount(&self) -> Option<PathBuf> {
        self.session.lock().as_ref().map(|s| s.mount.clone())
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop_session();
    }
}

fn transition(current: &Mutex<PlayerState>, state: PlayerState) {
    let mut current = current.lock();
    if *current != state {
        log::debug!("PlaybackController: {:?} -> {:?}", *current, state);
        *current = state;
    }
}

fn process_transport(config: &Config) -> Box<dyn Transport> {
    let output = if config.engine.log_output {
        OutputSink::LogDir(crate::logging::log_dir())
    } else {
        OutputSink::Discard
    };
    Box::new(ProcessTransport::new(
        config.engine.program.clone(),
        output,
        config.timing.terminate_grace(),
    ))
}
