//! Background spectrum analysis loop
//!
//! Runs for the lifetime of the player, whether or not anything is playing.
//! Each tick either decays the buffer toward silence or blends in a fresh
//! frame; readers get lock-free copies of the result.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::pcm::PcmLayout;
use super::spectrum::{self, Spectrum, SpectrumCore, NUM_BINS};
use crate::config::{AnalysisMode, AnalyzerConfig};
use crate::engine::session::{PlaybackState, SharedPlayback};

/// Which branch a tick took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    /// Nothing to analyze; the buffer faded
    Decay,
    Synthetic,
    File,
}

/// Per-tick analysis state, owned by the analysis thread
pub struct SpectrumTicker {
    core: SpectrumCore,
    buffer: Spectrum,
    config: AnalyzerConfig,
    sweep_origin: Instant,
    /// Layout of the last probed track, so each file is probed once
    layout_cache: Option<(PathBuf, PcmLayout)>,
}

impl SpectrumTicker {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            core: SpectrumCore::new(config.sample_rate, config.log_gain),
            buffer: [0.0; NUM_BINS],
            config,
            sweep_origin: Instant::now(),
            layout_cache: None,
        }
    }

    pub fn buffer(&self) -> &Spectrum {
        &self.buffer
    }

    fn layout_for(&mut self, path: &Path) -> PcmLayout {
        if let Some((cached, layout)) = &self.layout_cache {
            if cached.as_path() == path {
                return *layout;
            }
        }
        let layout = PcmLayout::probe(path, self.config.sample_rate);
        log::debug!("Analyzer: {} layout {:?}", path.display(), layout);
        self.layout_cache = Some((path.to_path_buf(), layout));
        layout
    }

    /// Advance one tick against a playback snapshot
    pub fn tick(&mut self, state: &PlaybackState) -> TickKind {
        if !state.active || state.seeking {
            spectrum::decay(&mut self.buffer, self.config.decay);
            return TickKind::Decay;
        }

        let (frame, kind) = match self.config.mode {
            AnalysisMode::Synthetic => {
                let t = self.sweep_origin.elapsed().as_secs_f32();
                (self.core.synthetic_frame(t), TickKind::Synthetic)
            }
            AnalysisMode::File => {
                let Some(path) = state.current_track_file().cloned() else {
                    spectrum::decay(&mut self.buffer, self.config.decay);
                    return TickKind::Decay;
                };
                let layout = self.layout_for(&path);
                (self.core.file_frame(&path, &layout, state.elapsed()), TickKind::File)
            }
        };

        spectrum::blend(&mut self.buffer, &frame, self.config.smoothing_new_weight);
        kind
    }
}

/// Shared state between the analysis thread and readers
struct AnalyzerShared {
    /// Spectrum stored as f32 bit patterns for lock-free access
    bins: [AtomicU32; NUM_BINS],
    should_stop: AtomicBool,
}

impl AnalyzerShared {
    fn publish(&self, spectrum: &Spectrum) {
        for (slot, value) in self.bins.iter().zip(spectrum) {
            slot.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> Spectrum {
        let mut out = [0.0f32; NUM_BINS];
        for (value, slot) in out.iter_mut().zip(&self.bins) {
            *value = f32::from_bits(slot.load(Ordering::Relaxed));
        }
        out
    }
}

/// Owns the analysis thread
pub struct SpectrumAnalyzer {
    shared: Arc<AnalyzerShared>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl SpectrumAnalyzer {
    pub fn spawn(config: AnalyzerConfig, playback: Arc<SharedPlayback>) -> Self {
        let shared = Arc::new(AnalyzerShared {
            bins: std::array::from_fn(|_| AtomicU32::new(0)),
            should_stop: AtomicBool::new(false),
        });

        let shared_clone = Arc::clone(&shared);
        let thread_handle = thread::spawn(move || {
            analyzer_thread(shared_clone, config, playback);
        });

        Self {
            shared,
            thread_handle: Some(thread_handle),
        }
    }

    /// Copy of the latest smoothed spectrum (0.0 - 1.0 per bin)
    pub fn get_spectrum(&self) -> Spectrum {
        self.shared.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Signal the thread and wait for it; returns within one tick
    pub fn stop(&mut self) {
        self.shared.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SpectrumAnalyzer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn analyzer_thread(shared: Arc<AnalyzerShared>, config: AnalyzerConfig, playback: Arc<SharedPlayback>) {
    log::debug!("Analyzer thread started ({:?} mode)", config.mode);
    let tick = config.tick().max(Duration::from_millis(1));
    let mut ticker = SpectrumTicker::new(config);

    while !shared.should_stop.load(Ordering::SeqCst) {
        let started = Instant::now();

        // Copy out so the playback lock is never held across file I/O
        let state = playback.snapshot();
        ticker.tick(&state);
        shared.publish(ticker.buffer());

        thread::sleep(tick.saturating_sub(started.elapsed()));
    }

    log::debug!("Analyzer thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config(mode: AnalysisMode) -> AnalyzerConfig {
        AnalyzerConfig {
            mode,
            tick_ms: 5,
            ..Default::default()
        }
    }

    fn playing(tracks: Vec<PathBuf>) -> PlaybackState {
        PlaybackState {
            active: true,
            tracks: Arc::new(tracks),
            ..Default::default()
        }
    }

    fn tone_file(dir: &PathBuf) -> PathBuf {
        let path = dir.join("01.pcm");
        let bytes: Vec<u8> = (0..441_000)
            .flat_map(|n| {
                let s = ((2.0 * std::f32::consts::PI * 440.0 * n as f32 / 44100.0).sin() * 20000.0) as i16;
                let mut frame = s.to_le_bytes().to_vec();
                frame.extend_from_slice(&s.to_le_bytes());
                frame
            })
            .collect();
        fs::write(&path, bytes).unwrap();
        path
    }

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cdp-analyzer-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_idle_takes_decay_branch() {
        let mut ticker = SpectrumTicker::new(config(AnalysisMode::Synthetic));
        assert_eq!(ticker.tick(&PlaybackState::default()), TickKind::Decay);
        assert!(ticker.buffer().iter().all(|m| *m == 0.0));
    }

    #[test]
    fn test_seeking_never_samples_files() {
        let dir = scratch_dir();
        let track = tone_file(&dir);
        let mut ticker = SpectrumTicker::new(config(AnalysisMode::File));

        let mut state = playing(vec![track]);
        for _ in 0..5 {
            assert_eq!(ticker.tick(&state), TickKind::File);
        }
        let peak_before = ticker.buffer().iter().cloned().fold(0.0, f32::max);
        assert!(peak_before > 0.0);

        state.seeking = true;
        for _ in 0..5 {
            let before = *ticker.buffer();
            assert_eq!(ticker.tick(&state), TickKind::Decay);
            for (now, prev) in ticker.buffer().iter().zip(before) {
                assert!(*now < prev || (*now == 0.0 && prev == 0.0));
            }
        }

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_file_mode_without_tracks_decays() {
        let mut ticker = SpectrumTicker::new(config(AnalysisMode::File));
        assert_eq!(ticker.tick(&playing(Vec::new())), TickKind::Decay);
    }

    #[test]
    fn test_missing_track_fades_to_zero() {
        let mut ticker = SpectrumTicker::new(config(AnalysisMode::Synthetic));
        let state = playing(Vec::new());
        for _ in 0..10 {
            assert_eq!(ticker.tick(&state), TickKind::Synthetic);
        }
        assert!(ticker.buffer().iter().any(|m| *m > 0.0));

        let mut ticker_file = SpectrumTicker::new(config(AnalysisMode::File));
        let state = playing(vec![PathBuf::from("/nonexistent/cdp/01.aiff")]);
        assert_eq!(ticker_file.tick(&state), TickKind::File);
        assert!(ticker_file.buffer().iter().all(|m| *m == 0.0));
    }

    #[test]
    fn test_thread_publishes_and_stops() {
        let playback = SharedPlayback::new();
        playback.start_session(Vec::new(), 1);
        let mut analyzer = SpectrumAnalyzer::spawn(config(AnalysisMode::Synthetic), Arc::clone(&playback));

        let deadline = Instant::now() + Duration::from_secs(5);
        while analyzer.get_spectrum().iter().all(|m| *m == 0.0) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let spectrum = analyzer.get_spectrum();
        assert_eq!(spectrum.len(), NUM_BINS);
        assert!(spectrum.iter().any(|m| *m > 0.0));

        // Stopping playback fades the published buffer
        playback.end_session();
        thread::sleep(Duration::from_millis(200));
        let faded: f32 = analyzer.get_spectrum().iter().sum();
        assert!(faded < spectrum.iter().sum::<f32>());

        let start = Instant::now();
        analyzer.stop();
        assert!(!analyzer.is_running());
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
