//! Player configuration, stored as JSON in the user's config directory

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::protocol::TrackAddressing;
use crate::error::{PlayerError, Result};

#[cfg(target_os = "macos")]
const DEFAULT_ENGINE_PROGRAM: &str = "/Applications/VLC.app/Contents/MacOS/VLC";
#[cfg(not(target_os = "macos"))]
const DEFAULT_ENGINE_PROGRAM: &str = "vlc";

/// How the external media engine is launched
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub program: PathBuf,
    /// Arguments that select the headless interface plus the RC control channel
    pub interface_args: Vec<String>,
    /// GUI-capable engine builds take longer to come up
    pub gui: bool,
    /// Wait after launch before the engine accepts commands. `None` picks by `gui`.
    pub settle_ms: Option<u64>,
    pub volume: u32,
    /// Force one track addressing convention regardless of launch mode
    pub addressing: Option<TrackAddressing>,
    /// Capture engine stdout/stderr into the log directory instead of discarding
    pub log_output: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_ENGINE_PROGRAM),
            interface_args: vec![
                "-I".to_string(),
                "dummy".to_string(),
                "--extraintf".to_string(),
                "rc".to_string(),
                "--rc-fake-tty".to_string(),
            ],
            gui: false,
            settle_ms: None,
            volume: 256,
            addressing: None,
            log_output: true,
        }
    }
}

impl EngineConfig {
    pub fn settle_delay(&self) -> Duration {
        let ms = self
            .settle_ms
            .unwrap_or(if self.gui { 5000 } else { 2000 });
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStrategy {
    /// Volume listing on macOS, device node everywhere else
    Auto,
    Volumes,
    Device,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub strategy: MonitorStrategy,
    pub volumes_root: PathBuf,
    /// Entries under `volumes_root` that are never removable media
    pub denylist: Vec<String>,
    pub device_path: PathBuf,
    pub poll_interval_ms: u64,
    /// Let the filesystem finish mounting before playback starts
    pub mount_delay_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            strategy: MonitorStrategy::Auto,
            volumes_root: PathBuf::from("/Volumes"),
            denylist: vec!["Macintosh HD".to_string()],
            device_path: PathBuf::from("/dev/cdrom"),
            poll_interval_ms: 1000,
            mount_delay_ms: 2000,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn mount_delay(&self) -> Duration {
        Duration::from_millis(self.mount_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Logarithmic test sweep, independent of what is playing
    Synthetic,
    /// Sample raw PCM from the current track file
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub mode: AnalysisMode,
    pub tick_ms: u64,
    pub sample_rate: u32,
    /// Per-tick multiplier applied while nothing can be analyzed
    pub decay: f32,
    /// Weight of the newest frame in the moving average
    pub smoothing_new_weight: f32,
    /// `k` in `log10(mag * k + 1)`
    pub log_gain: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::File,
            tick_ms: 25,
            sample_rate: 44100,
            decay: 0.8,
            smoothing_new_weight: 0.4,
            log_gain: 9.0,
        }
    }
}

impl AnalyzerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Fixed waits around device and track transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Between stopping one session and starting the next, so the engine releases the drive
    pub restart_grace_ms: u64,
    /// Between `shutdown` and a forced kill
    pub terminate_grace_ms: u64,
    /// Drive settle time after next/prev before sampling resumes
    pub track_settle_ms: u64,
    pub resolve_attempts: u32,
    pub resolve_retry_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            restart_grace_ms: 500,
            terminate_grace_ms: 200,
            track_settle_ms: 2000,
            resolve_attempts: 3,
            resolve_retry_ms: 500,
        }
    }
}

impl TimingConfig {
    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn track_settle(&self) -> Duration {
        Duration::from_millis(self.track_settle_ms)
    }

    pub fn resolve_retry(&self) -> Duration {
        Duration::from_millis(self.resolve_retry_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub monitor: MonitorConfig,
    pub analyzer: AnalyzerConfig,
    pub timing: TimingConfig,
    /// File extensions treated as individual audio tracks on a mounted disc
    pub audio_extensions: Vec<String>,
    /// Replaces the platform eject command when set
    pub eject_command: Option<Vec<String>>,
    pub eject_on_start: bool,
    pub render_bars: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            monitor: MonitorConfig::default(),
            analyzer: AnalyzerConfig::default(),
            timing: TimingConfig::default(),
            audio_extensions: ["aiff", "aif", "wav", "cdda", "pcm", "raw"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            eject_command: None,
            eject_on_start: false,
            render_bars: true,
        }
    }
}

/// Default config file location
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cdp").join("config.json"))
}

/// Load the config at `path`, writing defaults there first if it does not exist yet
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| PlayerError::Config(format!("{}: {}", path.display(), e)))?;
        log::info!("Loaded configuration from {}", path.display());
        return Ok(config);
    }

    let config = Config::default();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(&config)
        .map_err(|e| PlayerError::Config(e.to_string()))?;
    fs::write(path, contents)?;
    log::info!("Wrote default configuration to {}", path.display());

    Ok(config)
}
