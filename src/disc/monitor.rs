//! Polling removable-media detection
//!
//! Each monitor reduces the OS view to a set of present entries, diffs it
//! against the previous poll and reports the edges.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{MonitorConfig, MonitorStrategy};

/// Longest single sleep of the poll thread, bounds shutdown latency
const STOP_CHECK_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Mounted(PathBuf),
    Unmounted(PathBuf),
}

impl PresenceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PresenceEvent::Mounted(_) => "mount",
            PresenceEvent::Unmounted(_) => "unmount",
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            PresenceEvent::Mounted(path) | PresenceEvent::Unmounted(path) => path,
        }
    }
}

/// One present volume or device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub present: bool,
    pub path: PathBuf,
    pub label: String,
}

pub type PresenceCallback = Box<dyn FnMut(PresenceEvent) + Send>;

pub trait PresenceMonitor: Send {
    /// Register the edge callback and take the baseline snapshot
    fn start(&mut self, callback: PresenceCallback);

    /// Re-snapshot and report changes since the last call. No-op unless started.
    fn check(&mut self);

    /// Stop reporting; later `check` calls do nothing
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Shared diffing core: snapshot keyed by path
struct EdgeTracker {
    known: BTreeMap<PathBuf, DeviceState>,
    callback: Option<PresenceCallback>,
}

impl EdgeTracker {
    fn new() -> Self {
        Self {
            known: BTreeMap::new(),
            callback: None,
        }
    }

    fn start(&mut self, callback: PresenceCallback, baseline: Vec<DeviceState>) {
        self.known = Self::index(baseline);
        self.callback = Some(callback);
    }

    fn stop(&mut self) {
        self.callback = None;
    }

    fn is_running(&self) -> bool {
        self.callback.is_some()
    }

    fn index(states: Vec<DeviceState>) -> BTreeMap<PathBuf, DeviceState> {
        states
            .into_iter()
            .filter(|s| s.present)
            .map(|s| (s.path.clone(), s))
            .collect()
    }

    /// Replace the snapshot and emit mount/unmount edges
    fn update(&mut self, current: Vec<DeviceState>) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };

        let current = Self::index(current);

        for (path, state) in &current {
            if !self.known.contains_key(path) {
                log::info!("Monitor: disc detected: {}", state.label);
                callback(PresenceEvent::Mounted(path.clone()));
            }
        }

        for (path, state) in &self.known {
            if !current.contains_key(path) {
                log::info!("Monitor: disc removed: {}", state.label);
                callback(PresenceEvent::Unmounted(path.clone()));
            }
        }

        self.known = current;
    }
}

/// Watches a mount root such as `/Volumes` for new directories
pub struct VolumeListMonitor {
    root: PathBuf,
    denylist: Vec<String>,
    tracker: EdgeTracker,
}

impl VolumeListMonitor {
    pub fn new(root: impl Into<PathBuf>, denylist: Vec<String>) -> Self {
        let root = root.into();
        log::info!("Monitor: polling volumes under {}", root.display());
        Self {
            root,
            denylist,
            tracker: EdgeTracker::new(),
        }
    }

    fn snapshot(&self) -> Vec<DeviceState> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("Monitor: cannot list {}: {}", self.root.display(), e);
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let label = entry.file_name().to_string_lossy().into_owned();
                if label.starts_with('.') || self.denylist.iter().any(|d| d == &label) {
                    return None;
                }
                Some(DeviceState {
                    present: true,
                    path: self.root.join(&label),
                    label,
                })
            })
            .collect()
    }
}

impl PresenceMonitor for VolumeListMonitor {
    fn start(&mut self, callback: PresenceCallback) {
        let baseline = self.snapshot();
        self.tracker.start(callback, baseline);
    }

    fn check(&mut self) {
        if !self.tracker.is_running() {
            return;
        }
        let current = self.snapshot();
        self.tracker.update(current);
    }

    fn stop(&mut self) {
        self.tracker.stop();
    }

    fn is_running(&self) -> bool {
        self.tracker.is_running()
    }
}

/// Watches a single device path such as `/dev/cdrom`
pub struct DevicePathMonitor {
    path: PathBuf,
    tracker: EdgeTracker,
}

impl DevicePathMonitor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        log::info!("Monitor: polling device {}", path.display());
        Self {
            path,
            tracker: EdgeTracker::new(),
        }
    }

    fn snapshot(&self) -> Vec<DeviceState> {
        // A dangling link still means the drive reported a disc
        let present = self.path.is_symlink() || self.path.exists();
        vec![DeviceState {
            present,
            path: self.path.clone(),
            label: self.path.to_string_lossy().into_owned(),
        }]
    }
}

impl PresenceMonitor for DevicePathMonitor {
    fn start(&mut self, callback: PresenceCallback) {
        let baseline = self.snapshot();
        self.tracker.start(callback, baseline);
    }

    fn check(&mut self) {
        if !self.tracker.is_running() {
            return;
        }
        let current = self.snapshot();
        self.tracker.update(current);
    }

    fn stop(&mut self) {
        self.tracker.stop();
    }

    fn is_running(&self) -> bool {
        self.tracker.is_running()
    }
}

/// Pick the detection strategy once, at startup
pub fn create_monitor(config: &MonitorConfig) -> Box<dyn PresenceMonitor> {
    let strategy = match config.strategy {
        MonitorStrategy::Auto if cfg!(target_os = "macos") => MonitorStrategy::Volumes,
        MonitorStrategy::Auto => MonitorStrategy::Device,
        other => other,
    };

    match strategy {
        MonitorStrategy::Volumes => Box::new(VolumeListMonitor::new(
            config.volumes_root.clone(),
            config.denylist.clone(),
        )),
        _ => Box::new(DevicePathMonitor::new(config.device_path.clone())),
    }
}

/// Background thread that drives a monitor at a fixed interval
pub struct MonitorLoop {
    should_stop: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MonitorLoop {
    pub fn spawn(
        mut monitor: Box<dyn PresenceMonitor>,
        interval: Duration,
        callback: PresenceCallback,
    ) -> Self {
        let should_stop = Arc::new(AtomicBool::new(false));
        let should_stop_clone = Arc::clone(&should_stop);

        let thread_handle = thread::spawn(move || {
            log::debug!("Monitor thread started");
            monitor.start(callback);

            'poll: loop {
                let wake_at = Instant::now() + interval;
                while Instant::now() < wake_at {
                    if should_stop_clone.load(Ordering::SeqCst) {
                        break 'poll;
                    }
                    let remaining = wake_at.saturating_duration_since(Instant::now());
                    thread::sleep(remaining.min(STOP_CHECK_SLICE));
                }
                if should_stop_clone.load(Ordering::SeqCst) {
                    break;
                }
                monitor.check();
            }

            monitor.stop();
            log::debug!("Monitor thread stopped");
        });

        Self {
            should_stop,
            thread_handle: Some(thread_handle),
        }
    }

    pub fn stop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MonitorLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::fs;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cdp-monitor-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn recorder() -> (Arc<Mutex<Vec<PresenceEvent>>>, PresenceCallback) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, Box::new(move |event| sink.lock().push(event)))
    }

    fn states(names: &[&str]) -> Vec<DeviceState> {
        names
            .iter()
            .map(|n| DeviceState {
                present: true,
                path: PathBuf::from(format!("/Volumes/{}", n)),
                label: n.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_empty_volume_root_no_events() {
        let root = scratch_dir();
        let (events, callback) = recorder();
        let mut monitor = VolumeListMonitor::new(&root, vec![]);
        monitor.start(callback);
        monitor.check();
        assert!(events.lock().is_empty());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_new_volume_reports_mount() {
        let root = scratch_dir();
        let (events, callback) = recorder();
        let mut monitor = VolumeListMonitor::new(&root, vec!["Macintosh HD".to_string()]);
        monitor.start(callback);

        fs::create_dir(root.join("DiscOne")).unwrap();
        fs::create_dir(root.join("Macintosh HD")).unwrap();
        fs::create_dir(root.join(".hidden")).unwrap();
        fs::write(root.join("notes.txt"), b"").unwrap();
        monitor.check();

        assert_eq!(
            *events.lock(),
            vec![PresenceEvent::Mounted(root.join("DiscOne"))]
        );

        // Nothing changed: no repeat
        monitor.check();
        assert_eq!(events.lock().len(), 1);

        fs::remove_dir(root.join("DiscOne")).unwrap();
        monitor.check();
        assert_eq!(
            events.lock().last(),
            Some(&PresenceEvent::Unmounted(root.join("DiscOne")))
        );

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_baseline_is_not_reported() {
        let root = scratch_dir();
        fs::create_dir(root.join("Already There")).unwrap();
        let (events, callback) = recorder();
        let mut monitor = VolumeListMonitor::new(&root, vec![]);
        monitor.start(callback);
        monitor.check();
        assert!(events.lock().is_empty());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_check_after_stop_is_noop() {
        let root = scratch_dir();
        let (events, callback) = recorder();
        let mut monitor = VolumeListMonitor::new(&root, vec![]);
        monitor.start(callback);
        monitor.stop();
        assert!(!monitor.is_running());

        fs::create_dir(root.join("Late")).unwrap();
        monitor.check();
        assert!(events.lock().is_empty());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_check_before_start_is_noop() {
        let root = scratch_dir();
        fs::create_dir(root.join("Disc")).unwrap();
        let mut monitor = VolumeListMonitor::new(&root, vec![]);
        monitor.check();
        assert!(!monitor.is_running());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_snapshot_sequences_emit_each_edge_once() {
        let sequence = [
            states(&[]),
            states(&["A"]),
            states(&["A", "B"]),
            states(&["B", "C"]),
            states(&[]),
            states(&["C"]),
        ];

        let (events, callback) = recorder();
        let mut tracker = EdgeTracker::new();
        tracker.start(callback, sequence[0].clone());

        let mut previous: Vec<PathBuf> = Vec::new();
        for snapshot in sequence.iter().skip(1) {
            events.lock().clear();
            tracker.update(snapshot.clone());

            let current: Vec<PathBuf> = snapshot.iter().map(|s| s.path.clone()).collect();
            let recorded = events.lock().clone();
            let mounted: Vec<&Path> = recorded
                .iter()
                .filter(|e| e.kind() == "mount")
                .map(|e| e.path())
                .collect();
            let unmounted: Vec<&Path> = recorded
                .iter()
                .filter(|e| e.kind() == "unmount")
                .map(|e| e.path())
                .collect();

            let expected_added: Vec<&Path> = current
                .iter()
                .filter(|p| !previous.contains(p))
                .map(|p| p.as_path())
                .collect();
            let expected_removed: Vec<&Path> = previous
                .iter()
                .filter(|p| !current.contains(p))
                .map(|p| p.as_path())
                .collect();

            assert_eq!(mounted, expected_added);
            assert_eq!(unmounted, expected_removed);
            assert!(mounted.iter().all(|p| !unmounted.contains(p)));

            previous = current;
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_device_path_toggles() {
        let dir = scratch_dir();
        let device = dir.join("cdrom");
        let (events, callback) = recorder();
        let mut monitor = DevicePathMonitor::new(&device);
        monitor.start(callback);

        monitor.check();
        assert!(events.lock().is_empty());

        // Dangling symlink counts as present
        std::os::unix::fs::symlink(dir.join("sr0"), &device).unwrap();
        monitor.check();
        assert_eq!(*events.lock(), vec![PresenceEvent::Mounted(device.clone())]);

        fs::remove_file(&device).unwrap();
        monitor.check();
        assert_eq!(
            events.lock().last(),
            Some(&PresenceEvent::Unmounted(device.clone()))
        );
        assert_eq!(events.lock().len(), 2);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_factory_honours_strategy() {
        let config = MonitorConfig {
            strategy: MonitorStrategy::Volumes,
            volumes_root: std::env::temp_dir(),
            ..Default::default()
        };
        let mut monitor = create_monitor(&config);
        assert!(!monitor.is_running());
        monitor.start(Box::new(|_| {}));
        assert!(monitor.is_running());
    }

    #[test]
    fn test_loop_reports_and_stops_promptly() {
        let root = scratch_dir();
        let (events, callback) = recorder();
        let monitor = Box::new(VolumeListMonitor::new(&root, vec![]));
        let mut poller = MonitorLoop::spawn(monitor, Duration::from_millis(20), callback);

        // Give the thread time to take its baseline
        thread::sleep(Duration::from_millis(100));
        fs::create_dir(root.join("Disc")).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while events.lock().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(*events.lock(), vec![PresenceEvent::Mounted(root.join("Disc"))]);

        let start = Instant::now();
        poller.stop();
        assert!(start.elapsed() < Duration::from_secs(1));

        let _ = fs::remove_dir_all(root);
    }
}
