//! Mapping a mounted disc to something the media engine can address

use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use walkdir::WalkDir;

/// The engine target for a disc, plus whether it came from a real lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub target: String,
    /// False when resolution failed and `target` is the path we were given
    pub resolved: bool,
}

impl ResolvedTarget {
    /// Disc-audio MRL for the engine
    pub fn mrl(&self) -> String {
        format!("cdda://{}", self.target)
    }
}

/// Current mount table as text
fn read_mount_table() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(table) = std::fs::read_to_string("/proc/mounts") {
            return Some(table);
        }
    }

    let output = Command::new("mount").output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `/proc/mounts` escapes whitespace in paths as octal
fn unescape_mount_field(field: &str) -> String {
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

/// Device node mounted at `mount_path`
///
/// Accepts `mount` output (`/dev/disk4 on /Volumes/Audio CD (cddafs, ...)`,
/// `/dev/sr0 on /media/cd type iso9660 (ro)`) and `/proc/mounts` lines.
pub fn device_for_mount(table: &str, mount_path: &str) -> Option<String> {
    let wanted = mount_path.trim_end_matches('/');

    for line in table.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (device, mount_point) = if let Some((device, rest)) = line.split_once(" on ") {
            let rest = rest.rsplit_once(" (").map(|(m, _)| m).unwrap_or(rest);
            let rest = rest.rsplit_once(" type ").map(|(m, _)| m).unwrap_or(rest);
            (device.to_string(), rest.to_string())
        } else {
            let mut fields = line.split_whitespace();
            let (Some(device), Some(mount_point)) = (fields.next(), fields.next()) else {
                continue;
            };
            (unescape_mount_field(device), unescape_mount_field(mount_point))
        };

        if mount_point.trim_end_matches('/') == wanted {
            return Some(device);
        }
    }

    None
}

/// Prefer the raw character device over the buffered block device
pub fn raw_device_for(device: &str) -> String {
    match device.strip_prefix("/dev/disk") {
        Some(rest) => format!("/dev/rdisk{}", rest),
        None => device.to_string(),
    }
}

/// Resolve `path` to a raw device, retrying while the mount table catches up
///
/// Never fails: an unresolvable path is returned unchanged for the engine to
/// open as a disc-audio source directly.
pub fn resolve_target(path: &Path, attempts: u32, retry_delay: Duration) -> ResolvedTarget {
    let path_str = path.to_string_lossy().into_owned();

    // /dev/cdrom style links point at the real node
    if path.is_symlink() {
        match path.canonicalize() {
            Ok(real) => {
                log::info!("Resolve: {} -> {}", path_str, real.display());
                return ResolvedTarget {
                    target: real.to_string_lossy().into_owned(),
                    resolved: true,
                };
            }
            Err(e) => log::warn!("Resolve: cannot follow link {}: {}", path_str, e),
        }
    }

    if path.starts_with("/dev") && path.exists() {
        return ResolvedTarget {
            target: raw_device_for(&path_str),
            resolved: true,
        };
    }

    for attempt in 1..=attempts {
        if let Some(device) = read_mount_table().and_then(|t| device_for_mount(&t, &path_str)) {
            let raw = raw_device_for(&device);
            log::info!("Resolve: {} is mounted from {} (using {})", path_str, device, raw);
            return ResolvedTarget {
                target: raw,
                resolved: true,
            };
        }

        if attempt < attempts {
            log::debug!("Resolve: {} not in mount table yet (attempt {})", path_str, attempt);
            thread::sleep(retry_delay);
        }
    }

    log::warn!(
        "Resolve: could not find a device for {}, addressing it directly",
        path_str
    );
    ResolvedTarget {
        target: path_str,
        resolved: false,
    }
}

/// Audio track files directly inside `dir`, sorted by file name
pub fn list_audio_tracks(dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut tracks: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy();
                    extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
                })
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    tracks.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    tracks
}

/// Platform eject invocation for `device`
pub fn default_eject_command(device: Option<&str>) -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec!["drutil".to_string(), "eject".to_string()]
    } else {
        let mut argv = vec!["eject".to_string()];
        if let Some(device) = device {
            argv.push(device.to_string());
        }
        argv
    }
}

/// Run the eject command; failures are logged only
pub fn run_eject(argv: &[String]) {
    let Some((program, args)) = argv.split_first() else {
        log::warn!("Eject: empty command");
        return;
    };

    match Command::new(program).args(args).status() {
        Ok(status) if status.success() => log::info!("Eject: done"),
        Ok(status) => log::warn!("Eject: '{}' exited with {}", argv.join(" "), status),
        Err(e) => log::error!("Eject: failed to run '{}': {}", argv.join(" "), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cdp-resolve-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_device_for_mount_macos_table() {
        let table = "/dev/disk1s1 on / (apfs, local, journaled)\n\
                     devfs on /dev (devfs, local, nobrowse)\n\
                     /dev/disk4 on /Volumes/Audio CD (cddafs, local, nodev, nosuid, read-only, noowners)\n";
        assert_eq!(
            device_for_mount(table, "/Volumes/Audio CD"),
            Some("/dev/disk4".to_string())
        );
        assert_eq!(device_for_mount(table, "/Volumes/Audio"), None);
    }

    #[test]
    fn test_device_for_mount_linux_tables() {
        let proc_mounts = "/dev/sda1 / ext4 rw,relatime 0 0\n\
                           /dev/sr0 /media/user/My\\040Disc iso9660 ro,nosuid 0 0\n";
        assert_eq!(
            device_for_mount(proc_mounts, "/media/user/My Disc/"),
            Some("/dev/sr0".to_string())
        );

        let mount_output = "/dev/sr0 on /media/cd type iso9660 (ro,nosuid,nodev)\n";
        assert_eq!(device_for_mount(mount_output, "/media/cd"), Some("/dev/sr0".to_string()));
    }

    #[test]
    fn test_raw_device() {
        assert_eq!(raw_device_for("/dev/disk4"), "/dev/rdisk4");
        assert_eq!(raw_device_for("/dev/sr0"), "/dev/sr0");
    }

    #[test]
    fn test_unresolvable_path_falls_back() {
        let resolved = resolve_target(Path::new("/Volumes/cdp-missing-disc"), 2, Duration::from_millis(1));
        assert!(!resolved.resolved);
        assert_eq!(resolved.target, "/Volumes/cdp-missing-disc");
        assert_eq!(resolved.mrl(), "cdda:///Volumes/cdp-missing-disc");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_is_followed() {
        let dir = scratch_dir();
        let node = dir.join("sr0");
        fs::write(&node, b"").unwrap();
        let link = dir.join("cdrom");
        std::os::unix::fs::symlink(&node, &link).unwrap();

        let resolved = resolve_target(&link, 1, Duration::from_millis(1));
        assert!(resolved.resolved);
        assert_eq!(PathBuf::from(&resolved.target), node.canonicalize().unwrap());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_list_audio_tracks() {
        let dir = scratch_dir();
        for name in ["2 Audio Track.aiff", "10 Audio Track.aiff", "1 Audio Track.AIFF", ".TOC.plist", "cover.jpg"] {
            fs::write(dir.join(name), b"").unwrap();
        }
        fs::create_dir(dir.join("3 Audio Track.aiff")).unwrap();

        let extensions = vec!["aiff".to_string(), "wav".to_string()];
        let names: Vec<String> = list_audio_tracks(&dir, &extensions)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            names,
            vec!["1 Audio Track.AIFF", "10 Audio Track.aiff", "2 Audio Track.aiff"]
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_list_audio_tracks_missing_dir() {
        assert!(list_audio_tracks(Path::new("/nonexistent/cdp"), &["aiff".to_string()]).is_empty());
    }

    #[test]
    fn test_eject_failures_are_logged_only() {
        run_eject(&[]);
        run_eject(&["cdp-no-such-eject".to_string()]);
        run_eject(&["false".to_string()]);
        run_eject(&["true".to_string()]);
    }
}
