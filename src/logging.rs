use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

static LOG_FILE: Lazy<Mutex<Option<File>>> = Lazy::new(|| Mutex::new(None));

/// Directory holding the player log and the engine's captured output
pub fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cdp")
        .join("logs")
}

/// Get the log file path
pub fn log_file_path() -> PathBuf {
    log_dir().join("cdp.log")
}

/// Writes every formatted record to stderr and, when it could be opened, the log file.
struct TeeWriter;

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        if let Some(file) = LOG_FILE.lock().as_mut() {
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        if let Some(file) = LOG_FILE.lock().as_mut() {
            let _ = file.flush();
        }
        Ok(())
    }
}

/// Initialize logging - creates the log directory and truncates the previous log
pub fn init_logging() {
    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    // One log per run
    let _ = File::create(&log_path);
    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => *LOG_FILE.lock() = Some(file),
        Err(e) => eprintln!("[WARN] Could not open log file {}: {}", log_path.display(), e),
    }

    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            writeln!(
                buf,
                "[{}] [{}] [{}] {}",
                timestamp,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(TeeWriter)))
        .try_init();

    if result.is_err() {
        log::debug!("Logger already initialized");
        return;
    }

    log::info!("cdp started, logging to {}", log_path.display());
}

/// Get log file size in bytes
pub fn log_file_size() -> Result<u64, String> {
    log_size(&log_file_path())
}

fn log_size(path: &Path) -> Result<u64, String> {
    if !path.exists() {
        return Ok(0);
    }

    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| format!("Failed to get log file size: {}", e))
}
