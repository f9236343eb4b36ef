//! Child-process transport for the media engine's RC interface

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::protocol::RcCommand;

/// Poll step while waiting for the engine to exit
const EXIT_POLL: Duration = Duration::from_millis(20);

/// A command channel to a running media engine
///
/// Every failure after launch is absorbed: the engine may exit at any moment
/// and the player must keep going.
pub trait Transport: Send {
    /// Launch the engine. Returns the process id, or `None` if it could not be started.
    fn start(&mut self, args: &[String]) -> Option<u32>;

    /// Write one command line if the engine is alive
    fn send(&mut self, command: &RcCommand);

    fn is_alive(&mut self) -> bool;

    /// Ask the engine to shut down, kill it after the grace period. Idempotent.
    fn terminate(&mut self);
}

/// Where the engine's stdout and stderr go
#[derive(Debug, Clone)]
pub enum OutputSink {
    Discard,
    /// `engine_stdout.log` and `engine_stderr.log` in this directory
    LogDir(PathBuf),
}

pub struct ProcessTransport {
    program: PathBuf,
    output: OutputSink,
    grace: Duration,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl ProcessTransport {
    pub fn new(program: impl Into<PathBuf>, output: OutputSink, grace: Duration) -> Self {
        Self {
            program: program.into(),
            output,
            grace,
            child: None,
            stdin: None,
        }
    }

    fn output_stdio(&self, name: &str) -> Stdio {
        match &self.output {
            OutputSink::Discard => Stdio::null(),
            OutputSink::LogDir(dir) => {
                let _ = std::fs::create_dir_all(dir);
                match File::create(dir.join(name)) {
                    Ok(file) => Stdio::from(file),
                    Err(e) => {
                        log::warn!("Transport: cannot open {} for engine output: {}", name, e);
                        Stdio::null()
                    }
                }
            }
        }
    }

    /// Block until the child exits or `timeout` passes. Returns true if it exited.
    fn wait_for_exit(child: &mut Child, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return true,
                Ok(None) => {
                    if start.elapsed() >= timeout {
                        return false;
                    }
                    thread::sleep(EXIT_POLL);
                }
                Err(_) => return false,
            }
        }
    }
}

impl Transport for ProcessTransport {
    fn start(&mut self, args: &[String]) -> Option<u32> {
        if self.child.is_some() {
            self.terminate();
        }

        let executable = match locate_executable(&self.program) {
            Some(path) => path,
            None => {
                log::error!(
                    "Transport: media engine not found at {}",
                    self.program.display()
                );
                return None;
            }
        };

        let spawned = Command::new(&executable)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(self.output_stdio("engine_stdout.log"))
            .stderr(self.output_stdio("engine_stderr.log"))
            .spawn();

        match spawned {
            Ok(mut child) => {
                let pid = child.id();
                self.stdin = child.stdin.take();
                self.child = Some(child);
                log::info!("Transport: started {} (pid {})", executable.display(), pid);
                Some(pid)
            }
            Err(e) => {
                log::error!(
                    "Transport: failed to spawn {}: {}",
                    executable.display(),
                    e
                );
                None
            }
        }
    }

    fn send(&mut self, command: &RcCommand) {
        // The engine can exit between this check and the write; the write error covers that
        if !self.is_alive() {
            log::debug!("Transport: engine not running, dropping '{}'", command);
            return;
        }

        let Some(stdin) = self.stdin.as_mut() else {
            log::debug!("Transport: no command pipe, dropping '{}'", command);
            return;
        };

        let line = format!("{}\n", command);
        let result = stdin
            .write_all(line.as_bytes())
            .and_then(|_| stdin.flush());

        match result {
            Ok(()) => log::debug!("Transport: sent '{}'", command),
            Err(e) => log::warn!("Transport: failed to send '{}': {}", command, e),
        }
    }

    fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn terminate(&mut self) {
        if self.child.is_none() {
            return;
        }

        self.send(&RcCommand::Shutdown);
        // Closing the pipe is a second shutdown signal for engines that stop on EOF
        self.stdin = None;

        if let Some(mut child) = self.child.take() {
            if !Self::wait_for_exit(&mut child, self.grace) {
                log::warn!("Transport: engine ignored shutdown, killing pid {}", child.id());
                if let Err(e) = child.kill() {
                    log::warn!("Transport: kill failed: {}", e);
                }
                let _ = child.wait();
            }
            log::info!("Transport: engine stopped");
        }
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Find `program` either as a path or on `PATH`
pub fn locate_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file().then(|| program.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
