use std::os::fd::OwnedFd;
use std::path::PathBuf;

use nix::sys::signal::Signal;

use crate::error::PtyError;

/// Terminal dimensions in character cells
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Configuration for spawning a PTY
#[derive(Clone, Debug)]
pub struct PtyConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Falls back to the caller's working directory when absent or unusable
    pub working_dir: Option<PathBuf>,
    /// Merged over the inherited environment; later entries win
    pub env: Vec<(String, String)>,
    pub size: WindowSize,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            command: "/bin/sh".to_string(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            size: WindowSize::default(),
        }
    }
}

/// Result of a non-blocking reap attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildStatus {
    Running,
    Exited(i32),
    Signaled(i32),
    /// Terminated, but the status could not be determined
    Unknown,
}

impl ChildStatus {
    /// Wire exit code for a terminated child, `None` while it is still running.
    ///
    /// Normal exits report their status, signal deaths the negated signal
    /// number, and anything indeterminate `-1`.
    pub fn exit_code(self) -> Option<i32> {
        match self {
            ChildStatus::Running => None,
            ChildStatus::Exited(code) => Some(code),
            ChildStatus::Signaled(signal) => Some(-signal),
            ChildStatus::Unknown => Some(-1),
        }
    }
}

/// A child process attached to the slave side of a PTY.
///
/// The owner keeps the master side; dropping the value closes it.
pub trait PtyProcess: Send {
    fn pid(&self) -> u32;

    /// Duplicate the master descriptor for readiness-driven reads.
    ///
    /// The duplicate shares the open file description, so flags such as
    /// `O_NONBLOCK` set on it apply to the master itself.
    fn try_clone_master(&self) -> Result<OwnedFd, PtyError>;

    fn write_input(&mut self, data: &[u8]) -> Result<(), PtyError>;

    fn resize(&mut self, size: WindowSize) -> Result<(), PtyError>;

    fn signal(&mut self, signal: Signal) -> Result<(), PtyError>;

    /// Reap the child if it has terminated, without blocking.
    fn try_wait(&mut self) -> ChildStatus;
}

/// Creates PTY-attached children
pub trait Spawner {
    fn spawn(&mut self, config: &PtyConfig) -> Result<Box<dyn PtyProcess>, PtyError>;
}
