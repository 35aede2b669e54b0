use std::io::{self, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tracing::{debug, error, info};

use crate::error::PtyError;
use crate::pty::{ChildStatus, PtyConfig, PtyProcess, Spawner, WindowSize};

/// Used when neither the inherited environment nor the overrides set `TERM`
const DEFAULT_TERM: &str = "xterm-256color";

/// Spawns children on PTYs allocated by the host OS
#[derive(Debug, Default)]
pub struct NativeSpawner;

impl NativeSpawner {
    pub fn new() -> Self {
        Self
    }
}

impl Spawner for NativeSpawner {
    fn spawn(&mut self, config: &PtyConfig) -> Result<Box<dyn PtyProcess>, PtyError> {
        let pty = NativePty::spawn(config)?;
        Ok(Box::new(pty))
    }
}

/// A child running on a host PTY
pub struct NativePty {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    // Held so the child handle lives as long as the session; reaping goes through waitpid
    _child: Box<dyn Child + Send + Sync>,
    pid: u32,
}

impl NativePty {
    pub fn spawn(config: &PtyConfig) -> Result<Self, PtyError> {
        if config.command.is_empty() {
            return Err(PtyError::Spawn("no command given".into()));
        }

        let pair = native_pty_system()
            .openpty(pty_size(config.size))
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&config.command);
        cmd.args(&config.args);

        if let Some(dir) = resolve_working_dir(config.working_dir.as_deref()) {
            cmd.cwd(dir);
        }

        if std::env::var_os("TERM").is_none() {
            cmd.env("TERM", DEFAULT_TERM);
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        info!(
            "Spawning PTY command: {} with args: {:?}",
            config.command, config.args
        );

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            error!("Failed to spawn command '{}': {}", config.command, e);
            PtyError::Spawn(e.to_string())
        })?;

        // The master only hangs up once every slave descriptor is closed
        drop(pair.slave);

        let pid = child
            .process_id()
            .ok_or_else(|| PtyError::Spawn("child has no process id".into()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Open(e.to_string()))?;

        info!("PTY process started with PID: {}", pid);

        Ok(Self {
            master: pair.master,
            writer,
            _child: child,
            pid,
        })
    }

    fn master_fd(&self) -> Result<BorrowedFd<'_>, PtyError> {
        let raw = self
            .master
            .as_raw_fd()
            .ok_or_else(|| PtyError::Open("PTY master has no descriptor".into()))?;
        // SAFETY: `self.master` owns the descriptor and outlives the borrow
        Ok(unsafe { BorrowedFd::borrow_raw(raw) })
    }
}

impl PtyProcess for NativePty {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn try_clone_master(&self) -> Result<OwnedFd, PtyError> {
        Ok(self.master_fd()?.try_clone_to_owned()?)
    }

    fn write_input(&mut self, data: &[u8]) -> Result<(), PtyError> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    fn resize(&mut self, size: WindowSize) -> Result<(), PtyError> {
        self.master
            .resize(pty_size(size))
            .map_err(|e| PtyError::Resize(e.to_string()))
    }

    fn signal(&mut self, signal: Signal) -> Result<(), PtyError> {
        match kill(Pid::from_raw(self.pid as i32), signal) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(PtyError::NoSuchProcess(self.pid)),
            Err(source) => Err(PtyError::Signal {
                pid: self.pid,
                source,
            }),
        }
    }

    fn try_wait(&mut self) -> ChildStatus {
        match waitpid(Pid::from_raw(self.pid as i32), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => ChildStatus::Exited(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => ChildStatus::Signaled(signal as i32),
            // StillAlive, stopped and continued children are all still ours
            Ok(_) => ChildStatus::Running,
            Err(e) => {
                debug!(pid = self.pid, error = %e, "Could not reap child");
                ChildStatus::Unknown
            }
        }
    }
}

/// Put a descriptor into non-blocking mode.
///
/// Applies to the whole open file description, so every duplicate of the
/// descriptor is affected.
pub fn set_nonblocking<Fd: AsFd>(fd: &Fd) -> Result<(), PtyError> {
    let flags = fcntl(fd.as_fd(), FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let flags = OFlag::from_bits_truncate(flags);
    fcntl(fd.as_fd(), FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(io::Error::from)?;
    Ok(())
}

fn pty_size(size: WindowSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// A requested directory that is not usable falls back to our own cwd
fn resolve_working_dir(requested: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = requested {
        if dir.is_dir() {
            return Some(dir.to_path_buf());
        }
        debug!(
            "Working directory {} is not usable, keeping the inherited one",
            dir.display()
        );
    }
    std::env::current_dir().ok()
}
