use std::fs::File;
use std::io::{self, Read};

use pty_manager::{PtyConfig, PtyError, PtyProcess, Signal, Spawner, WindowSize, set_nonblocking};
use tokio::io::unix::AsyncFd;
use tracing::{debug, info, warn};

use crate::lines::OutputDecoder;
use crate::protocol::{Event, KillSignal};

/// Largest single read from the PTY master
pub const OUTPUT_CHUNK: usize = 16 * 1024;

/// Reads allowed when flushing buffered output ahead of an exit report
const MAX_DRAIN_READS: usize = 64;

/// The one child this helper may be running
struct Session {
    process: Box<dyn PtyProcess>,
    master: AsyncFd<File>,
    decoder: OutputDecoder,
    /// Cleared once the parent has asked for the child to be killed
    running: bool,
    /// The master reported EOF or an error; only reaping is left
    hung_up: bool,
}

impl Session {
    /// Read whatever the child left in the PTY buffer without waiting
    fn drain_output(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        let mut buf = vec![0u8; OUTPUT_CHUNK];

        for _ in 0..MAX_DRAIN_READS {
            let mut master = self.master.get_ref();
            match master.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => push_output(&mut events, self.decoder.decode(&buf[..n])),
            }
        }
        if let Some(tail) = self.decoder.finish() {
            push_output(&mut events, tail);
        }
        events
    }
}

fn push_output(events: &mut Vec<Event>, data: String) {
    if !data.is_empty() {
        events.push(Event::Output { data });
    }
}

/// Owns the session and turns commands and PTY activity into events.
///
/// Nothing here writes to the parent; callers forward the returned events.
pub struct Controller<S> {
    spawner: S,
    session: Option<Session>,
}

impl<S: Spawner> Controller<S> {
    pub fn new(spawner: S) -> Self {
        Self {
            spawner,
            session: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.process.pid())
    }

    pub fn spawn(&mut self, config: PtyConfig) -> Event {
        if let Some(pid) = self.pid() {
            warn!(pid, "Rejecting spawn while a process is running");
            return Event::error(format!("Process already running (pid {pid})"));
        }

        match self.start(&config) {
            Ok(session) => {
                let pid = session.process.pid();
                info!(pid, command = %config.command, "Session started");
                self.session = Some(session);
                Event::Spawned { pid }
            }
            Err(e) => {
                warn!(command = %config.command, error = %e, "Spawn failed");
                Event::error(format!("Spawn failed: {e}"))
            }
        }
    }

    fn start(&mut self, config: &PtyConfig) -> Result<Session, PtyError> {
        let mut process = self.spawner.spawn(config)?;

        let master = match watch_master(&*process) {
            Ok(master) => master,
            Err(e) => {
                // Nobody could ever read from this child, don't leave it running
                if let Err(kill_err) = process.signal(Signal::SIGKILL) {
                    debug!(error = %kill_err, "Could not kill unwatchable child");
                }
                return Err(e);
            }
        };

        Ok(Session {
            process,
            master,
            decoder: OutputDecoder::default(),
            running: true,
            hung_up: false,
        })
    }

    /// Forward input to the child; a no-op without a session
    pub fn write(&mut self, data: &str) -> Option<Event> {
        let session = self.session.as_mut()?;
        match session.process.write_input(data.as_bytes()) {
            Ok(()) => None,
            Err(e) => {
                warn!(pid = session.process.pid(), error = %e, "Write to PTY failed");
                Some(Event::error(format!("Write failed: {e}")))
            }
        }
    }

    /// Resize failures are not reported to the parent
    pub fn resize(&mut self, size: WindowSize) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.process.resize(size) {
            Ok(()) => debug!(cols = size.cols, rows = size.rows, "Resized PTY"),
            Err(e) => debug!(error = %e, "Ignoring failed resize"),
        }
    }

    /// Signal the child if there is one; the parent always gets `killed` back
    pub fn kill(&mut self, signal: KillSignal) -> Event {
        if let Some(session) = self.session.as_mut() {
            let pid = session.process.pid();
            match session.process.signal(signal.into()) {
                Ok(()) => info!(pid, ?signal, "Signalled PTY process"),
                Err(PtyError::NoSuchProcess(_)) => debug!(pid, "Process already gone"),
                Err(e) => warn!(pid, error = %e, "Failed to signal PTY process"),
            }
            session.running = false;
        }
        Event::Killed
    }

    /// True once a kill was issued for a live session
    pub fn shutdown_requested(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.running)
    }

    /// The master to watch for output, `None` when there is nothing to read
    pub fn master(&self) -> Option<&AsyncFd<File>> {
        self.session
            .as_ref()
            .filter(|s| !s.hung_up)
            .map(|s| &s.master)
    }

    /// Reap the child if it has terminated.
    ///
    /// Remaining output is flushed first, so `exit` is always the last event
    /// of a session. The session is gone afterwards.
    pub fn check_exit(&mut self) -> Vec<Event> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let Some(code) = session.process.try_wait().exit_code() else {
            return Vec::new();
        };

        let pid = session.process.pid();
        let mut events = session.drain_output();
        events.push(Event::Exit { code });
        info!(pid, code, "PTY process exited");

        self.session = None;
        events
    }

    /// Handle the outcome of one read from the master into `buf`
    pub fn handle_output(&mut self, read: io::Result<usize>, buf: &[u8]) -> Vec<Event> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        match read {
            Ok(0) => {
                debug!("PTY EOF");
                session.hung_up = true;
                self.check_exit()
            }
            Ok(n) => {
                let mut events = Vec::new();
                push_output(&mut events, session.decoder.decode(&buf[..n]));
                events
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Vec::new(),
            Err(e) => {
                // Linux reports EIO once the slave side is fully closed
                debug!(error = %e, "PTY read failed, treating as hangup");
                session.hung_up = true;
                self.check_exit()
            }
        }
    }
}

fn watch_master(process: &dyn PtyProcess) -> Result<AsyncFd<File>, PtyError> {
    let master = process.try_clone_master()?;
    set_nonblocking(&master)?;
    Ok(AsyncFd::new(File::from(master))?)
}
