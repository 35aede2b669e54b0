//! Socket-pair backed stand-ins for PTY children

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pty_manager::{ChildStatus, PtyConfig, PtyError, PtyProcess, Signal, Spawner, WindowSize};

struct FakeState {
    status: ChildStatus,
    signals: Vec<Signal>,
    resizes: Vec<WindowSize>,
    fail_writes: bool,
    fail_resizes: bool,
    vanished: bool,
}

/// The bridge's side: what the controller owns after a spawn
pub struct FakeProcess {
    pid: u32,
    master: UnixStream,
    state: Arc<Mutex<FakeState>>,
}

/// The test's side: the child's terminal plus knobs for its behaviour
pub struct FakeChild {
    pub terminal: UnixStream,
    state: Arc<Mutex<FakeState>>,
}

pub fn fake_process(pid: u32) -> (FakeProcess, FakeChild) {
    let (master, terminal) = UnixStream::pair().unwrap();
    terminal
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let state = Arc::new(Mutex::new(FakeState {
        status: ChildStatus::Running,
        signals: Vec::new(),
        resizes: Vec::new(),
        fail_writes: false,
        fail_resizes: false,
        vanished: false,
    }));

    (
        FakeProcess {
            pid,
            master,
            state: state.clone(),
        },
        FakeChild { terminal, state },
    )
}

impl FakeChild {
    pub fn exit(&self, status: ChildStatus) {
        self.state.lock().unwrap().status = status;
    }

    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    pub fn fail_resizes(&self) {
        self.state.lock().unwrap().fail_resizes = true;
    }

    /// Make signal delivery report a missing process
    pub fn vanish(&self) {
        self.state.lock().unwrap().vanished = true;
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.state.lock().unwrap().signals.clone()
    }

    pub fn resizes(&self) -> Vec<WindowSize> {
        self.state.lock().unwrap().resizes.clone()
    }

    pub fn read_input(&mut self, len: usize) -> String {
        let mut buf = vec![0u8; len];
        self.terminal.read_exact(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }
}

impl PtyProcess for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn try_clone_master(&self) -> Result<OwnedFd, PtyError> {
        Ok(self.master.as_fd().try_clone_to_owned()?)
    }

    fn write_input(&mut self, data: &[u8]) -> Result<(), PtyError> {
        if self.state.lock().unwrap().fail_writes {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
        }
        self.master.write_all(data)?;
        Ok(())
    }

    fn resize(&mut self, size: WindowSize) -> Result<(), PtyError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_resizes {
            return Err(PtyError::Resize("bad file descriptor".into()));
        }
        state.resizes.push(size);
        Ok(())
    }

    fn signal(&mut self, signal: Signal) -> Result<(), PtyError> {
        let mut state = self.state.lock().unwrap();
        state.signals.push(signal);
        if state.vanished {
            return Err(PtyError::NoSuchProcess(self.pid));
        }
        Ok(())
    }

    fn try_wait(&mut self) -> ChildStatus {
        self.state.lock().unwrap().status
    }
}

/// Hands out prepared fake processes in order, then fails
#[derive(Default)]
pub struct FakeSpawner {
    ready: VecDeque<FakeProcess>,
    configs: Arc<Mutex<Vec<PtyConfig>>>,
}

impl FakeSpawner {
    pub fn new(processes: impl IntoIterator<Item = FakeProcess>) -> Self {
        Self {
            ready: processes.into_iter().collect(),
            configs: Arc::default(),
        }
    }

    /// Every config passed to `spawn`, shared so it survives moving the spawner
    pub fn configs(&self) -> Arc<Mutex<Vec<PtyConfig>>> {
        self.configs.clone()
    }
}

impl Spawner for FakeSpawner {
    fn spawn(&mut self, config: &PtyConfig) -> Result<Box<dyn PtyProcess>, PtyError> {
        self.configs.lock().unwrap().push(config.clone());
        match self.ready.pop_front() {
            Some(process) => Ok(Box::new(process)),
            None => Err(PtyError::Spawn(format!("{}: not found", config.command))),
        }
    }
}
