use std::fs::File;
use std::future::Future;
use std::io::{self, Read, Write};
use std::os::fd::OwnedFd;
use std::time::Duration;

use anyhow::{Context, Result};
use pty_manager::{PtyConfig, Spawner, WindowSize, set_nonblocking};
use tokio::io::unix::AsyncFd;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::controller::{Controller, OUTPUT_CHUNK};
use crate::encoder::EventEncoder;
use crate::lines::LineBuffer;
use crate::protocol::{Command, Event, KillSignal, decode_command};

/// Largest single read from the control channel
pub const INPUT_CHUNK: usize = 4096;

#[derive(Clone, Debug)]
pub struct BridgeOptions {
    /// Stop once the child has exited and its exit has been reported
    pub exit_on_child_exit: bool,
    /// How often to poll for child termination
    pub poll_interval: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            exit_on_child_exit: false,
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Multiplexes the control channel, the PTY master and exit polling
pub struct Bridge<S, W> {
    controller: Controller<S>,
    encoder: EventEncoder<W>,
    options: BridgeOptions,
    child_exited: bool,
}

impl<S: Spawner, W: Write> Bridge<S, W> {
    pub fn new(spawner: S, writer: W, options: BridgeOptions) -> Self {
        Self {
            controller: Controller::new(spawner),
            encoder: EventEncoder::new(writer),
            options,
            child_exited: false,
        }
    }

    /// Serve commands from `input` until it closes, a kill is issued for a
    /// live child, or `interrupt` resolves.
    ///
    /// Each wakeup handles one source, then termination is checked.
    pub async fn run<F>(&mut self, input: OwnedFd, interrupt: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let input = ControlChannel::open(input)?;

        let mut lines = LineBuffer::default();
        let mut input_buf = vec![0u8; INPUT_CHUNK];
        let mut output_buf = vec![0u8; OUTPUT_CHUNK];
        let mut tick = tokio::time::interval(self.options.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(interrupt);

        info!("Bridge ready, waiting for commands");

        loop {
            tokio::select! {
                read = input.read(&mut input_buf) => match read {
                    Ok(0) => {
                        info!("Control channel closed, shutting down");
                        return Ok(());
                    }
                    Ok(n) => {
                        for line in lines.push(&input_buf[..n]) {
                            self.dispatch(&line);
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        warn!(error = %e, "Control channel read failed, shutting down");
                        return Ok(());
                    }
                },
                read = read_ready(self.controller.master(), &mut output_buf) => {
                    let events = self.controller.handle_output(read, &output_buf);
                    self.emit(events);
                }
                _ = tick.tick() => {
                    let events = self.controller.check_exit();
                    self.emit(events);
                }
                () = &mut interrupt => {
                    info!("Interrupted, stopping");
                    let event = self.controller.kill(KillSignal::Term);
                    self.emit([event]);
                    return Ok(());
                }
            }

            if self.controller.shutdown_requested() {
                info!("Process killed, shutting down");
                return Ok(());
            }
            if self.options.exit_on_child_exit && self.child_exited {
                info!("Child exited, shutting down");
                return Ok(());
            }
        }
    }

    fn dispatch(&mut self, line: &str) {
        let command = match decode_command(line) {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "Rejected line from parent");
                self.emit([Event::error(e.to_string())]);
                return;
            }
        };

        match command {
            Command::Spawn {
                cmd,
                args,
                cwd,
                env,
                cols,
                rows,
            } => {
                let config = PtyConfig {
                    command: cmd,
                    args,
                    working_dir: cwd,
                    env: env.into_iter().collect(),
                    size: WindowSize { cols, rows },
                };
                let event = self.controller.spawn(config);
                self.emit([event]);
            }
            Command::Write { data } => {
                if let Some(event) = self.controller.write(&data) {
                    self.emit([event]);
                }
            }
            Command::Resize { cols, rows } => self.controller.resize(WindowSize { cols, rows }),
            Command::Kill { signal } => {
                let event = self.controller.kill(signal);
                self.emit([event]);
            }
        }
    }

    fn emit(&mut self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            if matches!(event, Event::Exit { .. }) {
                self.child_exited = true;
            }
            self.encoder.send(&event);
        }
    }
}

/// Where commands from the parent are read
enum ControlChannel {
    Polled(AsyncFd<File>),
    /// Regular files and `/dev/null` cannot be registered with epoll, but
    /// reading them never blocks
    Direct(File),
}

impl ControlChannel {
    fn open(input: OwnedFd) -> Result<Self> {
        set_nonblocking(&input).context("failed to make the control channel non-blocking")?;
        let watched = input
            .try_clone()
            .context("failed to duplicate the control channel")?;

        match AsyncFd::new(File::from(watched)) {
            Ok(fd) => Ok(Self::Polled(fd)),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                debug!("Control channel is not pollable, reading it directly");
                Ok(Self::Direct(File::from(input)))
            }
            Err(e) => Err(e).context("failed to watch the control channel"),
        }
    }

    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Polled(fd) => read_ready(Some(fd), buf).await,
            Self::Direct(file) => {
                // Give the other branches a turn, the read itself is always ready
                tokio::task::yield_now().await;
                let mut reader: &File = file;
                reader.read(buf)
            }
        }
    }
}

/// Wait until `fd` is readable and read once; never resolves without a descriptor
async fn read_ready(fd: Option<&AsyncFd<File>>, buf: &mut [u8]) -> io::Result<usize> {
    let Some(fd) = fd else {
        return std::future::pending().await;
    };

    loop {
        let mut guard = fd.readable().await?;
        match guard.try_io(|inner| {
            let mut file = inner.get_ref();
            file.read(buf)
        }) {
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}
