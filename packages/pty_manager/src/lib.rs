//! PTY Manager - PTY allocation and child lifecycle for a single session
//!
//! Allocates a pseudo-terminal, starts a child on its slave side and hands
//! back a [`PtyProcess`] that owns the master. Callers drive I/O on a
//! duplicate of the master descriptor, reap the child without blocking and
//! deliver signals.
//!
//! The [`Spawner`] trait is the seam between callers and the host OS:
//! [`NativeSpawner`] uses real PTYs, tests can substitute their own.
//!
//! # Example
//!
//! ```no_run
//! use pty_manager::{ChildStatus, NativeSpawner, PtyConfig, Spawner};
//!
//! let mut spawner = NativeSpawner::new();
//! let config = PtyConfig {
//!     command: "/bin/echo".to_string(),
//!     args: vec!["hello".to_string()],
//!     ..Default::default()
//! };
//!
//! let mut child = spawner.spawn(&config).unwrap();
//! while child.try_wait() == ChildStatus::Running {
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! ```

#[cfg(not(unix))]
compile_error!("pty_manager drives PTY descriptors directly and requires a unix host");

mod error;
mod native;
pub mod pty;

pub use error::PtyError;
pub use native::{NativePty, NativeSpawner, set_nonblocking};
pub use nix::sys::signal::Signal;
pub use pty::{ChildStatus, PtyConfig, PtyProcess, Spawner, WindowSize};
