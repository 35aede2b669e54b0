use std::io;

/// Errors that can occur during PTY operations
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    /// Failed to allocate the PTY pair
    #[error("failed to open PTY: {0}")]
    Open(String),
    /// Failed to start the child on the slave side
    #[error("{0}")]
    Spawn(String),
    /// Read or write on the master failed
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Failed to apply a window size
    #[error("failed to resize PTY: {0}")]
    Resize(String),
    /// The target process no longer exists
    #[error("no such process: {0}")]
    NoSuchProcess(u32),
    /// Signal delivery failed for another reason
    #[error("failed to signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: nix::Error,
    },
}
