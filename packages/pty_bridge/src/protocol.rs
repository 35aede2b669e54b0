//! Wire protocol
//!
//! One JSON object per `\n`-terminated line in each direction, discriminated
//! by a `type` field. Commands flow from the parent on stdin, events back on
//! stdout.

use pty_manager::Signal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

const COMMAND_TYPES: [&str; 4] = ["spawn", "write", "resize", "kill"];

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

/// Window dimensions are best-effort: any JSON number is rounded and clamped
/// into `1..=u16::MAX`, anything else falls back to `fallback`
fn dimension<'de, D>(deserializer: D, fallback: u16) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value.as_f64() {
        Some(n) if n.is_finite() => n.round().clamp(1.0, f64::from(u16::MAX)) as u16,
        _ => fallback,
    })
}

fn lenient_cols<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    dimension(deserializer, default_cols())
}

fn lenient_rows<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    dimension(deserializer, default_rows())
}

/// Requests sent FROM the parent TO the helper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Start the session's child on a fresh PTY
    Spawn {
        #[serde(default)]
        cmd: String,
        #[serde(default)]
        args: Vec<String>,
        /// Defaults to the helper's own working directory
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default = "default_cols", deserialize_with = "lenient_cols")]
        cols: u16,
        #[serde(default = "default_rows", deserialize_with = "lenient_rows")]
        rows: u16,
    },

    /// Raw text for the child's terminal input
    Write {
        #[serde(default)]
        data: String,
    },

    Resize {
        #[serde(default = "default_cols", deserialize_with = "lenient_cols")]
        cols: u16,
        #[serde(default = "default_rows", deserialize_with = "lenient_rows")]
        rows: u16,
    },

    Kill {
        #[serde(default)]
        signal: KillSignal,
    },
}

/// Signals the parent may ask for when killing the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillSignal {
    #[default]
    #[serde(rename = "SIGTERM")]
    Term,
    #[serde(rename = "SIGKILL")]
    Kill,
    #[serde(rename = "SIGINT")]
    Interrupt,
    #[serde(rename = "SIGHUP")]
    Hangup,
}

impl From<KillSignal> for Signal {
    fn from(signal: KillSignal) -> Self {
        match signal {
            KillSignal::Term => Signal::SIGTERM,
            KillSignal::Kill => Signal::SIGKILL,
            KillSignal::Interrupt => Signal::SIGINT,
            KillSignal::Hangup => Signal::SIGHUP,
        }
    }
}

/// Notifications sent FROM the helper TO the parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Spawned { pid: u32 },
    Output { data: String },
    /// Emitted once per session, after the child has been reaped
    Exit { code: i32 },
    Error { message: String },
    Killed,
}

impl Event {
    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            message: message.into(),
        }
    }
}

/// Why a line from the parent could not become a [`Command`].
///
/// The `Display` output is the exact `message` of the resulting error event.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(#[source] serde_json::Error),
}

/// Decode one line (without its newline) into a command
pub fn decode_command(line: &str) -> Result<Command, ProtocolError> {
    let value: Value = serde_json::from_str(line).map_err(ProtocolError::InvalidJson)?;

    match value.get("type") {
        Some(Value::String(kind)) if COMMAND_TYPES.contains(&kind.as_str()) => {}
        Some(Value::String(kind)) => return Err(ProtocolError::UnknownCommand(kind.clone())),
        other => {
            let shown = other.unwrap_or(&Value::Null).to_string();
            return Err(ProtocolError::UnknownCommand(shown));
        }
    }

    serde_json::from_value(value).map_err(ProtocolError::InvalidCommand)
}
