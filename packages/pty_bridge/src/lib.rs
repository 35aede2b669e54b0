//! Drives one PTY-attached child on behalf of a parent process.
//!
//! The parent talks to the helper over stdin and stdout using JSON lines
//! (see [`protocol`]). [`Bridge`] multiplexes that channel with the PTY
//! master and reports output, exits and errors back as events.

pub mod bridge;
pub mod controller;
pub mod encoder;
pub mod lines;
pub mod protocol;

#[cfg(test)]
mod testing;

pub use bridge::{Bridge, BridgeOptions};
pub use controller::Controller;
pub use protocol::{Command, Event, KillSignal, ProtocolError, decode_command};
