use std::io::{self, Write};
use tracing::debug;

use crate::protocol::Event;

/// Writes events to the parent as JSON lines, flushing after each one
pub struct EventEncoder<W> {
    writer: W,
}

impl<W: Write> EventEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Send one event; a parent that stopped listening is not an error
    pub fn send(&mut self, event: &Event) {
        if let Err(e) = self.try_send(event) {
            debug!(error = %e, "Dropping event, parent is not listening");
        }
    }

    fn try_send(&mut self, event: &Event) -> io::Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    #[derive(Default)]
    struct FlushCounter {
        written: Vec<u8>,
        flushes: usize,
    }

    impl Write for FlushCounter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn each_event_is_one_flushed_line() {
        let mut encoder = EventEncoder::new(FlushCounter::default());
        encoder.send(&Event::Spawned { pid: 7 });
        encoder.send(&Event::Killed);

        let sink = encoder.get_ref();
        assert_eq!(
            String::from_utf8(sink.written.clone()).unwrap(),
            "{\"type\":\"spawned\",\"pid\":7}\n{\"type\":\"killed\"}\n"
        );
        assert_eq!(sink.flushes, 2);
    }

    #[test]
    fn output_is_escaped_onto_a_single_line() {
        let mut encoder = EventEncoder::new(Vec::new());
        encoder.send(&Event::Output {
            data: "a\nb\u{1b}[0m".into(),
        });

        let written = String::from_utf8(encoder.get_ref().clone()).unwrap();
        assert_eq!(written.matches('\n').count(), 1);
        assert!(written.ends_with('\n'));
    }

    #[test]
    fn broken_pipe_is_swallowed() {
        let mut encoder = EventEncoder::new(ClosedPipe);
        encoder.send(&Event::error("nobody is listening"));
        encoder.send(&Event::Killed);
    }
}
