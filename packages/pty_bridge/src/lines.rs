//! Lenient text framing for both directions of the bridge

/// Accumulates bytes from the control channel and yields complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and return every line it completed.
    ///
    /// Lines are decoded as UTF-8 with replacement characters. Blank lines
    /// are dropped and a trailing `\r` is removed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();

        complete
            .split(|&b| b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .filter(|line| !line.trim().is_empty())
            .collect()
    }
}

/// Turns PTY output chunks into text without splitting UTF-8 sequences.
///
/// A multi-byte character cut off at the end of one read is held back and
/// completed by the next one; genuinely invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct OutputDecoder {
    carry: Vec<u8>,
}

impl OutputDecoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.carry.extend_from_slice(chunk);
        let ready = self.carry.len() - incomplete_tail_len(&self.carry);
        let text = String::from_utf8_lossy(&self.carry[..ready]).into_owned();
        self.carry.drain(..ready);
        text
    }

    /// Flush whatever is held back, e.g. once the child is gone
    pub fn finish(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        Some(text)
    }
}

/// Length of a UTF-8 sequence at the end of `bytes` that is valid so far but
/// still missing continuation bytes
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    for i in (start..bytes.len()).rev() {
        if bytes[i] & 0xC0 != 0x80 {
            return match std::str::from_utf8(&bytes[i..]) {
                Err(e) if e.error_len().is_none() => bytes.len() - i,
                _ => 0,
            };
        }
    }
    0
}
