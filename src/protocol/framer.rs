//! Stream framer for process stdout
//!
//! Each toolchain process gets its own framer and therefore its own frame
//! buffer. Chunks are appended as they arrive; every complete line (terminated
//! by `\n`, optionally preceded by `\r`) is parsed into an [`Envelope`] and the
//! unterminated tail stays buffered for the next chunk.
//!
//! A complete line that fails to parse is not dropped right away. It is carried
//! and retried together with the following line, because some modules are known
//! to split one record over several writes. The carry is bounded by
//! `max_frame_bytes`.

use crate::protocol::Envelope;

/// Default upper bound for a single (possibly multi-line) frame
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Framing statistics for one stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FramerStats {
    /// Total bytes fed into the framer
    pub bytes_seen: u64,
    /// Envelopes decoded successfully
    pub frames_decoded: u64,
    /// Frames discarded because they never parsed
    pub frames_discarded: u64,
}

/// Reassembles envelopes from an arbitrarily chunked byte stream
#[derive(Debug)]
pub struct StreamFramer {
    /// Bytes after the last observed terminator
    buffer: Vec<u8>,
    /// Complete lines that did not parse yet
    carry: Vec<u8>,
    max_frame_bytes: usize,
    stats: FramerStats,
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl StreamFramer {
    /// Create a framer with the given frame size bound
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            carry: Vec::new(),
            max_frame_bytes: max_frame_bytes.max(1),
            stats: FramerStats::default(),
        }
    }

    /// Feed one chunk and return every envelope it completed, in arrival order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Envelope> {
        self.stats.bytes_seen += chunk.len() as u64;
        self.buffer.extend_from_slice(chunk);

        let mut envelopes = Vec::new();
        let Some(last_terminator) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            self.enforce_bound();
            return envelopes;
        };

        let tail = self.buffer.split_off(last_terminator + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);

        for line in complete.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            if let Some(envelope) = self.decode_line(line) {
                envelopes.push(envelope);
            }
        }

        self.enforce_bound();
        envelopes
    }

    /// Whether any bytes are waiting for a terminator or a retry
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || !self.carry.is_empty()
    }

    /// Number of buffered bytes (tail + carry)
    pub fn pending_len(&self) -> usize {
        self.buffer.len() + self.carry.len()
    }

    pub fn stats(&self) -> &FramerStats {
        &self.stats
    }

    /// Drop everything buffered, returning the number of bytes discarded
    pub fn reset(&mut self) -> usize {
        let dropped = self.pending_len();
        self.buffer.clear();
        self.carry.clear();
        dropped
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<Envelope> {
        if self.carry.is_empty() {
            return match Envelope::from_line(line) {
                Ok(envelope) => {
                    self.stats.frames_decoded += 1;
                    Some(envelope)
                }
                Err(_) => {
                    self.carry.extend_from_slice(line);
                    None
                }
            };
        }

        self.carry.push(b'\n');
        self.carry.extend_from_slice(line);
        if let Ok(envelope) = Envelope::from_line(&self.carry) {
            self.carry.clear();
            self.stats.frames_decoded += 1;
            return Some(envelope);
        }

        // The joined frame still fails; a line that parses on its own means the
        // carry was garbage.
        match Envelope::from_line(line) {
            Ok(envelope) => {
                tracing::warn!(
                    "Discarding {} bytes of unparsable output",
                    self.carry.len() - line.len() - 1
                );
                self.carry.clear();
                self.stats.frames_discarded += 1;
                self.stats.frames_decoded += 1;
                Some(envelope)
            }
            Err(_) => None,
        }
    }

    fn enforce_bound(&mut self) {
        if self.carry.len() > self.max_frame_bytes {
            tracing::warn!(
                "Unparsable frame exceeded {} bytes, discarding",
                self.max_frame_bytes
            );
            self.carry.clear();
            self.stats.frames_discarded += 1;
        }
        if self.buffer.len() > self.max_frame_bytes {
            tracing::warn!(
                "Unterminated frame exceeded {} bytes, discarding",
                self.max_frame_bytes
            );
            self.buffer.clear();
            self.stats.frames_discarded += 1;
        }
    }
}
