//! Push-based line/literal framer.
//!
//! Unlike a pull-based reader, the framer never performs I/O itself: it is
//! fed arbitrary byte chunks as they arrive from the transport (or from the
//! compression shim) and emits zero or more complete response texts per
//! chunk. This makes it trivially testable against any partition of a byte
//! stream into chunks (see the `proptest` below), which a pull-based
//! `AsyncRead`-driven reader cannot offer.

use bytes::BytesMut;

/// Accumulates inbound bytes and emits complete IMAP response texts.
///
/// State is reset only at construction; it is never resurrected after a
/// connection closes (a new connection gets a new `Framer`).
#[derive(Debug, Default)]
pub struct Framer {
    /// Bytes received but not yet folded into a response.
    incoming_buffer: BytesMut,
    /// The response currently being assembled, spanning literal boundaries.
    pending_command: Vec<u8>,
    /// Octets of an in-progress literal body still owed.
    literal_remaining: usize,
}

impl Framer {
    /// Creates a fresh framer with empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of inbound bytes, returning every complete response
    /// text it completes, in order.
    ///
    /// The framer itself cannot fail: malformed content surfaces later as a
    /// parser error once the dispatcher hands the framed text to the
    /// parser collaborator.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.incoming_buffer.extend_from_slice(chunk);

        let mut completed = Vec::new();
        loop {
            if self.literal_remaining > 0 {
                if self.incoming_buffer.len() < self.literal_remaining {
                    break;
                }
                let literal = self.incoming_buffer.split_to(self.literal_remaining);
                self.pending_command.extend_from_slice(&literal);
                self.literal_remaining = 0;
                continue;
            }

            let Some((terminator_start, terminator_len)) = find_terminator(&self.incoming_buffer)
            else {
                break;
            };

            if let Some(literal_len) = literal_length_before(&self.incoming_buffer, terminator_start) {
                let through_terminator = self
                    .incoming_buffer
                    .split_to(terminator_start + terminator_len);
                self.pending_command.extend_from_slice(&through_terminator);
                self.literal_remaining = literal_len;
                continue;
            }

            let line = self.incoming_buffer.split_to(terminator_start);
            self.pending_command.extend_from_slice(&line);
            let _ = self.incoming_buffer.split_to(terminator_len);
            completed.push(std::mem::take(&mut self.pending_command));
        }

        completed
    }
}

/// Finds the next line terminator (`\r\n` or bare `\n`), returning its
/// start offset and byte length (2 for CRLF, 1 for bare LF).
fn find_terminator(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            if i > 0 && buf[i - 1] == b'\r' {
                return Some((i - 1, 2));
            }
            return Some((i, 1));
        }
        i += 1;
    }
    None
}

/// Checks whether the bytes immediately before `terminator_start` in `buf`
/// form a literal declaration `{N}` or `{N+}`, returning `N` if so.
fn literal_length_before(buf: &[u8], terminator_start: usize) -> Option<usize> {
    let line = &buf[..terminator_start];
    if !line.ends_with(b"}") {
        return None;
    }
    let open = line.iter().rposition(|&b| b == b'{')?;
    let inner = &line[open + 1..line.len() - 1];
    let digits = inner.strip_suffix(b"+").unwrap_or(inner);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}
