use tracing::debug;

/// Splits a chunked byte stream into newline-terminated lines.
///
/// Bytes after the last newline stay buffered until a later chunk terminates
/// them. Buffering happens before UTF-8 decoding, so a character split across
/// chunks decodes the same as an unsplit one.
#[derive(Debug, Default)]
pub struct EventLineDecoder {
    buf: Vec<u8>,
}

impl EventLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers `chunk` and returns every line it completes, in order.
    ///
    /// Returned lines carry neither the `\n` nor a trailing `\r`.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let Some(last_newline) = self.buf.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let tail = self.buf.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buf, tail);

        complete[..last_newline]
            .split(|b| *b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// Ends the stream, discarding any unterminated fragment.
    ///
    /// Returns how many bytes were dropped.
    pub fn close(&mut self) -> usize {
        let dropped = self.buf.len();
        if dropped > 0 {
            debug!(dropped, "discarding unterminated trailing fragment");
        }
        self.buf.clear();
        dropped
    }
}
