//! Line splitting for the upstream's pushed-event body.
//!
//! The upstream writes one `data: {...}` event per line. Chunk boundaries from the HTTP body
//! fall anywhere, so partial lines are buffered until their `\n` arrives. Splitting happens on
//! raw bytes, which is safe for UTF-8 because `\n` never occurs inside a multi-byte sequence.

use bytes::BytesMut;
use futures_util::Stream;
use memchr::memchr;

const INITIAL_BUFFER: usize = 4096;

/// Incremental byte-to-line splitter.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: BytesMut,
    scan_from: usize,
}

impl LineSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER),
            scan_from: 0,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pop the next complete line, without its `\n` or `\r\n` terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let rel = memchr(b'\n', &self.buffer[self.scan_from..])?;
        let end = self.scan_from + rel;
        let raw = self.buffer.split_to(end + 1);
        self.scan_from = 0;
        Some(decode_line(&raw[..end]))
    }

    /// Drain whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = self.buffer.split();
        self.scan_from = 0;
        Some(decode_line(&raw))
    }

    fn mark_scanned(&mut self) {
        self.scan_from = self.buffer.len();
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_owned(),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

/// Turn an HTTP body byte stream into a stream of lines.
///
/// A transport error is yielded once and ends the stream. A trailing line without a
/// terminator is yielded when the body ends.
pub fn line_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, E>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (Box::pin(byte_stream), LineSplitter::new(), false),
        |(mut stream, mut splitter, mut ended)| async move {
            loop {
                if let Some(line) = splitter.next_line() {
                    return Some((Ok(line), (stream, splitter, ended)));
                }
                if ended {
                    return None;
                }
                splitter.mark_scanned();
                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => splitter.feed(&bytes),
                    Some(Err(err)) => {
                        ended = true;
                        return Some((Err(err), (stream, splitter, ended)));
                    }
                    None => {
                        ended = true;
                        if let Some(line) = splitter.finish() {
                            return Some((Ok(line), (stream, splitter, ended)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}
