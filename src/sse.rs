//! Server-Sent Events (SSE) frame decoding.
//!
//! The chat backend answers `POST /chat/stream` with frames separated by a
//! blank line:
//! ```text
//! event: chunk
//! data: {"delta": "Hel"}
//!
//! event: done
//! data: {"chatId": 42, "messageId": 7, "preview": "Hello"}
//!
//! data: [DONE]
//! ```
//!
//! Bytes arrive in arbitrary fragments, so decoding happens in two incremental
//! stages: [`Utf8Decoder`] turns bytes into text without splitting a code
//! point, and [`SseDecoder`] cuts that text into [`SseFrame`]s.

const FRAME_DELIMITER: &str = "\n\n";
const REPLACEMENT_CHARACTER: char = '\u{FFFD}';

/// One parsed `event:`/`data:` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` line, if the frame had one.
    pub event: Option<String>,
    /// Value of the last `data:` line in the frame.
    pub data: String,
}

/// Streaming UTF-8 decoder.
///
/// A multi-byte sequence cut by a chunk boundary is held back until the rest
/// of it arrives. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` (plus any carried-over bytes) as is complete.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let end = start + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..end]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT_CHARACTER);
                            start = end + len;
                        }
                        // Incomplete sequence at the tail: wait for more bytes.
                        None => {
                            start = end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Flush at end of input. A dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        REPLACEMENT_CHARACTER.to_string()
    }
}

/// Incremental SSE frame splitter.
///
/// # Example
/// ```
/// use lorechat::sse::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// assert!(decoder.push(b"event: chunk\ndata: {\"delta\"").is_empty());
///
/// let frames = decoder.push(b": \"Hi\"}\n\n");
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].event.as_deref(), Some("chunk"));
/// assert_eq!(frames[0].data, "{\"delta\": \"Hi\"}");
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8: Utf8Decoder,
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return every frame completed by them, in order.
    ///
    /// Frames without a `data:` line are skipped. The trailing partial frame
    /// stays buffered for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let text = self.utf8.decode(chunk);
        self.buffer.push_str(&text);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find(FRAME_DELIMITER) {
            if let Some(frame) = parse_frame(&self.buffer[..pos]) {
                frames.push(frame);
            }
            self.buffer.drain(..pos + FRAME_DELIMITER.len());
        }
        frames
    }

    /// Called once the byte stream has ended. Returns the unterminated
    /// trailing frame, if it carries data.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);

        let rest = std::mem::take(&mut self.buffer);
        parse_frame(&rest)
    }
}

/// Parse one frame's text into an [`SseFrame`].
///
/// Lines are trimmed. `event:` names the frame and `data:` carries the
/// payload; when either repeats, the last one wins. Anything else, including
/// `:` comments and `id:`/`retry:` fields, is ignored.
///
/// # Example
/// ```
/// use lorechat::sse::parse_frame;
///
/// let frame = parse_frame("event: done\ndata: {\"chatId\": 1}").unwrap();
/// assert_eq!(frame.event.as_deref(), Some("done"));
/// assert_eq!(frame.data, "{\"chatId\": 1}");
///
/// assert_eq!(parse_frame("event: ping"), None);
/// ```
pub fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data = None;

    for line in raw.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix("event:") {
            event = Some(name.trim().to_string());
        } else if let Some(payload) = line.strip_prefix("data:") {
            data = Some(payload.trim().to_string());
        }
    }

    data.map(|data| SseFrame { event, data })
}

/// Check if an SSE data payload is the end-of-stream sentinel.
///
/// # Example
/// ```
/// use lorechat::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(!is_done_marker("{\"delta\": \"[DONE]\"}"));
/// ```
pub fn is_done_marker(data: &str) -> bool {
    data == "[DONE]"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame {
            event: Some(event.to_string()),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_parse_frame() {
        assert_eq!(
            parse_frame("event: chunk\ndata: {\"delta\":\"a\"}"),
            Some(frame("chunk", "{\"delta\":\"a\"}"))
        );
        assert_eq!(
            parse_frame("  event:context  \r\n  data:{}  \r"),
            Some(frame("context", "{}"))
        );
        assert_eq!(parse_frame("data: [DONE]").map(|f| f.event), Some(None));
        assert_eq!(parse_frame(""), None);
        assert_eq!(parse_frame(": keep-alive"), None);
    }

    #[test]
    fn test_parse_frame_last_data_wins() {
        let parsed = parse_frame("event: chunk\ndata: first\ndata: second").unwrap();
        assert_eq!(parsed.data, "second");
    }

    #[test]
    fn test_is_done_marker() {
        assert!(is_done_marker("[DONE]"));
        assert!(!is_done_marker(""));
        assert!(!is_done_marker("DONE"));
    }

    #[test]
    fn test_utf8_decoder_holds_partial_sequence() {
        let bytes = "é😀".as_bytes();
        let mut decoder = Utf8Decoder::new();

        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.decode(&bytes[1..3]), "é");
        assert_eq!(decoder.decode(&bytes[3..5]), "");
        assert_eq!(decoder.decode(&bytes[5..]), "😀");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_utf8_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xFFb"), "a\u{FFFD}b");

        assert_eq!(decoder.decode(b"c\xE2\x82"), "c");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_decoder_keeps_partial_frame() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event: chunk\ndata: 1\n\nevent: chunk\ndata: 2\n");
        assert_eq!(frames, vec![frame("chunk", "1")]);

        let frames = decoder.push(b"\nevent: chunk\ndata: 3\n\n");
        assert_eq!(frames, vec![frame("chunk", "2"), frame("chunk", "3")]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_finish_flushes_trailing_frame() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: done\ndata: {}").is_empty());
        assert_eq!(decoder.finish(), Some(frame("done", "{}")));
    }

    #[test]
    fn test_decoder_skips_frames_without_data() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event: ping\n\n: comment\n\nevent: chunk\ndata: x\n\n");
        assert_eq!(frames, vec![frame("chunk", "x")]);
    }

    #[test]
    fn test_every_split_point_yields_same_frames() {
        let payload = "event: chunk\ndata: {\"delta\":\"héllo \u{1F600}\"}\n\n\
                       event: context\ndata: {\"lore\":[\"日本\"]}\n\n\
                       data: [DONE]\n\n";
        let bytes = payload.as_bytes();

        let mut whole = SseDecoder::new();
        let expected = whole.push(bytes);
        assert_eq!(expected.len(), 3);

        for split in 0..=bytes.len() {
            let mut decoder = SseDecoder::new();
            let mut frames = decoder.push(&bytes[..split]);
            frames.extend(decoder.push(&bytes[split..]));
            assert_eq!(frames, expected, "split at byte {split}");
            assert_eq!(decoder.finish(), None);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let payload = "event: chunk\ndata: {\"delta\":\"ü\"}\n\n";
        let mut decoder = SseDecoder::new();
        let frames: Vec<_> = payload
            .as_bytes()
            .iter()
            .flat_map(|b| decoder.push(std::slice::from_ref(b)))
            .collect();
        assert_eq!(frames, vec![frame("chunk", "{\"delta\":\"ü\"}")]);
    }
}
