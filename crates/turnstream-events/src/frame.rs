//! Line framing for `data: ` event streams.

/// Literal prefix marking a payload line.
pub const DATA_PREFIX: &str = "data: ";

/// Incremental splitter from arbitrary byte chunks to raw payload strings.
///
/// The carry-over is kept as bytes: a chunk may end in the middle of a
/// UTF-8 sequence, and text is only decoded once a whole line is present.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    carry: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and drain the payloads of every line it completes.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Vec<String> {
        self.carry.extend_from_slice(chunk.as_ref());

        let Some(last_newline) = self.carry.iter().rposition(|byte| *byte == b'\n') else {
            return Vec::new();
        };

        let rest = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, rest);

        complete
            .split(|byte| *byte == b'\n')
            .filter_map(extract_payload)
            .collect()
    }

    /// Flush a final unterminated line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.carry);
        extract_payload(&tail)
    }

    /// Whether unterminated bytes are waiting for the rest of their line.
    pub fn has_pending(&self) -> bool {
        !self.carry.is_empty()
    }

    /// Decode a complete buffer in one shot, including an unterminated tail.
    pub fn split_all(input: impl AsRef<[u8]>) -> Vec<String> {
        let mut decoder = Self::default();
        let mut payloads = decoder.feed(input);
        payloads.extend(decoder.finish());
        payloads
    }
}

fn extract_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let payload = line.trim().strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "data: {\"type\":\"text\",\"content\":\"héllo ✓\"}\n";

    #[test]
    fn every_split_point_yields_the_same_payload() {
        let bytes = LINE.as_bytes();
        let expected = FrameDecoder::split_all(bytes);
        assert_eq!(expected, vec!["{\"type\":\"text\",\"content\":\"héllo ✓\"}"]);

        for offset in 0..=bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut payloads = decoder.feed(&bytes[..offset]);
            payloads.extend(decoder.feed(&bytes[offset..]));
            assert_eq!(payloads, expected, "split at byte {offset}");
            assert!(!decoder.has_pending());
        }
    }

    #[test]
    fn byte_at_a_time_feeding_matches() {
        let stream = format!("\n\n{LINE}: keepalive\n\n{LINE}");
        let mut decoder = FrameDecoder::new();
        let mut payloads = Vec::new();
        for byte in stream.as_bytes() {
            payloads.extend(decoder.feed([*byte]));
        }
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0], payloads[1]);
    }

    #[test]
    fn non_payload_lines_are_discarded() {
        let input = concat!(
            "event: message\n",
            "id: 7\n",
            "\n",
            "data:\n",
            "data:    \n",
            "data:{\"type\":\"text\"}\n",
            "   data: {\"type\":\"thinking\",\"content\":\"x\"}   \r\n",
        );
        let payloads = FrameDecoder::split_all(input);
        assert_eq!(payloads, vec!["{\"type\":\"thinking\",\"content\":\"x\"}"]);
    }

    #[test]
    fn partial_line_waits_for_terminator() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed("data: {\"type\":\"text\",").is_empty());
        assert!(decoder.has_pending());
        let payloads = decoder.feed("\"content\":\"a\"}\ndata: {\"ty");
        assert_eq!(payloads, vec!["{\"type\":\"text\",\"content\":\"a\"}"]);
        assert!(decoder.has_pending());
    }

    #[test]
    fn finish_flushes_unterminated_tail() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed("data: {\"type\":\"answer\"}").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("{\"type\":\"answer\"}"));
        assert!(decoder.finish().is_none());
    }
}
