//! Incremental `text/event-stream` decoding.

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub event: Option<String>,
    /// Every `data:` line of the frame, joined with `\n`.
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl Frame {
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        self.event.as_deref()
    }
}

#[derive(Debug, Default)]
struct PendingFrame {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    retry: Option<u64>,
}

impl PendingFrame {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.data.is_empty() && self.id.is_none() && self.retry.is_none()
    }

    fn take(&mut self) -> Option<Frame> {
        let pending = std::mem::take(self);
        if pending.event.is_none() && pending.data.is_empty() {
            return None;
        }
        Some(Frame {
            event: pending.event,
            data: pending.data.join("\n"),
            id: pending.id,
            retry: pending.retry,
        })
    }
}

/// Turns network chunks into frames. Lines and frames may be split anywhere,
/// including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    pending: PendingFrame,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk, returning every frame it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|byte| *byte == b'\n') {
            let end = start + offset;
            let line = self.buffer[start..end]
                .strip_suffix(b"\r")
                .unwrap_or(&self.buffer[start..end]);
            let line = String::from_utf8_lossy(line).into_owned();
            start = end + 1;

            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        self.buffer.drain(..start);
        frames
    }

    /// True when a partial line or frame is buffered.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || !self.pending.is_empty()
    }

    fn process_line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            return self.pending.take();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => self.pending.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.pending.id = Some(value.to_string()),
            "retry" => {
                if let Ok(retry) = value.parse() {
                    self.pending.retry = Some(retry);
                }
            }
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<Frame> {
        let mut decoder = FrameDecoder::new();
        chunks.iter().flat_map(|chunk| decoder.push(chunk)).collect()
    }

    #[test]
    fn named_event_with_data() {
        let frames = decode_all(&[b"event: chat_message\ndata: {\"id\":1}\nid: 7\n\n"]);

        assert_eq!(
            frames,
            vec![Frame {
                event: Some("chat_message".into()),
                data: "{\"id\":1}".into(),
                id: Some("7".into()),
                retry: None,
            }]
        );
    }

    #[test]
    fn multi_line_data_is_joined() {
        let frames = decode_all(&[b"data: first\ndata: second\n\n"]);
        assert_eq!(frames[0].data, "first\nsecond");
    }

    #[test]
    fn crlf_and_comments() {
        let frames = decode_all(&[b": heartbeat\r\nevent: ping\r\ndata: keep-alive\r\n\r\n"]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_name(), Some("ping"));
        assert_eq!(frames[0].data, "keep-alive");
    }

    #[test]
    fn frames_split_across_chunks() {
        let mut decoder = FrameDecoder::new();

        assert!(decoder.push(b"event: leader").is_empty());
        assert!(decoder.push(b"board_update\nda").is_empty());
        assert!(decoder.has_pending());
        let frames = decoder.push(b"ta: {}\n\nevent: a\ndata: 1\n\n");

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event_name(), Some("leaderboard_update"));
        assert_eq!(frames[1].data, "1");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn multi_byte_character_split_across_chunks() {
        let text = "data: đấu giá\n\n".as_bytes();
        let (head, tail) = text.split_at(9);

        let frames = decode_all(&[head, tail]);
        assert_eq!(frames[0].data, "đấu giá");
    }

    #[test]
    fn blank_lines_without_fields_dispatch_nothing() {
        assert!(decode_all(&[b"\n\n: only a comment\n\n"]).is_empty());
    }

    #[test]
    fn value_keeps_all_but_first_space_and_colons() {
        let frames = decode_all(&[b"data:  two spaces: and a colon\nretry: 3000\n\n"]);

        assert_eq!(frames[0].data, " two spaces: and a colon");
        assert_eq!(frames[0].retry, Some(3000));
    }
}
