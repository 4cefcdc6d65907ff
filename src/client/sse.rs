//! Incremental Server-Sent Events frame decoder.
//!
//! Frames are separated by a blank line. Chunks may split a frame (or a
//! UTF-8 sequence) anywhere, so bytes are buffered until a separator shows
//! up. Carriage returns are dropped on the way in.

/// One decoded SSE block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Event {
        id: Option<String>,
        event: Option<String>,
        data: String,
    },
    /// A block holding only comment lines, such as `: ping`.
    Comment(String),
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend(chunk.iter().filter(|&&b| b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = find_separator(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&block[..end]);
            if let Some(frame) = parse_block(&text) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Bytes held back waiting for a separator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_separator(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut id = None;
    let mut event = None;
    let mut data: Option<String> = None;
    let mut comment = None;

    for line in block.lines() {
        if let Some(text) = line.strip_prefix(':') {
            comment.get_or_insert_with(|| strip_space(text).to_string());
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, strip_space(value)),
            None => (line, ""),
        };
        match field {
            "id" => id = Some(value.to_string()),
            "event" => event = Some(value.to_string()),
            "data" => match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            _ => {}
        }
    }

    match (data, event) {
        (Some(data), event) => Some(SseFrame::Event { id, event, data }),
        (None, Some(event)) => Some(SseFrame::Event {
            id,
            event: Some(event),
            data: String::new(),
        }),
        (None, None) => comment.map(SseFrame::Comment),
    }
}

fn strip_space(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_notification_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"id: 7\nevent: notification\ndata: {\"id\":7}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame::Event {
                id: Some("7".into()),
                event: Some("notification".into()),
                data: "{\"id\":7}".into(),
            }]
        );
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_heartbeat_comment() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(
            decoder.push(b": ping\n\n"),
            vec![SseFrame::Comment("ping".into())]
        );
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"id: 1\nevent: notif").is_empty());
        assert!(decoder.push(b"ication\ndata: x\n").is_empty());
        let frames = decoder.push(b"\n: ping\n\nid: 2");
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], SseFrame::Event { data, .. } if data == "x"));
        assert_eq!(frames[1], SseFrame::Comment("ping".into()));
        assert_eq!(decoder.pending(), "id: 2".len());
    }

    #[test]
    fn test_multibyte_split_is_reassembled() {
        let frame = "data: café\n\n".as_bytes();
        let split = frame.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&frame[..split]).is_empty());
        let frames = decoder.push(&frame[split..]);
        assert!(matches!(&frames[0], SseFrame::Event { data, .. } if data == "café"));
    }

    #[test]
    fn test_crlf_and_multiline_data() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"data: a\r\ndata: b\r\n\r\n");
        assert!(matches!(&frames[0], SseFrame::Event { data, .. } if data == "a\nb"));
    }
}
