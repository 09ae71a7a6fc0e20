//! Incremental server-sent-events decoder.
//!
//! Bytes arrive in arbitrary chunks. The decoder buffers partial lines and
//! emits a frame at every blank line that follows at least one field.

use crate::error::EventError;

/// Event name used when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
}

impl SseFrame {
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or(DEFAULT_EVENT)
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    has_fields: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, EventError> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8(line)
                .map_err(|e| EventError::MalformedFrame(format!("non-utf8 line: {e}")))?;

            if line.is_empty() {
                if let Some(frame) = self.dispatch() {
                    frames.push(frame);
                }
                continue;
            }
            self.field(&line);
        }

        Ok(frames)
    }

    fn field(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            // retry and unknown fields carry nothing the client uses
            _ => return,
        }
        self.has_fields = true;
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if !std::mem::take(&mut self.has_fields) {
            return None;
        }
        Some(SseFrame {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.take(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut decoder = SseDecoder::new();
        let frames = decoder
            .push(b"id:1\nevent:connected\ndata:SSE ok\n\n")
            .unwrap();
        assert_eq!(
            frames,
            vec![SseFrame {
                event: Some("connected".into()),
                data: "SSE ok".into(),
                id: Some("1".into()),
            }]
        );
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: raid-cre").unwrap().is_empty());
        assert!(decoder.push(b"ated\r\ndata: {\"name\":").unwrap().is_empty());
        let frames = decoder.push(b"\"R1\"}\r\n\r\n").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_name(), "raid-created");
        assert_eq!(frames[0].data, "{\"name\":\"R1\"}");
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder
            .push(b": keep-alive\n\ndata: a\ndata: b\n\nevent: heartbeat\n\n")
            .unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event_name(), DEFAULT_EVENT);
        assert_eq!(frames[0].data, "a\nb");
        assert_eq!(frames[1].event_name(), "heartbeat");
        assert_eq!(frames[1].data, "");
    }

    proptest::proptest! {
        #[test]
        fn prop_chunking_does_not_change_frames(cuts in proptest::collection::vec(0usize..64, 0..8)) {
            let body = b"event: connected\ndata: ok\n\nevent: schedule-created\ndata: {}\r\n\r\n: ping\n\n";
            let expected = SseDecoder::new().push(body).unwrap();

            let mut points: Vec<usize> = cuts.into_iter().map(|c| c % body.len()).collect();
            points.sort_unstable();
            let mut decoder = SseDecoder::new();
            let mut frames = Vec::new();
            let mut start = 0;
            for point in points.into_iter().chain(std::iter::once(body.len())) {
                frames.extend(decoder.push(&body[start..point]).unwrap());
                start = point;
            }
            proptest::prop_assert_eq!(frames, expected);
        }
    }

    #[test]
    fn test_multibyte_split() {
        let body = "event: lastUpdated\ndata: 혀니\n\n".as_bytes();
        let split = body.len() - 4;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&body[..split]).unwrap().is_empty());
        let frames = decoder.push(&body[split..]).unwrap();
        assert_eq!(frames[0].data, "혀니");
    }
}
