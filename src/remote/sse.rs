// SPDX-License-Identifier: GPL-3.0-only
//! Incremental decoder for `text/event-stream` bodies.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Buffers raw body chunks and yields complete events. Chunk boundaries may
/// fall anywhere, including inside a UTF-8 sequence or between `\r` and `\n`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id and retry are not used by the streaming REST protocol
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"event: put\ndata: {\"path\":\"/\",\"data\":null}\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "put");
        assert_eq!(events[0].data, r#"{"path":"/","data":null}"#);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: pa").is_empty());
        assert!(decoder.feed(b"tch\r\ndata: {\"a\"").is_empty());
        let events = decoder.feed(b":1}\r\n\r\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "patch");
        assert_eq!(events[0].data, r#"{"a":1}"#);
    }

    #[test]
    fn test_multiple_events_and_comments() {
        let mut decoder = SseDecoder::new();
        let body = b": hello\n\nevent: keep-alive\ndata: null\n\nevent: put\ndata: 1\n\n";
        let events = decoder.feed(body);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "keep-alive");
        assert_eq!(events[1].event, "put");
        assert_eq!(events[1].data, "1");
    }

    #[test]
    fn test_multiline_data_and_default_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: a\ndata: b\n\n");

        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "a\nb");
    }
}
