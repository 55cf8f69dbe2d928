//! Server-sent-events line framing.
//!
//! Both provider adapters read chunked SSE bodies. Chunks split lines at
//! arbitrary byte boundaries, so a small buffer reassembles complete lines
//! and strips the `data: ` prefix. Comments and `event:` lines are dropped —
//! every payload we care about carries its own `type` field.

/// Reassembles SSE `data:` payloads from a chunked byte stream.
#[derive(Debug, Default)]
pub struct SseFramer {
    buffer: String,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the complete `data:` payloads it finished.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut payloads = Vec::new();
        while let Some(line_end) = self.buffer.find('\n') {
            let line = self.buffer[..line_end].trim_end_matches('\r').to_string();
            self.buffer.drain(..=line_end);

            if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
                continue;
            }
            if let Some(data) = line.strip_prefix("data: ") {
                let data = data.trim();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_split_lines() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: {\"a\":").is_empty());
        let lines = framer.push(b"1}\n\ndata: {\"b\":2}\n");
        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn skips_comments_and_event_lines() {
        let mut framer = SseFramer::new();
        let lines = framer.push(b": keepalive\nevent: message_start\ndata: {}\n");
        assert_eq!(lines, vec!["{}"]);
    }

    #[test]
    fn handles_crlf() {
        let mut framer = SseFramer::new();
        let lines = framer.push(b"data: [DONE]\r\n");
        assert_eq!(lines, vec!["[DONE]"]);
    }
}
