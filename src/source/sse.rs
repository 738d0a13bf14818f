//! Minimal `text/event-stream` decoder for the realtime database stream.

/// Longest line accepted before the stream is treated as broken.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("event stream line exceeds {} bytes", MAX_LINE_BYTES)]
pub struct LineTooLong;

/// Incremental decoder. Feed it arbitrary byte chunks; it yields every event
/// completed by a blank line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    /// Prefix of `buf` already known to hold no newline.
    scanned: usize,
    event: String,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, LineTooLong> {
        self.buf.extend_from_slice(chunk);
        let buf = std::mem::take(&mut self.buf);
        let mut events = Vec::new();

        let mut line_start = 0;
        let mut from = self.scanned;
        while let Some(offset) = buf[from..].iter().position(|b| *b == b'\n') {
            let newline = from + offset;
            let line = match &buf[line_start..newline] {
                [rest @ .., b'\r'] => rest,
                line => line,
            };
            if let Some(event) = self.line(&String::from_utf8_lossy(line)) {
                events.push(event);
            }
            line_start = newline + 1;
            from = line_start;
        }

        self.buf = buf;
        self.buf.drain(..line_start);
        self.scanned = self.buf.len();
        if self.buf.len() > MAX_LINE_BYTES {
            self.buf.clear();
            self.scanned = 0;
            return Err(LineTooLong);
        }
        Ok(events)
    }

    fn line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = value.to_owned(),
            "data" => self.data.push(value.to_owned()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = std::mem::take(&mut self.event);
        let data = std::mem::take(&mut self.data);
        if event.is_empty() && data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: if event.is_empty() { "message".to_owned() } else { event },
            data: data.join("\n"),
        })
    }
}
