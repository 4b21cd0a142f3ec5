use bytes::Bytes;

/// One parsed server-sent event: optional `event:` name plus joined `data:`
/// lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE parser. Feed chunks as they arrive; complete events come
/// back as soon as their terminating blank line is seen. Call [`finish`]
/// (or push a trailing blank line) at end of stream to flush an
/// unterminated event.
///
/// [`finish`]: SseParser::finish
#[derive(Debug, Default)]
pub struct SseParser {
    pending: String,
    event_name: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &Bytes) -> Vec<SseEvent> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.push_str(text),
            // Non-UTF8 chunks cannot carry SSE fields; skip them.
            Err(_) => Vec::new(),
        }
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.pending.push_str(chunk);
        let mut out = Vec::new();

        while let Some(newline) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=newline).collect();
            let line = trim_line_ending(&line);
            if line.is_empty() {
                self.flush_event(&mut out);
            } else {
                self.consume_line(line);
            }
        }

        out
    }

    /// Flush whatever is buffered, treating end-of-input as the event
    /// terminator. Upstreams occasionally drop the final blank line.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            let tail = trim_line_ending(&tail);
            if !tail.is_empty() {
                self.consume_line(tail);
            }
        }
        let mut out = Vec::new();
        self.flush_event(&mut out);
        out
    }

    fn consume_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => {
                self.event_name = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "data" => self.data_lines.push(value.to_string()),
            _ => {}
        }
    }

    fn flush_event(&mut self, out: &mut Vec<SseEvent>) {
        if self.event_name.is_none() && self.data_lines.is_empty() {
            return;
        }
        out.push(SseEvent {
            event: self.event_name.take(),
            data: self.data_lines.join("\n"),
        });
        self.data_lines.clear();
    }
}

fn trim_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
