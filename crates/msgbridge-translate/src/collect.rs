use msgbridge_protocol::responses::response::Response;
use msgbridge_protocol::responses::stream::{ResponseStreamEvent, ResponseStreamEventKnown};
use msgbridge_protocol::sse::SseParser;

/// Collector behind the non-streaming path: the upstream only streams, so a
/// non-stream client is served by running the same SSE bytes through this
/// and keeping the terminal `response.completed` payload.
#[derive(Debug, Default)]
pub struct CompletedCollector {
    parser: SseParser,
    completed: Option<Response>,
}

impl CompletedCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        let Ok(text) = std::str::from_utf8(chunk) else {
            return;
        };
        for event in self.parser.push_str(text) {
            self.consume(&event.data);
        }
    }

    /// End of stream. A trailing blank line is pushed first in case the
    /// upstream never terminated its final event.
    pub fn finish(mut self) -> Option<Response> {
        for event in self.parser.push_str("\n\n") {
            self.consume(&event.data);
        }
        for event in self.parser.finish() {
            self.consume(&event.data);
        }
        self.completed
    }

    fn consume(&mut self, data: &str) {
        if data.is_empty() || data == "[DONE]" {
            return;
        }
        let Ok(event) = serde_json::from_str::<ResponseStreamEvent>(data) else {
            return;
        };
        if let ResponseStreamEvent::Known(ResponseStreamEventKnown::Completed(event)) = event {
            self.completed = Some(event.response);
        }
    }
}
