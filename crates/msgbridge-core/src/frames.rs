use bytes::Bytes;
use msgbridge_protocol::messages::error::{ErrorBody, ErrorDetail, ErrorEnvelopeType};
use msgbridge_protocol::messages::stream::StreamEvent;

/// Encode one client-facing stream event as an SSE frame:
/// `event: <name>` + `data: <compact json>` + blank line.
pub fn encode_event(event: &StreamEvent) -> Option<Bytes> {
    let payload = serde_json::to_vec(event).ok()?;
    let name = event.name();
    let mut frame = Vec::with_capacity(payload.len() + name.len() + 16);
    frame.extend_from_slice(b"event: ");
    frame.extend_from_slice(name.as_bytes());
    frame.extend_from_slice(b"\ndata: ");
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(b"\n\n");
    Some(Bytes::from(frame))
}

/// Encode an error as a terminal SSE frame.
pub fn encode_error_event(error: &ErrorDetail) -> Bytes {
    let event = StreamEvent::Error {
        error: error.clone(),
    };
    encode_event(&event).unwrap_or_else(|| Bytes::from_static(b"event: error\ndata: {}\n\n"))
}

/// Encode an error as a JSON response body.
pub fn encode_error_body(error: &ErrorDetail) -> Bytes {
    let body = ErrorBody {
        r#type: ErrorEnvelopeType::Error,
        error: error.clone(),
    };
    serde_json::to_vec(&body)
        .map(Bytes::from)
        .unwrap_or_else(|_| Bytes::from_static(b"{\"type\":\"error\"}"))
}
