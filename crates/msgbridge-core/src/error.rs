use bytes::Bytes;
use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("scheduler: {0}")]
    Scheduler(String),
    #[error("upstream transport: {0}")]
    Transport(String),
    #[error("upstream timeout after {0}s")]
    Timeout(u64),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Error carried back to the HTTP layer when no response has been started
/// yet: a status plus a ready-to-send body.
#[derive(Debug)]
pub struct RouteError {
    pub status: StatusCode,
    pub body: Bytes,
}

impl RouteError {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn bad_request(message: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

/// Strip credential material from a message before it reaches a client.
/// Known secrets are replaced outright; bearer-style fragments are masked.
pub fn sanitize_secrets(message: &str, secrets: &[&str]) -> String {
    let mut out = message.to_string();
    for secret in secrets {
        if secret.len() >= 8 {
            out = out.replace(secret, "[redacted]");
        }
    }
    mask_bearer(&out)
}

fn mask_bearer(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(pos) = find_bearer(rest) {
        let token_start = pos + "Bearer ".len();
        out.push_str(&rest[..token_start]);
        let tail = &rest[token_start..];
        let token_len = tail
            .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
            .unwrap_or(tail.len());
        if token_len > 0 {
            out.push_str("[redacted]");
        }
        rest = &tail[token_len..];
    }
    out.push_str(rest);
    out
}

fn find_bearer(message: &str) -> Option<usize> {
    let lower = message.to_ascii_lowercase();
    lower.find("bearer ")
}
