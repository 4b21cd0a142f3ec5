use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKindKnown {
    /// 400
    #[serde(rename = "invalid_request_error")]
    InvalidRequestError,
    /// 401 / 402
    #[serde(rename = "authentication_error")]
    AuthenticationError,
    /// 429
    #[serde(rename = "rate_limit_error")]
    RateLimitError,
    /// 5xx
    #[serde(rename = "api_error")]
    ApiError,
    /// 529
    #[serde(rename = "overloaded_error")]
    OverloadedError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorKind {
    Known(ErrorKindKnown),
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub r#type: ErrorKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKindKnown, message: impl Into<String>) -> Self {
        Self {
            r#type: ErrorKind::Known(kind),
            message: message.into(),
        }
    }
}

/// Error envelope returned as a JSON body (non-stream) or as the payload of
/// an SSE `error` event (stream).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub r#type: ErrorEnvelopeType,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorEnvelopeType {
    #[serde(rename = "error")]
    Error,
}

impl ErrorBody {
    pub fn new(kind: ErrorKindKnown, message: impl Into<String>) -> Self {
        Self {
            r#type: ErrorEnvelopeType::Error,
            error: ErrorDetail::new(kind, message),
        }
    }
}
