use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime};

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::error::BridgeError;
use crate::scheduler::{AccountLease, UsageWindowSnapshot};
use crate::sink::RateLimitHint;

/// How long an error-body drain may take before we give up on the payload.
pub const ERROR_DRAIN_CAP: Duration = Duration::from_secs(5);

struct SharedClient {
    proxy: Option<String>,
    client: Arc<wreq::Client>,
}

static SHARED_CLIENT: OnceLock<SharedClient> = OnceLock::new();

/// Process-wide upstream client. A single egress proxy is supported; asking
/// for a different one after initialization is an error.
pub fn shared_client(proxy: Option<&str>) -> Result<Arc<wreq::Client>, BridgeError> {
    let proxy_owned = proxy.map(|value| value.to_string());
    if let Some(shared) = SHARED_CLIENT.get() {
        if shared.proxy != proxy_owned {
            return Err(BridgeError::Transport(
                "proxy mismatch: only a single global proxy is supported".to_string(),
            ));
        }
        return Ok(shared.client.clone());
    }

    let mut builder = wreq::Client::builder();
    if let Some(proxy_url) = proxy {
        let proxy = wreq::Proxy::all(proxy_url)
            .map_err(|err| BridgeError::Transport(err.to_string()))?;
        builder = builder.proxy(proxy);
    }
    let client = builder
        .build()
        .map_err(|err| BridgeError::Transport(err.to_string()))?;

    let _ = SHARED_CLIENT.set(SharedClient {
        proxy: proxy_owned,
        client: Arc::new(client),
    });
    Ok(SHARED_CLIENT
        .get()
        .expect("shared client must be set")
        .client
        .clone())
}

pub fn build_headers(lease: &AccountLease) -> Result<HeaderMap, BridgeError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    if let Some(token) = &lease.token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|err| BridgeError::Transport(err.to_string()))?;
        headers.insert(AUTHORIZATION, value);
    }
    for (name, value) in &lease.extra_headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    Ok(headers)
}

/// Send the upstream request with structured request/response logging. The
/// timeout bounds connect plus response headers; streaming bodies are read
/// afterwards by the caller.
pub async fn send_upstream(
    client: &wreq::Client,
    url: &str,
    headers: HeaderMap,
    body: &JsonValue,
    model: &str,
    timeout: Duration,
) -> Result<wreq::Response, BridgeError> {
    info!(
        event = "upstream_request",
        url = %url,
        model = %model,
        timeout_s = timeout.as_secs()
    );
    let started_at = Instant::now();
    let send = client.post(url).headers(headers).json(body).send();
    let response = match tokio::time::timeout(timeout, send).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            warn!(
                event = "upstream_response",
                status = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                error = %err
            );
            return Err(BridgeError::Transport(err.to_string()));
        }
        Err(_) => {
            warn!(
                event = "upstream_response",
                status = "timeout",
                elapsed_ms = started_at.elapsed().as_millis() as u64
            );
            return Err(BridgeError::Timeout(timeout.as_secs()));
        }
    };
    info!(
        event = "upstream_response",
        status = response.status().as_u16(),
        elapsed_ms = started_at.elapsed().as_millis() as u64
    );
    Ok(response)
}

/// Drain an error response body, bounded by [`ERROR_DRAIN_CAP`]. Returns an
/// empty buffer when the drain stalls or fails; error surfacing must not
/// hang on a misbehaving upstream.
pub async fn drain_error_body(response: wreq::Response) -> Vec<u8> {
    match tokio::time::timeout(ERROR_DRAIN_CAP, response.bytes()).await {
        Ok(Ok(bytes)) => bytes.to_vec(),
        Ok(Err(_)) | Err(_) => Vec::new(),
    }
}

/// Best-effort error message from an upstream error body.
pub fn error_message_from_body(body: &[u8], fallback: &str) -> String {
    serde_json::from_slice::<JsonValue>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(JsonValue::as_str)
                .map(|message| message.to_string())
        })
        .unwrap_or_else(|| fallback.to_string())
}

/// Rate-limit reset hint: the JSON body's `error.resets_in_seconds` wins,
/// then the `Retry-After` header (seconds or HTTP-date).
pub fn rate_limit_hint(body: &[u8], headers: &HeaderMap) -> RateLimitHint {
    let from_body = serde_json::from_slice::<JsonValue>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("resets_in_seconds"))
                .and_then(JsonValue::as_u64)
        });
    RateLimitHint {
        resets_after_seconds: from_body.or_else(|| retry_after_seconds(headers)),
    }
}

fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }
    let when = httpdate::parse_http_date(value).ok()?;
    when.duration_since(SystemTime::now())
        .ok()
        .map(|duration| duration.as_secs())
}

const USAGE_HEADERS: &[(&str, usize)] = &[
    ("x-codex-primary-used-percent", 0),
    ("x-codex-primary-reset-after-seconds", 1),
    ("x-codex-primary-window-minutes", 2),
    ("x-codex-secondary-used-percent", 3),
    ("x-codex-secondary-reset-after-seconds", 4),
    ("x-codex-secondary-window-minutes", 5),
    ("x-codex-primary-over-secondary-limit-percent", 6),
];

/// Parse the upstream's usage-window headers. Returns `None` when no
/// numeric usage header is present.
pub fn usage_snapshot_from_headers(headers: &HeaderMap) -> Option<UsageWindowSnapshot> {
    let mut snapshot = UsageWindowSnapshot::default();
    for (name, slot) in USAGE_HEADERS {
        let value = headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<f64>().ok());
        let Some(value) = value else { continue };
        match slot {
            0 => snapshot.primary_used_percent = Some(value),
            1 => snapshot.primary_reset_after_seconds = Some(value),
            2 => snapshot.primary_window_minutes = Some(value),
            3 => snapshot.secondary_used_percent = Some(value),
            4 => snapshot.secondary_reset_after_seconds = Some(value),
            5 => snapshot.secondary_window_minutes = Some(value),
            _ => snapshot.primary_over_secondary_limit_percent = Some(value),
        }
    }
    if snapshot.is_empty() {
        None
    } else {
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_usage_snapshot_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-codex-primary-used-percent",
            HeaderValue::from_static("33.5"),
        );
        headers.insert(
            "x-codex-secondary-window-minutes",
            HeaderValue::from_static("10080"),
        );
        headers.insert(
            "x-codex-primary-reset-after-seconds",
            HeaderValue::from_static("not-a-number"),
        );
        let snapshot = usage_snapshot_from_headers(&headers).expect("snapshot");
        assert_eq!(snapshot.primary_used_percent, Some(33.5));
        assert_eq!(snapshot.secondary_window_minutes, Some(10080.0));
        assert_eq!(snapshot.primary_reset_after_seconds, None);
    }

    #[test]
    fn no_usage_headers_means_no_snapshot() {
        assert!(usage_snapshot_from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn rate_limit_hint_prefers_body() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("60"));
        let hint = rate_limit_hint(
            br#"{"error":{"message":"slow down","resets_in_seconds":12}}"#,
            &headers,
        );
        assert_eq!(hint.resets_after_seconds, Some(12));

        let hint = rate_limit_hint(b"not json", &headers);
        assert_eq!(hint.resets_after_seconds, Some(60));

        let hint = rate_limit_hint(b"", &HeaderMap::new());
        assert_eq!(hint.resets_after_seconds, None);
    }

    #[test]
    fn error_message_extraction() {
        assert_eq!(
            error_message_from_body(br#"{"error":{"message":"slow down"}}"#, "fallback"),
            "slow down"
        );
        assert_eq!(error_message_from_body(b"\xff\xfe", "fallback"), "fallback");
    }
}
