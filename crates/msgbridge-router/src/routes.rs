use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use msgbridge_core::{ApiKeyMeta, BridgeEngine, EngineResponse, InboundRequest, RouteError};
use msgbridge_protocol::messages::request::MessagesRequestBody;

const SSE_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const SSE_HEARTBEAT_FRAME: &[u8] = b": keep-alive\n\n";

#[derive(Clone)]
pub struct RouterState {
    pub engine: Arc<BridgeEngine>,
}

pub fn bridge_router(engine: Arc<BridgeEngine>) -> Router {
    Router::new()
        .route("/v1/messages", post(messages))
        .with_state(RouterState { engine })
}

async fn messages(
    State(state): State<RouterState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(err) => return route_error(err),
    };
    let stream_requested = body.stream.unwrap_or(false);

    let request = InboundRequest {
        body,
        api_key: api_key_meta(&headers),
        user_agent: header_value(&headers, header::USER_AGENT.as_str()),
    };
    debug!(event = "downstream_request", stream = stream_requested);

    match state.engine.handle(request).await {
        EngineResponse::Json { status, body } => json_response(status, body),
        EngineResponse::Stream { status, body } => sse_response(status, body),
    }
}

fn parse_body(body: &[u8]) -> Result<MessagesRequestBody, RouteError> {
    if body.is_empty() {
        return Err(RouteError::bad_request(
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"missing body"}}"#,
        ));
    }
    serde_json::from_slice(body).map_err(|err| {
        let message = format!("invalid json: {err}");
        let body = serde_json::json!({
            "type": "error",
            "error": { "type": "invalid_request_error", "message": message }
        });
        RouteError::bad_request(body.to_string())
    })
}

/// Client authentication happens in front of this service; the key identity
/// arrives pre-validated in headers.
fn api_key_meta(headers: &HeaderMap) -> ApiKeyMeta {
    ApiKeyMeta {
        id: header_value(headers, "x-api-key-id").unwrap_or_else(|| "anonymous".to_string()),
        name: header_value(headers, "x-api-key-name"),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

fn json_response(status: StatusCode, body: Bytes) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

fn sse_response(status: StatusCode, rx: tokio::sync::mpsc::Receiver<Bytes>) -> Response {
    let rx = wrap_with_heartbeat(rx);
    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    // Hint reverse proxies to pass frames through unbuffered.
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Interleave `: keep-alive` comment frames into quiet streams so proxies
/// and clients keep the connection open. Frames are forwarded whole; a
/// heartbeat can never split an event.
fn wrap_with_heartbeat(
    mut upstream_rx: tokio::sync::mpsc::Receiver<Bytes>,
) -> tokio::sync::mpsc::Receiver<Bytes> {
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(32);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SSE_HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the immediate tick; the first heartbeat waits a full interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                maybe_chunk = upstream_rx.recv() => {
                    let Some(chunk) = maybe_chunk else {
                        break;
                    };
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if tx.send(Bytes::from_static(SSE_HEARTBEAT_FRAME)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

fn route_error(err: RouteError) -> Response {
    json_response(err.status, err.body)
}
