use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use http::StatusCode;
use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use msgbridge_protocol::messages::error::{ErrorDetail, ErrorKindKnown};
use msgbridge_protocol::messages::request::MessagesRequestBody;
use msgbridge_protocol::messages::response::Usage;
use msgbridge_protocol::responses::stream::{ResponseStreamEvent, ResponseStreamEventKnown};
use msgbridge_protocol::sse::SseParser;
use msgbridge_translate::adapter::{adapt, AdapterConfig};
use msgbridge_translate::collect::CompletedCollector;
use msgbridge_translate::request::{translate_request, TranslatedRequest};
use msgbridge_translate::response::{translate_response, usage_from_response};
use msgbridge_translate::stream::StreamConverter;
use msgbridge_translate::DEFAULT_MODEL_ALIAS;

use crate::error::{sanitize_secrets, BridgeError};
use crate::frames::{encode_error_body, encode_error_event, encode_event};
use crate::identity::{is_cli_user_agent, split_vendor_model};
use crate::scheduler::{AccountLease, AccountScheduler, AccountType, ApiKeyMeta};
use crate::session::SessionHasher;
use crate::sink::{MetricsSink, UsageTally};
use crate::upstream::{
    build_headers, drain_error_body, error_message_from_body, rate_limit_hint, send_upstream,
    shared_client, usage_snapshot_from_headers,
};

const DEFAULT_UPSTREAM_URL: &str = "https://chatgpt.com/backend-api/codex/responses";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const STREAM_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub upstream_url: String,
    pub request_timeout: Duration,
    pub model_alias: String,
    pub adapter: AdapterConfig,
    /// Server instruction text used when the adapter config carries none.
    pub default_instructions: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            model_alias: DEFAULT_MODEL_ALIAS.to_string(),
            adapter: AdapterConfig::default(),
            default_instructions: None,
        }
    }
}

/// One pre-authenticated client call.
#[derive(Debug)]
pub struct InboundRequest {
    pub body: MessagesRequestBody,
    pub api_key: ApiKeyMeta,
    pub user_agent: Option<String>,
}

/// What goes back to the HTTP layer. Stream bodies are channel-backed; the
/// pump task stops as soon as the receiver is dropped, which is how client
/// disconnects cancel upstream I/O.
pub enum EngineResponse {
    Stream {
        status: StatusCode,
        body: mpsc::Receiver<Bytes>,
    },
    Json {
        status: StatusCode,
        body: Bytes,
    },
}

pub struct BridgeEngine {
    scheduler: Arc<dyn AccountScheduler>,
    sink: Arc<dyn MetricsSink>,
    hasher: Arc<dyn SessionHasher>,
    config: EngineConfig,
}

impl BridgeEngine {
    pub fn new(
        scheduler: Arc<dyn AccountScheduler>,
        sink: Arc<dyn MetricsSink>,
        hasher: Arc<dyn SessionHasher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            scheduler,
            sink,
            hasher,
            config,
        }
    }

    /// Run one request end to end. Failures come back in the framing the
    /// client asked for; this never panics the connection task.
    pub async fn handle(&self, request: InboundRequest) -> EngineResponse {
        let stream_requested = request.body.stream.unwrap_or(false);
        let mut body = request.body;

        // Vendor routing prefix: `<vendor>,<base-model>`. The translator
        // only ever sees the base model.
        if let Some((_, base_model)) = split_vendor_model(&body.model) {
            body.model = base_model.to_string();
        }

        let is_cli = is_cli_user_agent(request.user_agent.as_deref());
        let session_hash = self.hasher.session_hash(&request.api_key.id, &body);
        let translated = translate_request(&body);

        let lease = match self
            .scheduler
            .select_account(&request.api_key, &session_hash, &translated.model)
            .await
        {
            Ok(lease) => lease,
            Err(err) => {
                return self.error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorDetail::new(ErrorKindKnown::ApiError, err.to_string()),
                    stream_requested,
                );
            }
        };

        let outbound = match self.prepare_outbound(&translated, &lease, is_cli) {
            Ok(outbound) => outbound,
            Err(err) => {
                return self.error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetail::new(ErrorKindKnown::ApiError, err.to_string()),
                    stream_requested,
                );
            }
        };

        let response = match self.open_upstream(&outbound, &translated.model, &lease).await {
            Ok(response) => response,
            Err(err) => {
                let secrets: Vec<&str> = lease.token.as_deref().into_iter().collect();
                let message = sanitize_secrets(&err.to_string(), &secrets);
                return self.error_response(
                    StatusCode::BAD_GATEWAY,
                    ErrorDetail::new(ErrorKindKnown::ApiError, message),
                    stream_requested,
                );
            }
        };

        if let Some(snapshot) = usage_snapshot_from_headers(response.headers()) {
            self.scheduler
                .record_usage_snapshot(&lease.account_id, snapshot)
                .await;
        }

        let status = response.status();
        if status.is_success() {
            if stream_requested {
                self.stream_response(response, translated, lease, request.api_key)
            } else {
                self.collect_response(response, translated, lease, request.api_key)
                    .await
            }
        } else {
            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    self.rate_limited(
                        response,
                        &lease,
                        &session_hash,
                        &translated.model,
                        &request.api_key,
                        stream_requested,
                    )
                    .await
                }
                StatusCode::UNAUTHORIZED | StatusCode::PAYMENT_REQUIRED => {
                    self.unauthorized(response, &lease, &session_hash, stream_requested)
                        .await
                }
                other => self.upstream_failure(response, other, stream_requested).await,
            }
        }
    }

    /// Adapt the translated body and pin the upstream-only fields: the
    /// upstream is stream-only, and OAuth accounts must not persist turns.
    fn prepare_outbound(
        &self,
        translated: &TranslatedRequest,
        lease: &AccountLease,
        is_cli: bool,
    ) -> Result<JsonValue, BridgeError> {
        let outbound = serde_json::to_value(&translated.body)
            .map_err(|err| BridgeError::InvalidRequest(err.to_string()))?;

        let outcome = adapt(
            &outbound,
            is_cli,
            &self.config.adapter,
            self.config.default_instructions.as_deref(),
        );
        if outcome.applied {
            debug!(
                event = "request_adapted",
                stripped = outcome.changes.stripped_fields.len(),
                instructions = outcome.changes.instructions.is_some()
            );
        }

        let mut outbound = outcome.body;
        if let Some(map) = outbound.as_object_mut() {
            map.insert("stream".to_string(), json!(true));
            if lease.account_type == AccountType::OAuth {
                map.insert("store".to_string(), json!(false));
            }
        }
        Ok(outbound)
    }

    async fn open_upstream(
        &self,
        outbound: &JsonValue,
        model: &str,
        lease: &AccountLease,
    ) -> Result<wreq::Response, BridgeError> {
        let client = shared_client(lease.proxy.as_deref())?;
        let headers = build_headers(lease)?;
        send_upstream(
            &client,
            &self.config.upstream_url,
            headers,
            outbound,
            model,
            self.config.request_timeout,
        )
        .await
    }

    fn stream_response(
        &self,
        response: wreq::Response,
        translated: TranslatedRequest,
        lease: AccountLease,
        api_key: ApiKeyMeta,
    ) -> EngineResponse {
        let (tx, rx) = mpsc::channel::<Bytes>(STREAM_CHANNEL_CAPACITY);
        let mut converter = StreamConverter::new(translated.tool_ids, self.config.model_alias.clone());
        let scheduler = self.scheduler.clone();
        let sink = self.sink.clone();
        let model = translated.model;

        tokio::spawn(async move {
            let mut parser = SseParser::new();
            let mut stream = response.bytes_stream();
            let mut final_usage: Option<Usage> = None;

            'pump: loop {
                let events = match stream.next().await {
                    Some(Ok(chunk)) => parser.push_bytes(&chunk),
                    Some(Err(err)) => {
                        let detail = ErrorDetail::new(
                            ErrorKindKnown::ApiError,
                            format!("upstream read failed: {err}"),
                        );
                        let _ = tx.send(encode_error_event(&detail)).await;
                        break 'pump;
                    }
                    None => break 'pump,
                };
                for event in events {
                    if !forward_event(&event.data, &mut converter, &tx, &mut final_usage).await {
                        break 'pump;
                    }
                }
            }
            for event in parser.finish() {
                if !forward_event(&event.data, &mut converter, &tx, &mut final_usage).await {
                    break;
                }
            }

            if let Some(usage) = final_usage {
                settle_usage(&scheduler, &sink, &lease, &api_key, &model, usage).await;
            }
        });

        EngineResponse::Stream {
            status: StatusCode::OK,
            body: rx,
        }
    }

    async fn collect_response(
        &self,
        response: wreq::Response,
        translated: TranslatedRequest,
        lease: AccountLease,
        api_key: ApiKeyMeta,
    ) -> EngineResponse {
        let mut collector = CompletedCollector::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => collector.push_chunk(&chunk),
                Err(err) => {
                    return self.error_response(
                        StatusCode::BAD_GATEWAY,
                        ErrorDetail::new(
                            ErrorKindKnown::ApiError,
                            format!("upstream read failed: {err}"),
                        ),
                        false,
                    );
                }
            }
        }

        let Some(completed) = collector.finish() else {
            return self.error_response(
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new(
                    ErrorKindKnown::ApiError,
                    "stream ended without response.completed",
                ),
                false,
            );
        };

        let message =
            translate_response(&completed, &translated.tool_ids, &self.config.model_alias);
        settle_usage(
            &self.scheduler,
            &self.sink,
            &lease,
            &api_key,
            &translated.model,
            message.usage,
        )
        .await;

        match serde_json::to_vec(&message) {
            Ok(body) => EngineResponse::Json {
                status: StatusCode::OK,
                body: Bytes::from(body),
            },
            Err(err) => self.error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(ErrorKindKnown::ApiError, err.to_string()),
                false,
            ),
        }
    }

    async fn rate_limited(
        &self,
        response: wreq::Response,
        lease: &AccountLease,
        session_hash: &str,
        model: &str,
        api_key: &ApiKeyMeta,
        stream_requested: bool,
    ) -> EngineResponse {
        let headers = response.headers().clone();
        let body = drain_error_body(response).await;
        let message = error_message_from_body(&body, "rate limited");
        let hint = rate_limit_hint(&body, &headers);

        self.scheduler
            .mark_rate_limited(
                &lease.account_id,
                lease.account_type,
                session_hash,
                hint.resets_after_seconds,
            )
            .await;
        self.sink
            .update_counters(
                Some(hint),
                UsageTally::default(),
                model,
                &api_key.id,
                lease.account_type,
            )
            .await;

        self.error_response(
            StatusCode::TOO_MANY_REQUESTS,
            ErrorDetail::new(ErrorKindKnown::RateLimitError, message),
            stream_requested,
        )
    }

    async fn unauthorized(
        &self,
        response: wreq::Response,
        lease: &AccountLease,
        session_hash: &str,
        stream_requested: bool,
    ) -> EngineResponse {
        let status = response.status();
        let body = drain_error_body(response).await;
        let message = error_message_from_body(&body, "authentication failed");

        self.scheduler
            .mark_unauthorized(
                &lease.account_id,
                lease.account_type,
                session_hash,
                &message,
            )
            .await;

        self.error_response(
            status,
            ErrorDetail::new(ErrorKindKnown::AuthenticationError, message),
            stream_requested,
        )
    }

    async fn upstream_failure(
        &self,
        response: wreq::Response,
        status: StatusCode,
        stream_requested: bool,
    ) -> EngineResponse {
        let body = drain_error_body(response).await;
        let message = error_message_from_body(&body, "upstream request failed");
        warn!(
            event = "upstream_failure",
            status = status.as_u16(),
            message = %message
        );
        self.error_response(
            status,
            ErrorDetail::new(ErrorKindKnown::ApiError, message),
            stream_requested,
        )
    }

    fn error_response(
        &self,
        status: StatusCode,
        detail: ErrorDetail,
        stream_requested: bool,
    ) -> EngineResponse {
        if stream_requested {
            let (tx, rx) = mpsc::channel::<Bytes>(1);
            // Buffered frames survive the sender going away.
            let _ = tx.try_send(encode_error_event(&detail));
            EngineResponse::Stream { status, body: rx }
        } else {
            EngineResponse::Json {
                status,
                body: encode_error_body(&detail),
            }
        }
    }
}

/// Feed one upstream SSE payload through the converter and the client
/// channel. Returns false when the pump must stop: the client went away or
/// the upstream surfaced a stream-level error.
async fn forward_event(
    data: &str,
    converter: &mut StreamConverter,
    tx: &mpsc::Sender<Bytes>,
    final_usage: &mut Option<Usage>,
) -> bool {
    if data.is_empty() || data == "[DONE]" {
        return true;
    }
    let Ok(event) = serde_json::from_str::<ResponseStreamEvent>(data) else {
        return true;
    };
    let ResponseStreamEvent::Known(event) = event else {
        return true;
    };

    if let ResponseStreamEventKnown::Error(err) = &event {
        let detail = ErrorDetail::new(ErrorKindKnown::ApiError, err.message.clone());
        let _ = tx.send(encode_error_event(&detail)).await;
        return false;
    }
    if let ResponseStreamEventKnown::Completed(lifecycle) = &event {
        *final_usage = Some(usage_from_response(lifecycle.response.usage.as_ref()));
    }

    for out in converter.transform_event(event) {
        let Some(frame) = encode_event(&out) else {
            continue;
        };
        if tx.send(frame).await.is_err() {
            return false;
        }
    }
    true
}

/// Post-success bookkeeping: report the tally and lift any stale rate-limit
/// mark now that the account is serving again.
async fn settle_usage(
    scheduler: &Arc<dyn AccountScheduler>,
    sink: &Arc<dyn MetricsSink>,
    lease: &AccountLease,
    api_key: &ApiKeyMeta,
    model: &str,
    usage: Usage,
) {
    let tally = UsageTally {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cache_creation_tokens: usage.cache_creation_input_tokens,
        cache_read_tokens: usage.cache_read_input_tokens,
    };
    sink.record_usage(
        &api_key.id,
        tally,
        model,
        &lease.account_id,
        lease.account_type,
    )
    .await;
    sink.update_counters(None, tally, model, &api_key.id, lease.account_type)
        .await;

    if scheduler.is_rate_limited(&lease.account_id).await {
        scheduler
            .clear_rate_limit(&lease.account_id, lease.account_type)
            .await;
    }
}
