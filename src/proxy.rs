// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// HTTP bridge surface
//
// Responsibilities:
// - POST /v1/messages: accept an Anthropic-style request, forward the
//   translated OpenAI-style request via the injected UpstreamClient
// - Streaming responses pipe through SseParser + StreamBridge
// - Buffered responses translate in one pass
// - Heartbeat endpoint
// - 404 for unknown paths

use crate::bridge::StreamBridge;
use crate::buffered::{transform_request, transform_response};
use crate::config::Config;
use crate::error::BridgeError;
use crate::observe::{BridgeObserver, NoopObserver};
use crate::sse::SseParser;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Largest request body the bridge will read.
pub const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

/// The address the bridge binds to. Always localhost, never 0.0.0.0.
pub const BIND_HOST: [u8; 4] = [127, 0, 0, 1];

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Outbound request data handed to the upstream client. The target path
/// is fixed (chat completions), so only the translated body travels.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub body: Bytes,
}

/// Response received from the upstream provider.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub body: Body,
}

/// Errors that can occur during upstream forwarding.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("request body is empty")]
    EmptyBody,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, public_message) = match &self {
            ProxyError::UpstreamFailure(_) => (
                StatusCode::BAD_GATEWAY,
                "upstream request failed".to_string(),
            ),
            ProxyError::UpstreamTimeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "upstream request timed out".to_string(),
            ),
            ProxyError::MalformedJson(_) => (
                StatusCode::BAD_REQUEST,
                "request body is not valid JSON".to_string(),
            ),
            ProxyError::EmptyBody => {
                (StatusCode::BAD_REQUEST, "request body is empty".to_string())
            }
        };
        (status, public_message).into_response()
    }
}

// ---------------------------------------------------------------------------
// Trait: UpstreamClient (dependency injection point)
// ---------------------------------------------------------------------------

/// Abstraction over the HTTP client that talks to the OpenAI-style
/// upstream.
///
/// Implementations must be Send + Sync so they can be shared across
/// request handlers via `Arc`.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn complete(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError>;
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn UpstreamClient>,
    pub config: Arc<Config>,
    pub observer: Arc<dyn BridgeObserver>,
}

impl AppState {
    pub fn new(upstream: Arc<dyn UpstreamClient>, config: Arc<Config>) -> Self {
        Self::with_observer(upstream, config, Arc::new(NoopObserver))
    }

    pub fn with_observer(
        upstream: Arc<dyn UpstreamClient>,
        config: Arc<Config>,
        observer: Arc<dyn BridgeObserver>,
    ) -> Self {
        Self {
            upstream,
            config,
            observer,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Heartbeat endpoint: GET /v1/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// POST /v1/messages.
///
/// Validates the request, translates it for the upstream, forwards via
/// the injected client, and translates the response back — streamed
/// when the caller asked for a stream, buffered otherwise.
pub async fn messages_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Response {
    let body = match axum::body::to_bytes(request.into_body(), MAX_REQUEST_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("failed to read request body: {e}"),
            )
                .into_response()
        }
    };

    if body.is_empty() {
        return ProxyError::EmptyBody.into_response();
    }
    let inbound: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return ProxyError::MalformedJson(e.to_string()).into_response(),
    };

    let model = inbound
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let wants_stream = inbound
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let (translated, directives) = transform_request(&inbound, state.config.default_thinking);
    let outbound = match serde_json::to_vec(&translated) {
        Ok(b) => Bytes::from(b),
        Err(e) => return ProxyError::MalformedJson(e.to_string()).into_response(),
    };

    let upstream_resp = match state.upstream.complete(ProxyRequest { body: outbound }).await {
        Ok(resp) => resp,
        Err(e) => return e.into_response(),
    };

    // Upstream errors pass through unchanged; there is nothing to
    // translate in an error payload.
    if !upstream_resp.status.is_success() {
        tracing::warn!(status = %upstream_resp.status, "upstream returned an error");
        return (upstream_resp.status, upstream_resp.body).into_response();
    }

    if wants_stream {
        stream_response(upstream_resp.body, model, &state)
    } else {
        buffered_response(upstream_resp.body, model, &directives).await
    }
}

/// Translate a buffered (non-streaming) upstream response in one pass.
async fn buffered_response(
    body: Body,
    model: String,
    directives: &crate::buffered::DirectiveConfig,
) -> Response {
    let bytes = match axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => return ProxyError::UpstreamFailure(e.to_string()).into_response(),
    };
    // A non-JSON body falls through to the translator's synthetic
    // error message rather than a bare 502.
    let upstream: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Json(transform_response(&upstream, directives, &model)).into_response()
}

/// Pipe a streaming upstream body through the frame parser and the
/// stream bridge, producing a downstream SSE body.
///
/// The translation task runs detached; the response body is fed through
/// a channel so the client sees events as the upstream produces them.
/// If the upstream body ends before the done sentinel, the bridge is
/// finalized anyway so the client still receives a well-formed close.
fn stream_response(body: Body, model: String, state: &AppState) -> Response {
    let (tx, rx) = mpsc::channel::<Bytes>(64);

    let mut parser = SseParser::new(state.config.limits.max_frame_buffer_bytes);
    let mut bridge =
        StreamBridge::with_observer(model, state.config.stream_limits(), state.observer.clone());

    tokio::spawn(async move {
        let mut input = body.into_data_stream();
        while let Some(chunk) = input.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(err) => {
                    tracing::warn!(error = %err, "upstream body read failed mid-stream");
                    break;
                }
            };
            let events = match parser.parse(&chunk) {
                Ok(events) => events,
                Err(err) => return abort_stream(&tx, &err).await,
            };
            for event in events {
                let out = match bridge.push(&event) {
                    Ok(out) => out,
                    Err(err) => return abort_stream(&tx, &err).await,
                };
                for downstream in out {
                    if tx.send(Bytes::from(downstream.sse_frame())).await.is_err() {
                        return; // Client disconnected
                    }
                }
            }
            if bridge.state().finalized {
                return;
            }
        }

        // Upstream ended without the sentinel; close cleanly.
        for downstream in bridge.finalize() {
            if tx.send(Bytes::from(downstream.sse_frame())).await.is_err() {
                return;
            }
        }
    });

    let frames = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

/// Send a terminal error frame and drop the channel. A resource-limit
/// breach is fatal for the stream; nothing follows this frame.
async fn abort_stream(tx: &mpsc::Sender<Bytes>, err: &BridgeError) {
    tracing::error!(error = %err, "stream aborted");
    let frame = format!(
        "event: error\ndata: {}\n\n",
        serde_json::json!({"type": "error", "message": err.to_string()})
    );
    let _ = tx.send(Bytes::from(frame)).await;
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router with the messages route and the heartbeat
/// endpoint.
///
/// The upstream client is injected — no side effects, no hard-coded
/// clients.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/messages", post(messages_handler))
        .route("/v1/heartbeat", get(heartbeat))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt; // for oneshot

    // -----------------------------------------------------------------------
    // Mock upstream clients
    // -----------------------------------------------------------------------

    /// Returns a fixed status and body. Proves the DI pattern works:
    /// handlers never touch a real HTTP client.
    struct MockUpstreamClient {
        status: StatusCode,
        body: Bytes,
    }

    impl MockUpstreamClient {
        fn new(status: StatusCode, body: &str) -> Self {
            Self {
                status,
                body: Bytes::copy_from_slice(body.as_bytes()),
            }
        }

        fn ok(body: &str) -> Self {
            Self::new(StatusCode::OK, body)
        }
    }

    #[async_trait::async_trait]
    impl UpstreamClient for MockUpstreamClient {
        async fn complete(&self, _request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
            Ok(ProxyResponse {
                status: self.status,
                body: Body::from(self.body.clone()),
            })
        }
    }

    /// Captures the forwarded body so tests can inspect the translation.
    struct CapturingClient {
        captured: tokio::sync::Mutex<Option<Value>>,
        body: Bytes,
    }

    impl CapturingClient {
        fn new(body: &str) -> Self {
            Self {
                captured: tokio::sync::Mutex::new(None),
                body: Bytes::copy_from_slice(body.as_bytes()),
            }
        }
    }

    #[async_trait::async_trait]
    impl UpstreamClient for CapturingClient {
        async fn complete(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
            *self.captured.lock().await = serde_json::from_slice(&request.body).ok();
            Ok(ProxyResponse {
                status: StatusCode::OK,
                body: Body::from(self.body.clone()),
            })
        }
    }

    fn app_with(client: Arc<dyn UpstreamClient>) -> Router {
        build_router(AppState::new(client, Arc::new(Config::default())))
    }

    fn post_messages(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/messages")
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), MAX_REQUEST_BODY_BYTES)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn buffered_completion() -> String {
        json!({
            "id": "chatcmpl-9",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "reasoning_content": "six times seven",
                    "content": "42"
                },
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5}
        })
        .to_string()
    }

    fn sse_body(frames: &[&str]) -> String {
        frames
            .iter()
            .map(|f| format!("data: {f}\n\n"))
            .collect::<String>()
    }

    // -----------------------------------------------------------------------
    // Test 1: heartbeat returns 200
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn heartbeat_returns_200() {
        let app = app_with(Arc::new(MockUpstreamClient::ok("{}")));
        let req = Request::builder()
            .method("GET")
            .uri("/v1/heartbeat")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // -----------------------------------------------------------------------
    // Test 2: empty request body -> 400
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn empty_body_returns_400() {
        let app = app_with(Arc::new(MockUpstreamClient::ok("{}")));
        let resp = app.oneshot(post_messages("")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(resp).await.contains("empty"));
    }

    // -----------------------------------------------------------------------
    // Test 3: malformed JSON request body -> 400
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn malformed_json_returns_400() {
        let app = app_with(Arc::new(MockUpstreamClient::ok("{}")));
        let resp = app.oneshot(post_messages("this is not json {{{")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(resp).await.contains("not valid JSON"));
    }

    // -----------------------------------------------------------------------
    // Test 4: unknown path returns 404
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn unknown_path_returns_404() {
        let app = app_with(Arc::new(MockUpstreamClient::ok("{}")));
        let req = Request::builder()
            .method("POST")
            .uri("/v1/unknown")
            .body(Body::from("{}"))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    // -----------------------------------------------------------------------
    // Test 5: upstream 5xx passed through unchanged
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn upstream_5xx_passed_through() {
        let error_body = r#"{"error":{"message":"boom","type":"server_error"}}"#;
        let app = app_with(Arc::new(MockUpstreamClient::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body,
        )));

        let resp = app
            .oneshot(post_messages(r#"{"model":"gpt-4o","messages":[]}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(resp).await, error_body);
    }

    // -----------------------------------------------------------------------
    // Test 6: upstream timeout -> 504, upstream failure -> 502
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn upstream_timeout_returns_504() {
        struct TimeoutClient;

        #[async_trait::async_trait]
        impl UpstreamClient for TimeoutClient {
            async fn complete(&self, _request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
                Err(ProxyError::UpstreamTimeout("timed out after 5000ms".to_string()))
            }
        }

        let app = app_with(Arc::new(TimeoutClient));
        let resp = app
            .oneshot(post_messages(r#"{"model":"gpt-4o","messages":[]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn proxy_error_upstream_failure_is_502() {
        let resp = ProxyError::UpstreamFailure("connection refused".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    // -----------------------------------------------------------------------
    // Test 7: buffered response translated to a messages payload
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn buffered_response_is_translated() {
        let app = app_with(Arc::new(MockUpstreamClient::ok(&buffered_completion())));
        let req_body = json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "what is 6*7?"}]
        });

        let resp = app.oneshot(post_messages(&req_body.to_string())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let translated: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(translated["type"], "message");
        assert_eq!(translated["stop_reason"], "end_turn");
        let content = translated["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "thinking");
        assert_eq!(content[0]["thinking"], "six times seven");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], "42");
        assert_eq!(translated["usage"]["input_tokens"], 12);
        assert_eq!(translated["usage"]["output_tokens"], 5);
    }

    // -----------------------------------------------------------------------
    // Test 8: directives stripped and effort injected before forwarding
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn forwarded_request_has_directives_stripped() {
        let client = Arc::new(CapturingClient::new(&buffered_completion()));
        let app = build_router(AppState::new(
            client.clone(),
            Arc::new(Config::default()),
        ));

        let req_body = json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "[think:high] why is the sky blue?"}]
        });
        let resp = app.oneshot(post_messages(&req_body.to_string())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let captured = client.captured.lock().await;
        let forwarded = captured.as_ref().unwrap();
        assert_eq!(
            forwarded["messages"][0]["content"],
            " why is the sky blue?"
        );
        assert_eq!(forwarded["reasoning_effort"], "high");
    }

    // -----------------------------------------------------------------------
    // Test 9: streaming response piped through the bridge
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn streamed_response_emits_full_event_sequence() {
        let body = sse_body(&[
            r#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","reasoning_content":"hmm"}}]}"#,
            r#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"index":0,"delta":{"content":"42"}}]}"#,
            r#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
            "[DONE]",
        ]);
        let app = app_with(Arc::new(MockUpstreamClient::ok(&body)));

        let req_body = json!({
            "model": "gpt-4o",
            "stream": true,
            "messages": [{"role": "user", "content": "what is 6*7?"}]
        });
        let resp = app.oneshot(post_messages(&req_body.to_string())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let out = body_string(resp).await;
        let names: Vec<&str> = out
            .lines()
            .filter_map(|l| l.strip_prefix("event: "))
            .collect();
        assert_eq!(
            names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "signature_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert!(out.contains(r#""thinking":"hmm""#));
        assert!(out.contains(r#""text":"42""#));
    }

    // -----------------------------------------------------------------------
    // Test 10: upstream ends without the sentinel -> clean close anyway
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn truncated_upstream_stream_still_closes() {
        let body = sse_body(&[
            r#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":"partial"}}]}"#,
        ]);
        let app = app_with(Arc::new(MockUpstreamClient::ok(&body)));

        let req_body = json!({"model": "gpt-4o", "stream": true, "messages": []});
        let resp = app.oneshot(post_messages(&req_body.to_string())).await.unwrap();
        let out = body_string(resp).await;

        let names: Vec<&str> = out
            .lines()
            .filter_map(|l| l.strip_prefix("event: "))
            .collect();
        assert_eq!(names.last(), Some(&"message_stop"));
        assert!(names.contains(&"content_block_stop"));
        assert!(names.contains(&"message_delta"));
    }

    // -----------------------------------------------------------------------
    // Test 11: resource-limit breach aborts the stream with an error frame
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn block_byte_cap_aborts_stream() {
        let body = sse_body(&[
            r#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":"0123456789abcdef"}}]}"#,
        ]);
        let client = Arc::new(MockUpstreamClient::ok(&body));

        let mut config = Config::default();
        config.limits.max_block_bytes = 8;
        let app = build_router(AppState::new(client, Arc::new(config)));

        let req_body = json!({"model": "gpt-4o", "stream": true, "messages": []});
        let resp = app.oneshot(post_messages(&req_body.to_string())).await.unwrap();
        let out = body_string(resp).await;

        assert!(out.contains("event: error"));
        assert!(!out.contains("message_stop"));
    }
}
