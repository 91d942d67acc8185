use std::collections::VecDeque;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::config::RenderingMode;
use crate::error::{into_axum_response, GatewayError};
use crate::protocol::openai_chat::response_encoder::encode_chat_response_body;
use crate::protocol::openai_chat::OpenAiChatRequest;
use crate::protocol::upstream::encoder::encode_upstream_request;
use crate::state::AppState;
use crate::stream::{line_stream, CompletionMeta, ResponseCollector, StreamEmitter};
use crate::util::{preview, unix_now_secs};

const REQUEST_LOG_PREVIEW_CHARS: usize = 1000;

/// `POST /v1/chat/completions`.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(err) = state.authenticate(&headers) {
        return into_axum_response(&err);
    }

    let request: OpenAiChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(error = %err, "rejecting undecodable chat request");
            return into_axum_response(&GatewayError::InvalidRequest(format!(
                "Invalid JSON: {err}"
            )));
        }
    };

    let ids = state.next_request_ids();
    let stream = request.is_stream();
    tracing::info!(
        chat_id = %ids.chat.chat_id,
        requested_model = %request.model,
        messages = request.messages.len(),
        stream,
        "chat completion request"
    );

    let upstream_request =
        encode_upstream_request(&request, &ids.chat, &state.config.upstream, state.model_name());
    let upstream_body = match serde_json::to_vec(&upstream_request) {
        Ok(body) => Bytes::from(body),
        Err(err) => {
            return into_axum_response(&GatewayError::Internal(format!(
                "failed to encode upstream request: {err}"
            )));
        }
    };
    if tracing::enabled!(tracing::Level::DEBUG) {
        let text = String::from_utf8_lossy(&upstream_body);
        tracing::debug!(
            chat_id = %ids.chat.chat_id,
            body = preview(&text, REQUEST_LOG_PREVIEW_CHARS),
            "upstream request"
        );
    }

    let token = state.transport.resolve_credential().await;
    let upstream = match state
        .transport
        .send_chat(upstream_body, &ids.chat.chat_id, &token)
        .await
    {
        Ok(response) => response,
        Err(err) => return into_axum_response(&err),
    };

    let meta = CompletionMeta {
        id: ids.completion_id,
        model: state.model_name().to_string(),
        created: unix_now_secs(),
        chat_id: ids.chat.chat_id,
    };
    let mode = state.rendering_mode();
    let idle_timeout = state.transport.response_timeout();
    if stream {
        stream_response(upstream, meta, mode, idle_timeout)
    } else {
        collect_response(upstream, meta, mode, idle_timeout).await
    }
}

type LineStream = Pin<Box<dyn Stream<Item = Result<String, reqwest::Error>> + Send>>;

/// Next upstream line. A body that stays silent for `idle_timeout` counts as a failed read.
async fn next_line<S>(lines: &mut S, idle_timeout: Duration) -> Option<Result<String, String>>
where
    S: Stream<Item = Result<String, reqwest::Error>> + Unpin,
{
    match tokio::time::timeout(idle_timeout, lines.next()).await {
        Ok(Some(Ok(line))) => Some(Ok(line)),
        Ok(Some(Err(err))) => Some(Err(err.to_string())),
        Ok(None) => None,
        Err(_) => Some(Err(format!(
            "upstream body idle for {}s",
            idle_timeout.as_secs()
        ))),
    }
}

struct StreamState {
    // Dropped as soon as the emitter finishes, which closes the upstream connection.
    lines: Option<LineStream>,
    emitter: StreamEmitter,
    pending: VecDeque<String>,
    scratch: Vec<String>,
    idle_timeout: Duration,
}

impl StreamState {
    async fn next_frame(&mut self) -> Option<String> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(frame);
            }
            if self.emitter.is_finished() {
                return None;
            }

            self.emitter.start(&mut self.scratch);
            if self.scratch.is_empty() {
                let next = match self.lines.as_mut() {
                    Some(lines) => next_line(lines, self.idle_timeout).await,
                    None => None,
                };
                match next {
                    Some(Ok(line)) => {
                        self.emitter.on_line(&line, &mut self.scratch);
                    }
                    Some(Err(err)) => self.emitter.on_read_error(&err, &mut self.scratch),
                    None => self.emitter.on_eof(&mut self.scratch),
                }
                if self.emitter.is_finished() {
                    self.lines = None;
                }
            }
            self.pending.extend(self.scratch.drain(..));
        }
    }
}

fn stream_response(
    upstream: reqwest::Response,
    meta: CompletionMeta,
    mode: RenderingMode,
    idle_timeout: Duration,
) -> Response {
    let lines: LineStream = Box::pin(line_stream(upstream.bytes_stream()));
    let state = StreamState {
        lines: Some(lines),
        emitter: StreamEmitter::new(meta, mode),
        pending: VecDeque::with_capacity(4),
        scratch: Vec::with_capacity(4),
        idle_timeout,
    };

    let body_stream = futures_util::stream::unfold(state, |mut state| async move {
        let frame = state.next_frame().await?;
        Some((Ok::<Bytes, Infallible>(Bytes::from(frame)), state))
    });

    let mut response = Response::new(Body::from_stream(body_stream));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

async fn collect_response(
    upstream: reqwest::Response,
    meta: CompletionMeta,
    mode: RenderingMode,
    idle_timeout: Duration,
) -> Response {
    let mut collector = ResponseCollector::new(meta, mode);
    let mut lines = std::pin::pin!(line_stream(upstream.bytes_stream()));
    while let Some(line) = next_line(&mut lines, idle_timeout).await {
        match line {
            Ok(line) => {
                if collector.on_line(&line) {
                    break;
                }
            }
            Err(err) => {
                collector.on_read_error(&err);
                break;
            }
        }
    }

    let response = collector.finish();
    match encode_chat_response_body(&response) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
            Body::from(body),
        )
            .into_response(),
        Err(err) => into_axum_response(&GatewayError::Internal(format!(
            "failed to encode response: {err}"
        ))),
    }
}
