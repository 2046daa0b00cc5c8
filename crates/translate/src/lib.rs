//! The translation core of the Athena proxy.
//!
//! Accepts Messages-dialect requests on `/v1/messages`, rewrites them into
//! the upstream Chat Completions dialect, dispatches them, and translates
//! the response back, streaming or not.

use std::{convert::Infallible, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    http::HeaderMap,
    response::{IntoResponse, Response, Sse, sse::Event},
    routing::{get, post},
};
use futures::StreamExt as _;
use secrecy::SecretString;

mod error;
mod format;
mod http_client;
mod kimi;
mod messages;
mod relay;
mod resolver;
mod schema;
mod transform;
mod upstream;
mod validate;

pub use error::{ProxyError, Result};
pub use format::UpstreamFormat;
pub use messages::{anthropic, openai};
pub use relay::StreamRelay;
pub use resolver::resolve;
pub use schema::sanitize;
pub use transform::{
    request::{PreparedRequest, build as build_upstream_request},
    response::into_client_response,
};

use crate::{messages::anthropic::MessagesRequest, upstream::Upstream};

struct ProxyState {
    upstream: Upstream,
    config: config::Config,
}

/// Creates the axum router for the proxy endpoints.
pub fn router(config: config::Config) -> Router {
    let state = Arc::new(ProxyState {
        upstream: Upstream::new(&config.upstream),
        config,
    });

    Router::new()
        .route("/v1/messages", post(messages))
        .route("/health", get(health))
        .with_state(state)
}

/// Handle Messages-dialect requests.
///
/// When `stream: true` is set in the request, the response is sent as
/// Server-Sent Events. Otherwise a standard JSON response is returned.
async fn messages(
    axum::extract::State(state): axum::extract::State<Arc<ProxyState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let request: MessagesRequest = sonic_rs::from_slice(&body)
        .map_err(|err| ProxyError::BadRequest(format!("invalid request body: {err}")))?;

    log::debug!("Messages handler called for model: {}", request.model);
    log::debug!("Request has {} messages", request.messages.len());

    let client_key = client_api_key(&headers);
    let prepared = transform::request::build(request, &state.config)?;

    log::debug!(
        "Dispatching to upstream model '{}' ({} variant), streaming: {}",
        prepared.upstream.model,
        prepared.format,
        prepared.stream
    );

    if prepared.stream {
        let relay = StreamRelay::new(prepared.requested_model.as_str(), prepared.format);
        let chunks = state.upstream.chat_completion_stream(&prepared.upstream, client_key).await?;

        Ok(stream_response(relay, chunks))
    } else {
        let upstream_response = state.upstream.chat_completion(&prepared.upstream, client_key).await?;
        let response = transform::response::into_client_response(
            upstream_response,
            &prepared.requested_model,
            prepared.format,
        )?;

        Ok(Json(response).into_response())
    }
}

/// Handle health checks.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Assemble the client-side SSE response from the relay and the upstream
/// chunk stream. From here on errors can no longer change the HTTP status;
/// they surface as an `error` event followed by `message_stop`.
fn stream_response(relay: StreamRelay, chunks: upstream::ChunkStream) -> Response {
    let head = relay.start_event();

    let body = chunks
        .map(Some)
        .chain(futures::stream::once(async { None }))
        .scan(relay, |relay, item| {
            let events = match item {
                Some(Ok(chunk)) => match relay.on_chunk(chunk) {
                    Ok(events) => events,
                    Err(error) => {
                        log::error!("Stream relay error: {error}");
                        relay.fail(&error)
                    }
                },
                Some(Err(error)) => {
                    log::error!("Upstream stream error: {error}");
                    relay.fail(&error)
                }
                None => relay.finish(),
            };

            futures::future::ready(Some(events))
        })
        .flat_map(futures::stream::iter);

    let events = futures::stream::iter(vec![head])
        .chain(body)
        .map(|event| Ok::<_, Infallible>(sse_event(&event)));

    let mut response = Sse::new(events).into_response();

    // Defeat intermediary buffering; each event must reach the client as
    // soon as it is emitted.
    response
        .headers_mut()
        .insert("x-accel-buffering", http::HeaderValue::from_static("no"));
    response
        .headers_mut()
        .insert(http::header::CACHE_CONTROL, http::HeaderValue::from_static("no-cache"));

    response
}

fn sse_event(event: &anthropic::StreamEvent) -> Event {
    let data = sonic_rs::to_string(event).unwrap_or_else(|err| {
        log::error!("Failed to serialize stream event: {err}");
        r#"{"type":"error","error":{"type":"internal_error","message":"serialization failed"}}"#.to_string()
    });

    Event::default().event(event.name()).data(data)
}

/// Pick the caller's credential to forward: `x-api-key` first, then a
/// bearer `authorization` header. Values are never logged.
fn client_api_key(headers: &HeaderMap) -> Option<SecretString> {
    if let Some(value) = headers.get("x-api-key")
        && let Ok(value) = value.to_str()
        && !value.is_empty()
    {
        return Some(SecretString::from(value.to_string()));
    }

    if let Some(value) = headers.get(http::header::AUTHORIZATION)
        && let Ok(value) = value.to_str()
    {
        let token = value.strip_prefix("Bearer ").unwrap_or(value);

        if !token.is_empty() {
            return Some(SecretString::from(token.to_string()));
        }
    }

    None
}
