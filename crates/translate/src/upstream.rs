//! Dispatch of transformed requests to the upstream aggregator.

use std::time::Duration;

use eventsource_stream::Eventsource as _;
use futures::{StreamExt as _, future, stream::BoxStream};
use reqwest::{Client, header::AUTHORIZATION};
use secrecy::{ExposeSecret as _, SecretString};

use crate::{
    error::{ProxyError, Result},
    http_client::build_http_client,
    messages::openai::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse},
};

/// Stream of parsed upstream chunks, terminated at the `[DONE]` sentinel.
pub(crate) type ChunkStream = BoxStream<'static, Result<ChatCompletionChunk>>;

/// The upstream aggregator endpoint.
pub(crate) struct Upstream {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    read_timeout: Duration,
}

impl Upstream {
    pub fn new(config: &config::UpstreamConfig) -> Self {
        Self {
            client: build_http_client(Duration::from_secs(config.connect_timeout_secs)),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
        }
    }

    /// Send a non-streaming completion request and parse the response body.
    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
        client_key: Option<SecretString>,
    ) -> Result<ChatCompletionResponse> {
        let response = self
            .send(request, client_key, Some(self.read_timeout))
            .await?;

        let body = response.bytes().await.map_err(read_error)?;

        sonic_rs::from_slice(&body).map_err(|err| {
            log::error!("Failed to parse upstream chat completion response: {err}");
            ProxyError::UpstreamProtocol(format!("unparseable upstream response: {err}"))
        })
    }

    /// Send a streaming completion request and return the parsed chunk
    /// stream. The read timeout bounds the gap between consecutive chunks.
    pub async fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
        client_key: Option<SecretString>,
    ) -> Result<ChunkStream> {
        // No total-duration timeout here; long streams are legitimate.
        let response = self.send(request, client_key, None).await?;

        let events = response.bytes_stream().eventsource();

        let chunks = events
            .filter_map(|event| {
                future::ready(match event {
                    Err(err) => {
                        log::warn!("SSE framing error in upstream stream: {err}");
                        None
                    }
                    Ok(event) if event.data == "[DONE]" => Some(Frame::Done),
                    Ok(event) => match sonic_rs::from_str::<ChatCompletionChunk>(&event.data) {
                        Ok(chunk) => Some(Frame::Chunk(Box::new(chunk))),
                        Err(err) => {
                            log::warn!("Skipping unparseable upstream chunk: {err}");
                            None
                        }
                    },
                })
            })
            .take_while(|frame| future::ready(!matches!(frame, Frame::Done)))
            .filter_map(|frame| {
                future::ready(match frame {
                    Frame::Chunk(chunk) => Some(Ok(*chunk)),
                    Frame::Done => None,
                })
            });

        Ok(with_read_timeout(Box::pin(chunks), self.read_timeout))
    }

    async fn send(
        &self,
        request: &ChatCompletionRequest,
        client_key: Option<SecretString>,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let key = client_key
            .as_ref()
            .or(self.api_key.as_ref())
            .ok_or_else(|| ProxyError::Internal(Some("no upstream API key available".to_string())))?;

        let body = sonic_rs::to_vec(request)
            .map_err(|err| ProxyError::Internal(Some(format!("failed to serialize upstream request: {err}"))))?;

        let mut builder = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()))
            .header("Content-Type", "application/json")
            .body(body);

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(send_error)?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();

        // Do not log the body wholesale; upstream errors can echo request
        // fragments. The status alone identifies the failure class.
        log::error!("Upstream returned status {status}");

        Err(match status.as_u16() {
            401 | 403 => ProxyError::Unauthorized {
                status: status.as_u16(),
                message: "upstream rejected the provided credentials".to_string(),
            },
            code if usable_error_body(&body) => ProxyError::UpstreamStatus {
                status: code,
                body: body.to_vec(),
            },
            code => ProxyError::UpstreamProtocol(format!("upstream returned status {code}")),
        })
    }
}

/// A body is forwarded verbatim only when it is self-describing JSON.
fn usable_error_body(body: &[u8]) -> bool {
    !body.is_empty() && sonic_rs::from_slice::<sonic_rs::Value>(body).is_ok()
}

fn send_error(err: reqwest::Error) -> ProxyError {
    if err.is_timeout() {
        ProxyError::UpstreamTimeout("request to upstream timed out".to_string())
    } else {
        log::error!("Failed to reach upstream: {err}");
        ProxyError::UpstreamProtocol("failed to reach upstream".to_string())
    }
}

fn read_error(err: reqwest::Error) -> ProxyError {
    if err.is_timeout() {
        ProxyError::UpstreamTimeout("reading the upstream response timed out".to_string())
    } else {
        log::error!("Failed to read upstream response: {err}");
        ProxyError::UpstreamProtocol("failed to read upstream response".to_string())
    }
}

enum Frame {
    Chunk(Box<ChatCompletionChunk>),
    Done,
}

/// Bound the time between consecutive chunks. On expiry the stream yields
/// one timeout error and ends; the relay reports it in-stream.
fn with_read_timeout(stream: ChunkStream, timeout: Duration) -> ChunkStream {
    Box::pin(futures::stream::unfold(
        (stream, false),
        move |(mut stream, timed_out)| async move {
            if timed_out {
                return None;
            }

            match tokio::time::timeout(timeout, stream.next()).await {
                Ok(Some(item)) => Some((item, (stream, false))),
                Ok(None) => None,
                Err(_) => Some((
                    Err(ProxyError::UpstreamTimeout(
                        "upstream stream stalled past the read timeout".to_string(),
                    )),
                    (stream, true),
                )),
            }
        },
    ))
}
