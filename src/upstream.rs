//! Thin HTTP clients for the upstream providers.
//!
//! Every provider exposes an OpenAI-compatible `/chat/completions` endpoint;
//! the only differences are the base URL and the auth header. The adapter
//! offers exactly three operations: a non-streaming completion, a streaming
//! completion yielding parsed chunks, and a raw forward for the passthrough
//! endpoint.

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::providers::{strip_provider_tag, AuthScheme, Provider};
use crate::translate::openai_types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatErrorResponse,
    StreamOptions,
};

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// One provider's chat-completions endpoint, resolved for a single request.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    provider: Provider,
    base_url: String,
    api_key: String,
}

impl UpstreamClient {
    /// Resolve the client for an effective (provider-tagged) model name.
    pub fn for_model(
        config: &Config,
        client: &reqwest::Client,
        effective_model: &str,
    ) -> Result<Self> {
        let provider =
            Provider::of_model(effective_model).unwrap_or(config.preferred_provider);
        let api_key = config.api_key_for(provider)?.to_string();
        Ok(Self {
            client: client.clone(),
            provider,
            base_url: config.base_url_for(provider),
            api_key,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Non-streaming completion. Upstream HTTP errors come back as
    /// [`ProxyError::Upstream`] carrying the provider's status and message.
    pub async fn complete(&self, req: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let body = serde_json::to_vec(&self.outbound(req, false))
            .map_err(|e| ProxyError::translation(format!("Failed to serialize request: {e}")))?;

        let response = self
            .post_json(body)
            .send()
            .await
            .map_err(|e| ProxyError::upstream(502, format!("Upstream request failed: {e}")))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ProxyError::upstream(502, format!("Failed to read response body: {e}")))?;

        if status >= 400 {
            return Err(upstream_error(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| {
            ProxyError::translation(format!(
                "Failed to parse provider response: {e}. Body: {}",
                truncate(&text, 300)
            ))
        })
    }

    /// Streaming completion. The returned stream yields parsed chunks until
    /// the provider's `[DONE]` marker or the connection ends.
    pub async fn complete_stream(&self, req: &ChatCompletionRequest) -> Result<ChunkStream> {
        let body = serde_json::to_vec(&self.outbound(req, true))
            .map_err(|e| ProxyError::translation(format!("Failed to serialize request: {e}")))?;

        let response = self
            .post_json(body)
            .send()
            .await
            .map_err(|e| ProxyError::upstream(502, format!("Streaming request failed: {e}")))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let text = response.text().await.unwrap_or_default();
            return Err(upstream_error(status, &text));
        }

        Ok(Box::pin(chunk_stream(response.bytes_stream())))
    }

    /// Raw passthrough for the OpenAI-compatible endpoint: the body is sent
    /// as-is and the provider's reply comes back untouched.
    pub async fn forward(&self, body: Bytes) -> Result<(u16, String, Bytes)> {
        let response = self
            .post_json(body.to_vec())
            .send()
            .await
            .map_err(|e| ProxyError::upstream(502, format!("Passthrough request failed: {e}")))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();
        let bytes = response.bytes().await.map_err(|e| {
            ProxyError::upstream(502, format!("Failed to read passthrough response: {e}"))
        })?;

        Ok((status, content_type, bytes))
    }

    /// The request as the provider sees it: routing tag stripped, streaming
    /// flags forced when streaming.
    fn outbound(&self, req: &ChatCompletionRequest, streaming: bool) -> ChatCompletionRequest {
        let mut outbound = req.clone();
        outbound.model = strip_provider_tag(&outbound.model).to_string();
        if streaming {
            outbound.stream = Some(true);
            outbound.stream_options.get_or_insert(StreamOptions {
                include_usage: true,
            });
        }
        outbound
    }

    fn post_json(&self, body: Vec<u8>) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body);

        match self.provider.auth_scheme() {
            AuthScheme::Bearer => {
                builder.header("Authorization", format!("Bearer {}", self.api_key))
            }
            AuthScheme::AnthropicApiKey => builder
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        }
    }
}

/// Map a non-2xx upstream reply into the error taxonomy, preserving the
/// provider's message when the body is a well-formed error envelope.
fn upstream_error(status: u16, body: &str) -> ProxyError {
    if let Ok(err) = serde_json::from_str::<ChatErrorResponse>(body) {
        ProxyError::upstream(status, err.error.message)
    } else {
        ProxyError::upstream(status, truncate(body, 500).to_string())
    }
}

/// Parse an OpenAI SSE byte stream into chat-completion chunks.
fn chunk_stream(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<ChatCompletionChunk>> + Send + 'static {
    async_stream::stream! {
        let mut buffer = String::new();

        tokio::pin!(byte_stream);

        'outer: while let Some(chunk_result) = byte_stream.next().await {
            let bytes = match chunk_result {
                Ok(b) => b,
                Err(e) => {
                    yield Err(ProxyError::upstream(502, format!("Byte stream error: {e}")));
                    break;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline_pos) = buffer.find('\n') {
                let line = buffer[..newline_pos].trim().to_string();
                buffer = buffer[newline_pos + 1..].to_string();

                if line.is_empty() {
                    continue;
                }

                // Only `data:` lines carry chunks; event/id/retry/comment
                // lines are skipped.
                let Some(data) = line
                    .strip_prefix("data: ")
                    .or_else(|| line.strip_prefix("data:"))
                    .map(str::trim)
                else {
                    continue;
                };

                if data == "[DONE]" {
                    break 'outer;
                }

                match serde_json::from_str::<ChatCompletionChunk>(data) {
                    Ok(chunk) => yield Ok(chunk),
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping unparseable chunk");
                    }
                }
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}
