//! Core proxy orchestration: normalize, convert, call upstream, and translate
//! the reply back, for both streaming and non-streaming requests.

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::models::normalize_model;
use crate::providers::{strip_provider_tag, TargetProfile};
use crate::translate::anthropic_types::{MessagesRequest, MessagesResponse, StreamEvent};
use crate::translate::request::anthropic_to_openai;
use crate::translate::response::openai_to_anthropic;
use crate::translate::streaming::StreamTranslator;
use crate::upstream::{ChunkStream, UpstreamClient};

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;

/// One SSE frame ready for the wire. A frame without an event name is a bare
/// `data:` line (used for the `[DONE]` terminator).
#[derive(Debug, Clone)]
pub struct SseFrame {
    pub event: Option<&'static str>,
    pub data: String,
}

impl SseFrame {
    fn from_event(event: &StreamEvent) -> Option<SseFrame> {
        let data = serde_json::to_string(event).ok()?;
        Some(SseFrame {
            event: Some(event.event_name()),
            data,
        })
    }

    fn done() -> SseFrame {
        SseFrame {
            event: None,
            data: "[DONE]".to_string(),
        }
    }
}

pub type SseStream = Pin<Box<dyn Stream<Item = SseFrame> + Send>>;

/// Forward a non-streaming request: convert to the intermediate format, call
/// the provider, convert the reply back to an Anthropic response.
///
/// The request must already be normalized (see
/// [`crate::models::normalize_request`]).
pub async fn proxy_non_streaming(
    req: &MessagesRequest,
    config: &Config,
    client: &reqwest::Client,
) -> Result<MessagesResponse> {
    let profile = TargetProfile::resolve(&req.model, config);
    let upstream = UpstreamClient::for_model(config, client, &req.model)?;
    let openai_req = anthropic_to_openai(req, &profile);

    tracing::debug!(model = %openai_req.model, "forwarding completion");

    let openai_resp = upstream.complete(&openai_req).await?;

    let original_model = req.original_model.as_deref().unwrap_or(&req.model);
    let response = openai_to_anthropic(&openai_resp, original_model, profile.supports_tools);

    tracing::debug!(
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        stop_reason = response.stop_reason.as_deref().unwrap_or(""),
        "completed"
    );

    Ok(response)
}

/// Forward a streaming request, returning the Anthropic SSE frame stream.
///
/// Errors before the upstream stream is established surface as `Err` (the
/// caller can still send an HTTP error response); once frames are flowing,
/// upstream failures terminate the stream legally instead.
pub async fn proxy_streaming(
    req: &MessagesRequest,
    config: &Config,
    client: &reqwest::Client,
) -> Result<SseStream> {
    let profile = TargetProfile::resolve(&req.model, config);
    let upstream = UpstreamClient::for_model(config, client, &req.model)?;
    let openai_req = anthropic_to_openai(req, &profile);

    tracing::debug!(model = %openai_req.model, "starting streaming completion");

    let chunks = upstream.complete_stream(&openai_req).await?;

    let original_model = req
        .original_model
        .clone()
        .unwrap_or_else(|| req.model.clone());

    Ok(Box::pin(translate_sse(chunks, original_model)))
}

/// Drive the stream translator over the upstream chunk stream.
///
/// Every path out of this stream ends with `message_delta`, `message_stop`,
/// and the `[DONE]` line. Upstream failures mid-stream are logged and folded
/// into a legal termination rather than propagated.
fn translate_sse(mut chunks: ChunkStream, model: String) -> impl Stream<Item = SseFrame> + Send {
    async_stream::stream! {
        let mut translator = StreamTranslator::new(&model);

        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    for event in translator.process_chunk(&chunk) {
                        if let Some(frame) = SseFrame::from_event(&event) {
                            yield frame;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "upstream stream failed mid-flight");
                    for event in translator.abort() {
                        if let Some(frame) = SseFrame::from_event(&event) {
                            yield frame;
                        }
                    }
                    yield SseFrame::done();
                    return;
                }
            }
        }

        for event in translator.finish() {
            if let Some(frame) = SseFrame::from_event(&event) {
                yield frame;
            }
        }
        yield SseFrame::done();
    }
}

/// OpenAI passthrough: normalize the model in the raw body, then forward it
/// to the resolved provider untouched.
pub async fn proxy_chat_completions(
    body: Bytes,
    config: &Config,
    client: &reqwest::Client,
) -> Result<(u16, String, Bytes)> {
    let mut value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::invalid_request(format!("Invalid request body: {e}")))?;

    let model = value
        .get("model")
        .and_then(|m| m.as_str())
        .ok_or_else(|| ProxyError::invalid_request("missing model field"))?;

    let effective = normalize_model(model, config);
    let upstream = UpstreamClient::for_model(config, client, &effective)?;

    value["model"] = serde_json::Value::String(strip_provider_tag(&effective).to_string());
    let outbound = serde_json::to_vec(&value)
        .map_err(|e| ProxyError::translation(format!("Failed to serialize request: {e}")))?;

    tracing::debug!(model = %effective, "forwarding chat completion passthrough");

    upstream.forward(Bytes::from(outbound)).await
}
