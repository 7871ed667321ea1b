//! Translate Anthropic Messages API requests into `OpenAI` Chat Completions
//! requests.
//!
//! Handles system messages, multi-part content (text, images), tool use, tool
//! results, and tool choice mapping. A single Anthropic message can expand
//! into multiple `OpenAI` messages (a user message with `tool_result` blocks
//! becomes separate `tool`-role messages). The target profile decides whether
//! structured content survives or is flattened to plain text, and whether the
//! tool catalog is forwarded at all.

use super::anthropic_types::{
    ContentBlock, Message, MessagesRequest, Role, ToolChoice,
};
use super::flatten;
use super::openai_types::{
    ChatCompletionRequest, ChatContent, ChatFunction, ChatMessage, ChatTool, ChatToolCall,
    ChatToolCallFunction, ChatToolChoice, ChatToolChoiceFunction, ChatToolChoiceSpecific,
    ContentPart, ImageUrlDetail, StreamOptions,
};
use crate::providers::TargetProfile;

/// Translate an Anthropic Messages API request into an `OpenAI` Chat
/// Completions request. Pure function of the request and the resolved target
/// profile.
pub fn anthropic_to_openai(
    req: &MessagesRequest,
    profile: &TargetProfile,
) -> ChatCompletionRequest {
    let mut messages = Vec::new();

    if let Some(ref system) = req.system {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: Some(ChatContent::Text(system.as_text())),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for msg in &req.messages {
        let mut translated = translate_message(msg, profile);
        messages.append(&mut translated);
    }

    // Capability gate: targets without function calling get neither tools
    // nor tool_choice, regardless of what the client sent.
    let (tools, tool_choice) = if profile.supports_tools {
        let tools = req.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| ChatTool {
                    tool_type: "function".to_string(),
                    function: ChatFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    },
                })
                .collect()
        });
        let choice = req.tool_choice.as_ref().map(translate_tool_choice);
        (tools, choice)
    } else {
        if req.tools.is_some() {
            tracing::debug!(model = %req.model, "target lacks function calling, dropping tools");
        }
        (None, None)
    };

    let max_tokens = match profile.max_tokens_ceiling {
        Some(ceiling) => req.max_tokens.min(ceiling),
        None => req.max_tokens,
    };

    let stream_options = req.stream.filter(|s| *s).map(|_| StreamOptions {
        include_usage: true,
    });

    let user = req.metadata.as_ref().and_then(|m| m.user_id.clone());

    ChatCompletionRequest {
        model: req.model.clone(),
        messages,
        max_tokens: Some(max_tokens),
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        stream_options,
        tools,
        tool_choice,
        stop: req.stop_sequences.clone(),
        user,
    }
}

/// A single Anthropic message can expand to multiple `OpenAI` messages
/// (e.g. a user message with `tool_result` blocks becomes separate tool-role
/// messages).
fn translate_message(msg: &Message, profile: &TargetProfile) -> Vec<ChatMessage> {
    let blocks = msg.content.blocks();

    match msg.role {
        Role::User => translate_user_message(&blocks, profile),
        Role::Assistant => translate_assistant_message(&blocks),
    }
}

fn translate_user_message(blocks: &[ContentBlock], profile: &TargetProfile) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    let mut run: Vec<ContentBlock> = Vec::new();

    let flush_run = |run: &mut Vec<ContentBlock>, messages: &mut Vec<ChatMessage>| {
        if run.is_empty() {
            return;
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: Some(user_run_content(run, profile)),
            tool_calls: None,
            tool_call_id: None,
        });
        run.clear();
    };

    for block in blocks {
        match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                // Tool results break the run: each becomes its own
                // tool-role message, in source order.
                flush_run(&mut run, &mut messages);

                let mut text = flatten::tool_result_text(content.as_ref());
                if *is_error == Some(true) {
                    text = format!("ERROR: {text}");
                }
                if profile.flatten_content {
                    text = format!("Tool Result: {text}");
                }

                messages.push(ChatMessage {
                    role: "tool".to_string(),
                    content: Some(ChatContent::Text(text)),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                });
            }
            ContentBlock::ToolUse { name, .. } => {
                tracing::warn!(tool = %name, "dropping tool_use block in user content");
            }
            other => run.push(other.clone()),
        }
    }

    flush_run(&mut run, &mut messages);

    // An empty message still has to reach the provider as something.
    if messages.is_empty() {
        let content = if profile.flatten_content {
            flatten::EMPTY_PLACEHOLDER.to_string()
        } else {
            String::new()
        };
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: Some(ChatContent::Text(content)),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    messages
}

/// Render a contiguous run of non-tool-result blocks as one user message
/// body: plain text when flattening, content parts otherwise.
fn user_run_content(run: &[ContentBlock], profile: &TargetProfile) -> ChatContent {
    if profile.flatten_content {
        return ChatContent::Text(flatten::flatten_blocks(run));
    }

    let mut parts: Vec<ContentPart> = Vec::new();
    for block in run {
        match block {
            ContentBlock::Text { text } => {
                parts.push(ContentPart::Text { text: text.clone() });
            }
            ContentBlock::Image { source } => {
                let data_uri = format!("data:{};base64,{}", source.media_type, source.data);
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrlDetail { url: data_uri },
                });
            }
            ContentBlock::Unknown(value) => {
                tracing::warn!(block = %value, "dropping unknown content block");
            }
            ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => {}
        }
    }

    if parts.is_empty() {
        return ChatContent::Text(String::new());
    }
    if parts.len() == 1 {
        if let ContentPart::Text { text } = &parts[0] {
            return ChatContent::Text(text.clone());
        }
    }
    ChatContent::Parts(parts)
}

fn translate_assistant_message(blocks: &[ContentBlock]) -> Vec<ChatMessage> {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ChatToolCall> = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => {
                text_parts.push(text.clone());
            }
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ChatToolCall {
                    id: Some(id.clone()),
                    call_type: Some("function".to_string()),
                    function: ChatToolCallFunction {
                        name: name.clone(),
                        arguments: serde_json::to_string(input).unwrap_or_default(),
                    },
                });
            }
            ContentBlock::Unknown(value) => {
                tracing::warn!(block = %value, "dropping unknown content block");
            }
            ContentBlock::Image { .. } | ContentBlock::ToolResult { .. } => {}
        }
    }

    let content = if text_parts.is_empty() {
        None
    } else {
        Some(ChatContent::Text(text_parts.join("")))
    };

    let tool_calls_opt = if tool_calls.is_empty() {
        None
    } else {
        Some(tool_calls)
    };

    vec![ChatMessage {
        role: "assistant".to_string(),
        content,
        tool_calls: tool_calls_opt,
        tool_call_id: None,
    }]
}

fn translate_tool_choice(tc: &ToolChoice) -> ChatToolChoice {
    match tc {
        ToolChoice::Auto => ChatToolChoice::Mode("auto".to_string()),
        ToolChoice::Any => ChatToolChoice::Mode("required".to_string()),
        ToolChoice::None => ChatToolChoice::Mode("none".to_string()),
        ToolChoice::Tool { name } => ChatToolChoice::Specific(ChatToolChoiceSpecific {
            choice_type: "function".to_string(),
            function: ChatToolChoiceFunction { name: name.clone() },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Provider;

    fn structured_profile() -> TargetProfile {
        TargetProfile {
            provider: Provider::Anthropic,
            supports_tools: true,
            flatten_content: false,
            max_tokens_ceiling: None,
        }
    }

    fn flattening_profile() -> TargetProfile {
        TargetProfile {
            provider: Provider::OpenAi,
            supports_tools: true,
            flatten_content: true,
            max_tokens_ceiling: Some(16384),
        }
    }

    fn no_tools_profile() -> TargetProfile {
        TargetProfile {
            provider: Provider::NvidiaNim,
            supports_tools: false,
            flatten_content: true,
            max_tokens_ceiling: None,
        }
    }

    fn request(json: serde_json::Value) -> MessagesRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_simple_text_request() {
        let req = request(serde_json::json!({
            "model": "openai/gpt-4o",
            "max_tokens": 1024,
            "system": "You are helpful",
            "messages": [{"role": "user", "content": "Hello"}],
        }));

        let result = anthropic_to_openai(&req, &flattening_profile());

        assert_eq!(result.model, "openai/gpt-4o");
        assert_eq!(result.messages.len(), 2); // system + user
        assert_eq!(result.messages[0].role, "system");
        assert_eq!(result.messages[1].role, "user");
        assert_eq!(result.max_tokens, Some(1024));
    }

    #[test]
    fn test_max_tokens_clamped_for_openai_family() {
        let req = request(serde_json::json!({
            "model": "openai/gpt-4o",
            "max_tokens": 200000,
            "messages": [{"role": "user", "content": "hi"}],
        }));

        let clamped = anthropic_to_openai(&req, &flattening_profile());
        assert_eq!(clamped.max_tokens, Some(16384));

        let unclamped = anthropic_to_openai(&req, &structured_profile());
        assert_eq!(unclamped.max_tokens, Some(200000));
    }

    #[test]
    fn test_tool_result_splits_into_tool_messages() {
        let req = request(serde_json::json!({
            "model": "openai/gpt-4o",
            "max_tokens": 1024,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "result 1"},
                    {"type": "text", "text": "Now continue"},
                ],
            }],
        }));

        let result = anthropic_to_openai(&req, &structured_profile());

        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[0].role, "tool");
        assert_eq!(result.messages[0].tool_call_id, Some("toolu_1".to_string()));
        assert_eq!(result.messages[1].role, "user");
    }

    #[test]
    fn test_tool_result_prefix_only_when_flattening() {
        let req = request(serde_json::json!({
            "model": "m",
            "max_tokens": 10,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "42"},
                ],
            }],
        }));

        let structured = anthropic_to_openai(&req, &structured_profile());
        let Some(ChatContent::Text(text)) = &structured.messages[0].content else {
            panic!("expected text content");
        };
        assert_eq!(text, "42");

        let flat = anthropic_to_openai(&req, &flattening_profile());
        let Some(ChatContent::Text(text)) = &flat.messages[0].content else {
            panic!("expected text content");
        };
        assert_eq!(text, "Tool Result: 42");
    }

    #[test]
    fn test_image_as_data_url_or_placeholder() {
        let req = request(serde_json::json!({
            "model": "m",
            "max_tokens": 10,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "what is this?"},
                    {"type": "image", "source": {
                        "type": "base64", "media_type": "image/png", "data": "aGk=",
                    }},
                ],
            }],
        }));

        let structured = anthropic_to_openai(&req, &structured_profile());
        let Some(ChatContent::Parts(parts)) = &structured.messages[0].content else {
            panic!("expected content parts");
        };
        assert_eq!(parts.len(), 2);
        let ContentPart::ImageUrl { image_url } = &parts[1] else {
            panic!("expected image part");
        };
        assert_eq!(image_url.url, "data:image/png;base64,aGk=");

        let flat = anthropic_to_openai(&req, &flattening_profile());
        let Some(ChatContent::Text(text)) = &flat.messages[0].content else {
            panic!("expected flattened text");
        };
        assert_eq!(
            *text,
            format!("what is this? {}", flatten::IMAGE_PLACEHOLDER)
        );
    }

    #[test]
    fn test_assistant_tool_use_becomes_tool_calls() {
        let req = request(serde_json::json!({
            "model": "m",
            "max_tokens": 10,
            "messages": [{
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Let me check."},
                    {"type": "tool_use", "id": "toolu_9", "name": "get_weather",
                     "input": {"location": "Paris"}},
                ],
            }],
        }));

        let result = anthropic_to_openai(&req, &structured_profile());
        let msg = &result.messages[0];
        assert_eq!(msg.role, "assistant");

        let calls = msg.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id.as_deref(), Some("toolu_9"));
        assert_eq!(calls[0].function.name, "get_weather");
        let parsed: serde_json::Value =
            serde_json::from_str(&calls[0].function.arguments).unwrap();
        assert_eq!(parsed["location"], "Paris");
    }

    #[test]
    fn test_capability_gate_strips_tools_and_choice() {
        let req = request(serde_json::json!({
            "model": "nvidia_nim/meta/llama3-8b",
            "max_tokens": 10,
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"name": "get_weather", "input_schema": {"type": "object"}}],
            "tool_choice": {"type": "any"},
        }));

        let result = anthropic_to_openai(&req, &no_tools_profile());
        assert!(result.tools.is_none());
        assert!(result.tool_choice.is_none());
    }

    #[test]
    fn test_tool_choice_mapping() {
        let req = request(serde_json::json!({
            "model": "m",
            "max_tokens": 10,
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"name": "t", "input_schema": {}}],
            "tool_choice": {"type": "any"},
        }));

        let result = anthropic_to_openai(&req, &structured_profile());
        match result.tool_choice.unwrap() {
            ChatToolChoice::Mode(mode) => assert_eq!(mode, "required"),
            other => panic!("expected mode string, got {other:?}"),
        }
    }

    #[test]
    fn test_streaming_sets_include_usage() {
        let req = request(serde_json::json!({
            "model": "m",
            "max_tokens": 10,
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}],
        }));

        let result = anthropic_to_openai(&req, &flattening_profile());
        assert_eq!(result.stream, Some(true));
        assert!(result.stream_options.unwrap().include_usage);
    }
}
