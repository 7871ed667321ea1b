//! Translate a non-streaming `OpenAI` Chat Completion response into an
//! Anthropic Messages response.

use super::anthropic_types::{MessagesResponse, ResponseContentBlock, Usage};
use super::openai_types::{ChatCompletionResponse, ChatToolCall};

/// Translate an `OpenAI` response into an Anthropic response.
///
/// `original_model` is what the client originally requested and is echoed
/// back. When `allow_tool_use` is false (the tool catalog was stripped by the
/// capability gate), upstream tool calls are rendered into the text block
/// instead of becoming `tool_use` blocks.
pub fn openai_to_anthropic(
    resp: &ChatCompletionResponse,
    original_model: &str,
    allow_tool_use: bool,
) -> MessagesResponse {
    let choice = resp.choices.first();

    let mut content: Vec<ResponseContentBlock> = Vec::new();

    if let Some(c) = choice {
        if let Some(ref text) = c.message.content {
            if !text.is_empty() {
                content.push(ResponseContentBlock::Text { text: text.clone() });
            }
        }

        if let Some(ref tool_calls) = c.message.tool_calls {
            if allow_tool_use {
                for tc in tool_calls {
                    content.push(tool_use_block(tc));
                }
            } else if !tool_calls.is_empty() {
                tracing::warn!(
                    count = tool_calls.len(),
                    "upstream produced tool calls for a gated target, rendering as text"
                );
                append_tool_calls_as_text(&mut content, tool_calls);
            }
        }
    }

    // Claude Code expects at least one content block.
    if content.is_empty() {
        content.push(ResponseContentBlock::Text {
            text: String::new(),
        });
    }

    let has_tool_use = content
        .iter()
        .any(|b| matches!(b, ResponseContentBlock::ToolUse { .. }));

    let mut stop_reason = choice
        .and_then(|c| c.finish_reason.as_deref())
        .map_or("end_turn", map_finish_reason);
    if has_tool_use {
        stop_reason = "tool_use";
    } else if stop_reason == "tool_use" {
        // finish_reason said tool_calls but the gate dropped them.
        stop_reason = "end_turn";
    }

    let usage = resp.usage.as_ref().map_or_else(Usage::default, |u| Usage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });

    MessagesResponse {
        id: mint_message_id(),
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: original_model.to_string(),
        stop_reason: Some(stop_reason.to_string()),
        stop_sequence: None,
        usage,
    }
}

fn tool_use_block(tc: &ChatToolCall) -> ResponseContentBlock {
    let input: serde_json::Value = match serde_json::from_str(&tc.function.arguments) {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(
                tool = %tc.function.name,
                "tool arguments are not valid JSON, wrapping raw string"
            );
            serde_json::json!({ "raw": tc.function.arguments })
        }
    };

    ResponseContentBlock::ToolUse {
        id: tc.id.clone().unwrap_or_else(mint_tool_id),
        name: tc.function.name.clone(),
        input,
    }
}

/// Downgrade path for targets whose tools were stripped: describe the calls
/// inside the text block rather than emitting `tool_use`.
fn append_tool_calls_as_text(content: &mut Vec<ResponseContentBlock>, calls: &[ChatToolCall]) {
    let rendered: String = calls
        .iter()
        .map(|tc| format!("Tool call: {}({})", tc.function.name, tc.function.arguments))
        .collect::<Vec<_>>()
        .join("\n");

    match content.first_mut() {
        Some(ResponseContentBlock::Text { text }) => {
            text.push_str("\n\n");
            text.push_str(&rendered);
        }
        _ => content.push(ResponseContentBlock::Text { text: rendered }),
    }
}

/// Map `OpenAI` `finish_reason` to Anthropic `stop_reason`.
pub fn map_finish_reason(reason: &str) -> &'static str {
    match reason {
        "stop" => "end_turn",
        "length" => "max_tokens",
        "tool_calls" | "function_call" => "tool_use",
        "content_filter" => "end_turn",
        _ => "end_turn",
    }
}

pub fn mint_message_id() -> String {
    format!("msg_{}", &uuid::Uuid::new_v4().simple().to_string()[..24])
}

pub fn mint_tool_id() -> String {
    format!("toolu_{}", &uuid::Uuid::new_v4().simple().to_string()[..24])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::openai_types::*;

    fn make_response(
        content: Option<String>,
        tool_calls: Option<Vec<ChatToolCall>>,
        finish_reason: Option<&str>,
    ) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: "chatcmpl-abc123".to_string(),
            object: "chat.completion".to_string(),
            created: 0,
            model: "gpt-4o".to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage {
                    role: "assistant".to_string(),
                    content,
                    tool_calls,
                },
                finish_reason: finish_reason.map(String::from),
            }],
            usage: Some(ChatUsage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
        }
    }

    fn weather_call(id: Option<&str>) -> ChatToolCall {
        ChatToolCall {
            id: id.map(String::from),
            call_type: Some("function".to_string()),
            function: ChatToolCallFunction {
                name: "get_weather".to_string(),
                arguments: "{\"location\":\"Paris\"}".to_string(),
            },
        }
    }

    #[test]
    fn test_simple_text_response() {
        let resp = make_response(Some("Hello.".to_string()), None, Some("stop"));
        let result = openai_to_anthropic(&resp, "claude-3-5-haiku-20241022", true);

        assert_eq!(result.response_type, "message");
        assert_eq!(result.role, "assistant");
        assert_eq!(result.model, "claude-3-5-haiku-20241022");
        assert_eq!(result.stop_reason, Some("end_turn".to_string()));
        assert!(result.id.starts_with("msg_"));
        assert_eq!(result.content.len(), 1);

        let ResponseContentBlock::Text { text } = &result.content[0] else {
            panic!("expected text content block");
        };
        assert_eq!(text, "Hello.");

        assert_eq!(result.usage.input_tokens, 10);
        assert_eq!(result.usage.output_tokens, 20);
    }

    #[test]
    fn test_tool_call_response() {
        let resp = make_response(
            Some("Let me check.".to_string()),
            Some(vec![weather_call(Some("call_abc"))]),
            Some("tool_calls"),
        );

        let result = openai_to_anthropic(&resp, "test-model", true);

        assert_eq!(result.content.len(), 2);
        assert_eq!(result.stop_reason, Some("tool_use".to_string()));

        let ResponseContentBlock::ToolUse { id, name, input } = &result.content[1] else {
            panic!("expected tool_use content block");
        };
        assert_eq!(id, "call_abc");
        assert_eq!(name, "get_weather");
        assert_eq!(input["location"], "Paris");
    }

    #[test]
    fn test_missing_tool_id_is_minted() {
        let resp = make_response(None, Some(vec![weather_call(None)]), Some("tool_calls"));
        let result = openai_to_anthropic(&resp, "m", true);

        let ResponseContentBlock::ToolUse { id, .. } = &result.content[0] else {
            panic!("expected tool_use content block");
        };
        assert!(id.starts_with("toolu_"));
    }

    #[test]
    fn test_unparseable_arguments_wrapped_as_raw() {
        let mut call = weather_call(Some("call_1"));
        call.function.arguments = "{not json".to_string();
        let resp = make_response(None, Some(vec![call]), Some("tool_calls"));

        let result = openai_to_anthropic(&resp, "m", true);
        let ResponseContentBlock::ToolUse { input, .. } = &result.content[0] else {
            panic!("expected tool_use content block");
        };
        assert_eq!(input["raw"], "{not json");
    }

    #[test]
    fn test_gated_target_downgrades_tool_calls_to_text() {
        let resp = make_response(
            Some("Checking.".to_string()),
            Some(vec![weather_call(Some("call_abc"))]),
            Some("tool_calls"),
        );

        let result = openai_to_anthropic(&resp, "nvidia_nim/meta/llama3-8b", false);

        assert_eq!(result.content.len(), 1);
        assert_eq!(result.stop_reason, Some("end_turn".to_string()));
        let ResponseContentBlock::Text { text } = &result.content[0] else {
            panic!("expected text content block");
        };
        assert!(text.contains("Tool call: get_weather"));
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(map_finish_reason("stop"), "end_turn");
        assert_eq!(map_finish_reason("length"), "max_tokens");
        assert_eq!(map_finish_reason("tool_calls"), "tool_use");
        assert_eq!(map_finish_reason("content_filter"), "end_turn");
        assert_eq!(map_finish_reason("anything-else"), "end_turn");
    }

    #[test]
    fn test_empty_response_keeps_one_block() {
        let resp = make_response(None, None, None);
        let result = openai_to_anthropic(&resp, "m", true);
        assert_eq!(result.content.len(), 1);
        assert_eq!(result.stop_reason, Some("end_turn".to_string()));
    }
}
