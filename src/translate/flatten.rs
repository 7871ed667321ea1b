//! Plain-text rendering of structured content blocks.
//!
//! OpenAI-family endpoints and models without tool support reject the
//! structured content arrays Claude Code sends, so the converter routes
//! content through here when the target profile asks for flattening.

use super::anthropic_types::{ContentBlock, ToolResultContent};

pub const IMAGE_PLACEHOLDER: &str = "[Image content not supported in this context]";
/// Some endpoints reject empty message content outright.
pub const EMPTY_PLACEHOLDER: &str = "...";

/// Reduce a block sequence to one string: transformed blocks joined with
/// single spaces, trimmed, never empty.
pub fn flatten_blocks(blocks: &[ContentBlock]) -> String {
    let text = blocks
        .iter()
        .map(flatten_block)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string();

    if text.is_empty() {
        EMPTY_PLACEHOLDER.to_string()
    } else {
        text
    }
}

fn flatten_block(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Text { text } => text.clone(),
        ContentBlock::Image { .. } => IMAGE_PLACEHOLDER.to_string(),
        ContentBlock::ToolUse { name, input, .. } => {
            let args = serde_json::to_string(input).unwrap_or_default();
            format!("[Tool: {name}] Input: {args}")
        }
        ContentBlock::ToolResult { content, .. } => {
            format!("Tool Result: {}", tool_result_text(content.as_ref()))
        }
        ContentBlock::Unknown(value) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Concatenate the text of a tool result; nested text blocks are joined with
/// newlines.
pub fn tool_result_text(content: Option<&ToolResultContent>) -> String {
    match content {
        Some(ToolResultContent::Text(t)) => t.clone(),
        Some(ToolResultContent::Blocks(blocks)) => blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None => "No content provided".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::anthropic_types::ImageSource;

    #[test]
    fn test_image_becomes_placeholder() {
        let blocks = vec![
            ContentBlock::Text {
                text: "look:".to_string(),
            },
            ContentBlock::Image {
                source: ImageSource {
                    source_type: "base64".to_string(),
                    media_type: "image/png".to_string(),
                    data: "aGk=".to_string(),
                },
            },
        ];
        assert_eq!(flatten_blocks(&blocks), format!("look: {IMAGE_PLACEHOLDER}"));
    }

    #[test]
    fn test_tool_result_prefixed() {
        let blocks = vec![ContentBlock::ToolResult {
            tool_use_id: "toolu_1".to_string(),
            content: Some(ToolResultContent::Text("42".to_string())),
            is_error: None,
        }];
        assert_eq!(flatten_blocks(&blocks), "Tool Result: 42");
    }

    #[test]
    fn test_empty_content_becomes_placeholder() {
        assert_eq!(flatten_blocks(&[]), EMPTY_PLACEHOLDER);
        let blocks = vec![ContentBlock::Text {
            text: "   ".to_string(),
        }];
        // Whitespace-only text trims away entirely.
        assert_eq!(flatten_blocks(&blocks), EMPTY_PLACEHOLDER);
    }

    #[test]
    fn test_unknown_block_rendered_as_json() {
        let raw = serde_json::json!({"type": "document", "title": "notes"});
        let blocks = vec![ContentBlock::Unknown(raw.clone())];
        assert_eq!(flatten_blocks(&blocks), serde_json::to_string(&raw).unwrap());
    }

    #[test]
    fn test_tool_result_text_joins_blocks() {
        let content = ToolResultContent::Blocks(vec![
            ContentBlock::Text {
                text: "line 1".to_string(),
            },
            ContentBlock::Text {
                text: "line 2".to_string(),
            },
        ]);
        assert_eq!(tool_result_text(Some(&content)), "line 1\nline 2");
        assert_eq!(tool_result_text(None), "No content provided");
    }
}
