//! State machine translating `OpenAI` streaming chunks into Anthropic SSE
//! events.
//!
//! The [`StreamTranslator`] consumes `ChatCompletionChunk`s one at a time and
//! emits the corresponding Anthropic stream events, maintaining the ordering
//! guarantees the Messages API makes:
//!
//! - every `content_block_start` gets exactly one `content_block_stop`,
//! - block indices are dense, starting at 0, in emission order,
//! - the text block closes before any `tool_use` block opens, and text never
//!   resumes afterwards (late text deltas are dropped),
//! - exactly one `message_delta` carries the terminal stop reason, followed
//!   by `message_stop`.
//!
//! The `[DONE]` terminator line is the SSE writer's job, not an event here.

use super::anthropic_types::{
    Delta, DeltaUsage, MessageDeltaBody, MessagesResponse, ResponseContentBlock, StreamEvent,
    Usage,
};
use super::openai_types::ChatCompletionChunk;
use super::response::{map_finish_reason, mint_message_id, mint_tool_id};

/// An open `tool_use` block, keyed by the provider's tool-call slot.
#[derive(Debug, Clone)]
struct ToolBlock {
    slot: u64,
    index: usize,
    id: String,
    name: String,
    args_buffer: String,
}

/// Single-consumer state machine; feed chunks with [`process_chunk`], then
/// call [`finish`] when the upstream stream ends (or [`abort`] if it failed).
///
/// [`process_chunk`]: StreamTranslator::process_chunk
/// [`finish`]: StreamTranslator::finish
/// [`abort`]: StreamTranslator::abort
#[derive(Debug)]
pub struct StreamTranslator {
    model: String,
    msg_id: String,
    started: bool,
    terminated: bool,
    text_index: Option<usize>,
    tool_blocks: Vec<ToolBlock>,
    next_block_index: usize,
    input_tokens: u64,
    output_tokens: u64,
}

impl StreamTranslator {
    /// `model` is the name echoed in `message_start`: the client's original
    /// request, not the upstream target.
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            msg_id: mint_message_id(),
            started: false,
            terminated: false,
            text_index: None,
            tool_blocks: Vec::new(),
            next_block_index: 0,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Process a single upstream chunk, returning the events to emit.
    pub fn process_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<StreamEvent> {
        if self.terminated {
            return Vec::new();
        }

        let mut events = Vec::new();

        if let Some(ref usage) = chunk.usage {
            self.input_tokens = usage.prompt_tokens;
            self.output_tokens = usage.completion_tokens;
        }

        if !self.started {
            events.push(self.make_message_start());
            events.push(StreamEvent::Ping);
            self.started = true;
        }

        let Some(choice) = chunk.choices.first() else {
            return events;
        };

        if let Some(content) = choice.delta.content.as_deref().filter(|s| !s.is_empty()) {
            if self.tool_blocks.is_empty() {
                let index = match self.text_index {
                    Some(index) => index,
                    None => {
                        let index = self.next_block_index;
                        self.next_block_index += 1;
                        self.text_index = Some(index);
                        events.push(StreamEvent::ContentBlockStart {
                            index,
                            content_block: ResponseContentBlock::Text {
                                text: String::new(),
                            },
                        });
                        index
                    }
                };
                events.push(StreamEvent::ContentBlockDelta {
                    index,
                    delta: Delta::TextDelta {
                        text: content.to_string(),
                    },
                });
            } else {
                // Text after a tool block would violate Anthropic's block
                // ordering; drop it.
                tracing::debug!(len = content.len(), "dropping text delta after tool block");
            }
        }

        if let Some(ref tool_calls) = choice.delta.tool_calls {
            for tc in tool_calls {
                // Any tool activity closes the text block for good.
                if let Some(index) = self.text_index.take() {
                    events.push(StreamEvent::ContentBlockStop { index });
                }

                let known = self.tool_blocks.iter().position(|b| b.slot == tc.index);
                let pos = match known {
                    Some(pos) => {
                        if let Some(name) = tc.function.as_ref().and_then(|f| f.name.as_deref())
                        {
                            // Providers are expected to send the name before
                            // any arguments; a late fragment only updates our
                            // state, the emitted start keeps its snapshot.
                            self.tool_blocks[pos].name.push_str(name);
                        }
                        pos
                    }
                    None => {
                        let index = self.next_block_index;
                        self.next_block_index += 1;

                        let id = tc.id.clone().unwrap_or_else(mint_tool_id);
                        let name = tc
                            .function
                            .as_ref()
                            .and_then(|f| f.name.clone())
                            .unwrap_or_default();

                        events.push(StreamEvent::ContentBlockStart {
                            index,
                            content_block: ResponseContentBlock::ToolUse {
                                id: id.clone(),
                                name: name.clone(),
                                input: serde_json::Value::Object(serde_json::Map::new()),
                            },
                        });

                        self.tool_blocks.push(ToolBlock {
                            slot: tc.index,
                            index,
                            id,
                            name,
                            args_buffer: String::new(),
                        });
                        self.tool_blocks.len() - 1
                    }
                };

                if let Some(args) = tc
                    .function
                    .as_ref()
                    .and_then(|f| f.arguments.as_deref())
                    .filter(|a| !a.is_empty())
                {
                    let block = &mut self.tool_blocks[pos];
                    block.args_buffer.push_str(args);
                    events.push(StreamEvent::ContentBlockDelta {
                        index: block.index,
                        delta: Delta::InputJsonDelta {
                            partial_json: args.to_string(),
                        },
                    });
                }
            }
        }

        if let Some(ref reason) = choice.finish_reason {
            let reason = reason.clone();
            events.append(&mut self.terminate(Some(&reason)));
        }

        events
    }

    /// Call when the upstream stream ends without a terminal `finish_reason`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        self.terminate(None)
    }

    /// Call when the upstream stream failed mid-flight. Closes any open
    /// blocks and ends the stream legally with `end_turn`; the error itself
    /// is the caller's to log.
    pub fn abort(&mut self) -> Vec<StreamEvent> {
        if self.terminated {
            return Vec::new();
        }

        let mut events = Vec::new();
        if !self.started {
            events.push(self.make_message_start());
            events.push(StreamEvent::Ping);
            self.started = true;
        }

        events.append(&mut self.close_open_blocks());
        self.terminated = true;

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some("end_turn".to_string()),
                stop_sequence: None,
            },
            usage: DeltaUsage {
                output_tokens: self.output_tokens,
            },
        });
        events.push(StreamEvent::MessageStop);
        events
    }

    /// Assembled tool inputs so far, in block order. Each entry is
    /// `(id, name, concatenated argument fragments)`.
    pub fn assembled_tool_inputs(&self) -> Vec<(String, String, String)> {
        self.tool_blocks
            .iter()
            .map(|b| (b.id.clone(), b.name.clone(), b.args_buffer.clone()))
            .collect()
    }

    fn terminate(&mut self, finish_reason: Option<&str>) -> Vec<StreamEvent> {
        if self.terminated {
            return Vec::new();
        }

        let mut events = Vec::new();
        if !self.started {
            events.push(self.make_message_start());
            events.push(StreamEvent::Ping);
            self.started = true;
        }

        events.append(&mut self.close_open_blocks());
        self.terminated = true;

        let mut stop_reason = finish_reason.map_or("end_turn", map_finish_reason);
        if !self.tool_blocks.is_empty() {
            stop_reason = "tool_use";
        }

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop_reason.to_string()),
                stop_sequence: None,
            },
            usage: DeltaUsage {
                output_tokens: self.output_tokens,
            },
        });
        events.push(StreamEvent::MessageStop);

        events
    }

    /// Close the text block (if still open) and then every tool block in
    /// emission order.
    fn close_open_blocks(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if let Some(index) = self.text_index.take() {
            events.push(StreamEvent::ContentBlockStop { index });
        }
        for block in &self.tool_blocks {
            events.push(StreamEvent::ContentBlockStop {
                index: block.index,
            });
        }
        events
    }

    fn make_message_start(&self) -> StreamEvent {
        StreamEvent::MessageStart {
            message: MessagesResponse {
                id: self.msg_id.clone(),
                response_type: "message".to_string(),
                role: "assistant".to_string(),
                content: Vec::new(),
                model: self.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage {
                    input_tokens: self.input_tokens,
                    output_tokens: 0,
                },
            },
        }
    }
}
