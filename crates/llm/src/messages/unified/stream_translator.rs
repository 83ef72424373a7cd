//! Buffers Anthropic's partial tool-call JSON across content-block boundaries before
//! handing events to the unified chunk conversion.
//!
//! Anthropic streams a tool call's `input` as a sequence of `input_json_delta`
//! fragments that are only valid JSON once concatenated. Forwarding each fragment as
//! its own unified chunk would hand dialect re-encoders (and, through them, clients) a
//! partial argument that looks like a complete one. This carries the state needed to
//! wait for the block's `content_block_stop` before emitting the reassembled argument.

use std::collections::HashMap;

use crate::messages::anthropic::{AnthropicContent, AnthropicContentDelta, AnthropicStreamEvent};
use crate::messages::unified::UnifiedChunk;

enum BlockState {
    /// A non-tool-use block (text, image): nothing to buffer, already forwarded.
    PassedThrough,
    /// An open tool call, accumulating `partial_json` fragments until block close.
    ToolCall { arguments: String },
}

/// Stateful transducer from Anthropic SSE events to [`UnifiedChunk`]s.
///
/// Tracks one [`BlockState`] per content-block index (Anthropic's `index` field) for
/// the lifetime of that block.
pub(crate) struct StreamTranslator {
    blocks: HashMap<u32, BlockState>,
}

impl StreamTranslator {
    pub(crate) fn new() -> Self {
        Self { blocks: HashMap::new() }
    }

    /// Feed one upstream event through the translator. Returns the chunks ready to
    /// hand to the client-side re-encoder. `content_block_start` and non-tool-call
    /// deltas pass through immediately; `input_json_delta` fragments are buffered per
    /// block index and only emitted, as one complete delta, once that block's
    /// `content_block_stop` arrives.
    pub(crate) fn translate(&mut self, event: AnthropicStreamEvent) -> Vec<UnifiedChunk> {
        match event {
            AnthropicStreamEvent::ContentBlockStart { index, content_block } => {
                let is_tool_use = matches!(content_block, AnthropicContent::ToolUse { .. });
                self.blocks.insert(
                    index,
                    if is_tool_use {
                        BlockState::ToolCall { arguments: String::new() }
                    } else {
                        BlockState::PassedThrough
                    },
                );
                vec![UnifiedChunk::from(AnthropicStreamEvent::ContentBlockStart { index, content_block })]
            }
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match (&delta, self.blocks.get_mut(&index)) {
                (AnthropicContentDelta::InputJsonDelta { partial_json }, Some(BlockState::ToolCall { arguments })) => {
                    arguments.push_str(partial_json);
                    Vec::new()
                }
                _ => vec![UnifiedChunk::from(AnthropicStreamEvent::ContentBlockDelta { index, delta })],
            },
            AnthropicStreamEvent::ContentBlockStop { index } => match self.blocks.remove(&index) {
                Some(BlockState::ToolCall { arguments }) if !arguments.is_empty() => {
                    vec![UnifiedChunk::from(AnthropicStreamEvent::ContentBlockDelta {
                        index,
                        delta: AnthropicContentDelta::InputJsonDelta { partial_json: arguments },
                    })]
                }
                _ => Vec::new(),
            },
            other => vec![UnifiedChunk::from(other)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::anthropic::AnthropicStreamMessageStart;
    use crate::messages::unified::UnifiedStreamingToolCall;

    #[test]
    fn buffers_fragmented_tool_call_arguments_until_block_close() {
        let mut translator = StreamTranslator::new();

        let start = translator.translate(AnthropicStreamEvent::ContentBlockStart {
            index: 0,
            content_block: AnthropicContent::ToolUse {
                id: "toolu_1".to_string(),
                name: "get_weather".to_string(),
                input: serde_json::json!({}),
                unknown_fields: Default::default(),
            },
        });
        assert_eq!(start.len(), 1, "the block-start itself still forwards immediately");

        let mut emitted = Vec::new();
        for fragment in [r#"{"locat"#, r#"ion": "#, r#""Paris"}"#] {
            emitted.extend(translator.translate(AnthropicStreamEvent::ContentBlockDelta {
                index: 0,
                delta: AnthropicContentDelta::InputJsonDelta {
                    partial_json: fragment.to_string(),
                },
            }));
        }
        assert!(emitted.is_empty(), "no partial argument should reach the client");

        let closed = translator.translate(AnthropicStreamEvent::ContentBlockStop { index: 0 });
        assert_eq!(closed.len(), 1, "exactly one reassembled delta at block close");

        let tool_calls = closed[0].choices[0].delta.tool_calls.as_ref().unwrap();
        match &tool_calls[0] {
            UnifiedStreamingToolCall::Delta { function, .. } => {
                assert_eq!(function.arguments, r#"{"location": "Paris"}"#);
            }
            other => panic!("expected a Delta variant carrying the reassembled JSON, got {other:?}"),
        }
    }

    #[test]
    fn empty_tool_call_arguments_emit_nothing_at_block_close() {
        let mut translator = StreamTranslator::new();
        translator.translate(AnthropicStreamEvent::ContentBlockStart {
            index: 0,
            content_block: AnthropicContent::ToolUse {
                id: "toolu_1".to_string(),
                name: "ping".to_string(),
                input: serde_json::json!({}),
                unknown_fields: Default::default(),
            },
        });

        let closed = translator.translate(AnthropicStreamEvent::ContentBlockStop { index: 0 });
        assert!(closed.is_empty(), "a tool call with no argument fragments has nothing to reassemble");
    }

    #[test]
    fn text_blocks_pass_through_without_buffering() {
        let mut translator = StreamTranslator::new();

        let start = translator.translate(AnthropicStreamEvent::ContentBlockStart {
            index: 0,
            content_block: AnthropicContent::Text {
                text: String::new(),
                unknown_fields: Default::default(),
            },
        });
        assert_eq!(start.len(), 1);

        let delta = translator.translate(AnthropicStreamEvent::ContentBlockDelta {
            index: 0,
            delta: AnthropicContentDelta::TextDelta {
                text: "hello".to_string(),
            },
        });
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].choices[0].delta.content.as_deref(), Some("hello"));

        let stop = translator.translate(AnthropicStreamEvent::ContentBlockStop { index: 0 });
        assert!(stop.is_empty(), "a text block close carries nothing to emit");
    }

    #[test]
    fn message_start_passes_through_untouched() {
        let mut translator = StreamTranslator::new();
        let chunks = translator.translate(AnthropicStreamEvent::MessageStart {
            message: AnthropicStreamMessageStart {
                id: "msg_1".to_string(),
                message_type: "message".to_string(),
                role: crate::messages::anthropic::AnthropicRole::Assistant,
                content: Vec::new(),
                model: "claude-3-opus-20240229".to_string(),
                usage: crate::messages::anthropic::AnthropicUsage {
                    input_tokens: 10,
                    output_tokens: 0,
                },
                unknown_fields: Default::default(),
            },
        });
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "msg_1");
    }
}
