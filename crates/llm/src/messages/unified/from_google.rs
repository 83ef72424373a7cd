//! Conversions from Google (Gemini) response types to unified types.
//!
//! Google never appears on the ingress side, so there is no
//! `GenerateContentRequest -> UnifiedRequest` direction. Unlike OpenAI/Anthropic
//! responses, Google's response carries neither a response id nor a creation
//! timestamp nor a stable tool-call id, so the plain `From` pattern used by the
//! other dialects doesn't fit; the functions here take those as caller-supplied
//! parameters instead.

use std::borrow::Cow;

use crate::messages::{google, unified};

/// Synthesizes a stable-looking call id the same way the other dialects' wire ids
/// look (`call_N`), since Google never sends one of its own.
fn synthetic_call_id(index: usize) -> String {
    format!("call_{index}")
}

fn part_to_content(part: google::Part, next_call_index: &mut usize) -> Option<unified::UnifiedContent> {
    match part {
        google::Part::Text { text } => Some(unified::UnifiedContent::Text { text }),
        google::Part::InlineData { inline_data } => Some(unified::UnifiedContent::Image {
            source: unified::UnifiedImageSource::Base64 {
                media_type: inline_data.mime_type,
                data: inline_data.data,
            },
        }),
        google::Part::FunctionCall { function_call } => {
            let id = synthetic_call_id(*next_call_index);
            *next_call_index += 1;
            Some(unified::UnifiedContent::ToolUse {
                id,
                name: function_call.name,
                input: function_call.args,
            })
        }
        // Function responses only ever appear in requests we build ourselves, never in
        // a response we need to parse back.
        google::Part::FunctionResponse { .. } => None,
    }
}

fn candidate_to_message(candidate: google::Candidate) -> (unified::UnifiedMessage, Option<Vec<unified::UnifiedToolCall>>) {
    let mut next_call_index = 0;
    let mut tool_calls = Vec::new();

    let blocks: Vec<unified::UnifiedContent> = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| {
            let block = part_to_content(part, &mut next_call_index)?;
            if let unified::UnifiedContent::ToolUse { ref id, ref name, ref input } = block {
                tool_calls.push(unified::UnifiedToolCall {
                    id: id.clone(),
                    function: unified::UnifiedFunctionCall {
                        name: name.clone(),
                        arguments: unified::UnifiedArguments::Value(input.clone()),
                    },
                });
            }
            Some(block)
        })
        .collect();

    let tool_calls = if tool_calls.is_empty() { None } else { Some(tool_calls) };

    let message = unified::UnifiedMessage {
        role: unified::UnifiedRole::Assistant,
        content: unified::UnifiedContentContainer::Blocks(blocks),
        tool_calls: tool_calls.clone(),
        tool_call_id: None,
    };

    (message, tool_calls)
}

fn finish_reason_from(reason: google::FinishReason, has_tool_calls: bool) -> unified::UnifiedFinishReason {
    if has_tool_calls {
        return unified::UnifiedFinishReason::ToolCalls;
    }

    match reason {
        google::FinishReason::Stop => unified::UnifiedFinishReason::Stop,
        google::FinishReason::MaxTokens => unified::UnifiedFinishReason::Length,
        google::FinishReason::Safety | google::FinishReason::Recitation => unified::UnifiedFinishReason::ContentFilter,
        google::FinishReason::Other => unified::UnifiedFinishReason::Stop,
    }
}

impl From<google::UsageMetadata> for unified::UnifiedUsage {
    fn from(usage: google::UsageMetadata) -> Self {
        Self {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        }
    }
}

/// Builds a unary [`unified::UnifiedResponse`] from a complete `generateContent` reply.
///
/// `id`, `model`, and `created` are supplied by the caller (the provider dispatcher),
/// mirroring how `id`/`created` are synthesized for every dialect that doesn't send
/// its own, since usage recording needs a stable id regardless of dialect.
pub(crate) fn response_from_google(
    raw: google::GenerateContentResponse,
    id: String,
    model: String,
    created: u64,
) -> unified::UnifiedResponse {
    let usage = raw.usage_metadata.map(unified::UnifiedUsage::from).unwrap_or(unified::UnifiedUsage {
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
    });

    let Some(candidate) = raw.candidates.into_iter().next() else {
        return unified::UnifiedResponse {
            id,
            model,
            choices: vec![],
            usage,
            created,
            stop_reason: None,
            stop_sequence: None,
            unknown_fields: Default::default(),
        };
    };

    let finish_reason = candidate.finish_reason;
    let (message, tool_calls) = candidate_to_message(candidate);

    let finish_reason = finish_reason.map(|reason| finish_reason_from(reason, tool_calls.is_some()));
    let stop_reason = finish_reason.as_ref().map(|reason| match reason {
        unified::UnifiedFinishReason::Stop => unified::UnifiedStopReason::EndTurn,
        unified::UnifiedFinishReason::Length => unified::UnifiedStopReason::MaxTokens,
        unified::UnifiedFinishReason::ContentFilter => unified::UnifiedStopReason::EndTurn,
        unified::UnifiedFinishReason::ToolCalls => unified::UnifiedStopReason::ToolUse,
    });

    unified::UnifiedResponse {
        id,
        model,
        choices: vec![unified::UnifiedChoice {
            index: 0,
            message,
            finish_reason,
        }],
        usage,
        created,
        stop_reason,
        stop_sequence: None,
        unknown_fields: Default::default(),
    }
}

/// Builds one [`unified::UnifiedChunk`] from a `streamGenerateContent` frame.
///
/// Google's stream has no frame analogous to OpenAI's role-establishing first chunk;
/// the caller is responsible for emitting that once, up front, before the first chunk
/// produced here.
pub(crate) fn chunk_from_google(
    raw: google::GenerateContentResponse,
    id: Cow<'static, str>,
    model: Cow<'static, str>,
    created: u64,
) -> unified::UnifiedChunk {
    let usage = raw.usage_metadata.map(unified::UnifiedUsage::from);

    let Some(candidate) = raw.candidates.into_iter().next() else {
        return unified::UnifiedChunk {
            id,
            model,
            choices: vec![],
            usage,
            created,
            unknown_fields: Default::default(),
        };
    };

    let finish_reason = candidate.finish_reason;
    let (message, tool_calls) = candidate_to_message(candidate);
    let finish_reason = finish_reason.map(|reason| finish_reason_from(reason, tool_calls.is_some()));

    let content = match message.content {
        unified::UnifiedContentContainer::Blocks(blocks) => {
            Some(blocks.iter().filter_map(|block| block.as_text()).collect::<Vec<_>>().join(""))
        }
        unified::UnifiedContentContainer::Text(text) => Some(text),
    };
    let content = content.filter(|text| !text.is_empty());

    let streaming_tool_calls = tool_calls.map(|calls| {
        calls
            .into_iter()
            .enumerate()
            .map(|(index, call)| unified::UnifiedStreamingToolCall::Start {
                index,
                id: call.id,
                function: unified::UnifiedFunctionStart {
                    name: call.function.name,
                    arguments: match call.function.arguments {
                        unified::UnifiedArguments::Value(value) => serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string()),
                        unified::UnifiedArguments::String(s) => s,
                    },
                },
            })
            .collect()
    });

    unified::UnifiedChunk {
        id,
        model,
        choices: vec![unified::UnifiedChoiceDelta {
            index: 0,
            delta: unified::UnifiedMessageDelta {
                role: None,
                content,
                tool_calls: streaming_tool_calls,
            },
            finish_reason,
        }],
        usage,
        created,
        unknown_fields: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_function_call_part_becomes_a_tool_use_block_with_finish_reason_tool_calls() {
        let raw = google::GenerateContentResponse {
            candidates: vec![google::Candidate {
                content: Some(google::Content {
                    role: Some("model".to_string()),
                    parts: vec![google::Part::FunctionCall {
                        function_call: google::FunctionCall {
                            name: "get_weather".to_string(),
                            args: serde_json::json!({"city": "Paris"}),
                        },
                    }],
                }),
                finish_reason: Some(google::FinishReason::Stop),
                index: 0,
            }],
            usage_metadata: Some(google::UsageMetadata {
                prompt_token_count: 10,
                candidates_token_count: 5,
                total_token_count: 15,
            }),
            model_version: None,
        };

        let response = response_from_google(raw, "resp-1".to_string(), "gemini-1.5-pro".to_string(), 123);

        assert_eq!(response.choices[0].finish_reason, Some(unified::UnifiedFinishReason::ToolCalls));
        let tool_calls = response.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(tool_calls[0].function.name, "get_weather");
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[test]
    fn empty_candidates_yields_no_choices() {
        let raw = google::GenerateContentResponse {
            candidates: vec![],
            usage_metadata: None,
            model_version: None,
        };

        let response = response_from_google(raw, "resp-1".to_string(), "gemini-1.5-pro".to_string(), 0);
        assert!(response.choices.is_empty());
    }
}
