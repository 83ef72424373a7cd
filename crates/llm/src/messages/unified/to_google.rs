//! Conversions from unified types to Google (Gemini) protocol types.
//!
//! Google is upstream-only here too, so only this direction exists; response parsing lives in
//! [`super::from_google`]. Google's `functionResponse` part requires the function's
//! *name*, which OpenAI/Anthropic-shaped tool-result messages don't carry directly —
//! only the originating call's id. [`collect_tool_call_names`] resolves that by
//! scanning the request's prior assistant turns before converting.

use std::collections::HashMap;

use serde_json::Value;

use crate::messages::{google, unified};

impl From<unified::UnifiedRequest> for google::GenerateContentRequest {
    fn from(req: unified::UnifiedRequest) -> Self {
        let tool_names = collect_tool_call_names(&req.messages);

        let contents = req
            .messages
            .into_iter()
            .filter(|message| message.role != unified::UnifiedRole::System)
            .map(|message| content_from_message(message, &tool_names))
            .collect();

        let system_instruction = req.system.map(|text| google::SystemInstruction {
            parts: vec![google::Part::Text { text }],
        });

        let generation_config = Some(google::GenerationConfig {
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: req.top_k,
            max_output_tokens: req.max_tokens,
            stop_sequences: req.stop_sequences,
        });

        let tools = req.tools.map(|tools| {
            vec![google::Tool {
                function_declarations: tools.into_iter().map(google::FunctionDeclaration::from).collect(),
            }]
        });

        Self {
            contents,
            system_instruction,
            generation_config,
            tools,
            tool_config: req.tool_choice.map(google::ToolConfig::from),
        }
    }
}

/// Maps a tool call's id to its function name, by scanning every prior assistant
/// turn's tool calls (both the `tool_calls` field and inline `ToolUse` blocks).
fn collect_tool_call_names(messages: &[unified::UnifiedMessage]) -> HashMap<String, String> {
    let mut names = HashMap::new();

    for message in messages {
        if let Some(calls) = &message.tool_calls {
            for call in calls {
                names.insert(call.id.clone(), call.function.name.clone());
            }
        }

        if let unified::UnifiedContentContainer::Blocks(blocks) = &message.content {
            for block in blocks {
                if let unified::UnifiedContent::ToolUse { id, name, .. } = block {
                    names.insert(id.clone(), name.clone());
                }
            }
        }
    }

    names
}

fn content_from_message(message: unified::UnifiedMessage, tool_names: &HashMap<String, String>) -> google::Content {
    if message.role == unified::UnifiedRole::Tool {
        let name = message
            .tool_call_id
            .as_deref()
            .and_then(|id| tool_names.get(id))
            .cloned()
            .unwrap_or_default();

        return google::Content {
            role: Some("user".to_string()),
            parts: vec![google::Part::FunctionResponse {
                function_response: google::FunctionResponse {
                    name,
                    response: serde_json::json!({ "result": container_as_text(&message.content) }),
                },
            }],
        };
    }

    let role = match message.role {
        unified::UnifiedRole::Assistant => "model",
        _ => "user",
    };

    let mut parts = Vec::new();

    match message.content {
        unified::UnifiedContentContainer::Text(text) if !text.is_empty() => {
            parts.push(google::Part::Text { text });
        }
        unified::UnifiedContentContainer::Blocks(blocks) => {
            parts.extend(blocks.into_iter().map(|block| part_from_content(block, tool_names)));
        }
        _ => {}
    }

    if let Some(calls) = message.tool_calls {
        parts.extend(calls.into_iter().map(|call| google::Part::FunctionCall {
            function_call: google::FunctionCall {
                name: call.function.name,
                args: Value::from(call.function.arguments),
            },
        }));
    }

    google::Content {
        role: Some(role.to_string()),
        parts,
    }
}

fn part_from_content(block: unified::UnifiedContent, tool_names: &HashMap<String, String>) -> google::Part {
    match block {
        unified::UnifiedContent::Text { text } => google::Part::Text { text },
        unified::UnifiedContent::Image { source } => match source {
            unified::UnifiedImageSource::Base64 { media_type, data } => google::Part::InlineData {
                inline_data: google::Blob {
                    mime_type: media_type,
                    data,
                },
            },
            // Google requires inline bytes; a bare URL degrades to its text form rather
            // than silently dropping the reference.
            unified::UnifiedImageSource::Url { url } => google::Part::Text { text: url },
        },
        unified::UnifiedContent::ToolUse { name, input, .. } => google::Part::FunctionCall {
            function_call: google::FunctionCall { name, args: input },
        },
        unified::UnifiedContent::ToolResult {
            tool_use_id, content, ..
        } => {
            let name = tool_names.get(&tool_use_id).cloned().unwrap_or_default();
            let text = match content {
                unified::UnifiedToolResultContent::Text(text) => text,
                unified::UnifiedToolResultContent::Multiple(parts) => parts.join("\n"),
            };
            google::Part::FunctionResponse {
                function_response: google::FunctionResponse {
                    name,
                    response: serde_json::json!({ "result": text }),
                },
            }
        }
    }
}

fn container_as_text(container: &unified::UnifiedContentContainer) -> String {
    match container {
        unified::UnifiedContentContainer::Text(text) => text.clone(),
        unified::UnifiedContentContainer::Blocks(blocks) => {
            blocks.iter().filter_map(|block| block.as_text()).collect::<Vec<_>>().join("")
        }
    }
}

impl From<unified::UnifiedTool> for google::FunctionDeclaration {
    fn from(tool: unified::UnifiedTool) -> Self {
        Self {
            name: tool.function.name,
            description: tool.function.description,
            parameters: *tool.function.parameters,
        }
    }
}

impl From<unified::UnifiedToolChoice> for google::ToolConfig {
    fn from(choice: unified::UnifiedToolChoice) -> Self {
        let (mode, allowed_function_names) = match choice {
            unified::UnifiedToolChoice::Mode(unified::UnifiedToolChoiceMode::None) => {
                (google::FunctionCallingMode::None, None)
            }
            unified::UnifiedToolChoice::Mode(unified::UnifiedToolChoiceMode::Auto) => {
                (google::FunctionCallingMode::Auto, None)
            }
            unified::UnifiedToolChoice::Mode(unified::UnifiedToolChoiceMode::Required) => {
                (google::FunctionCallingMode::Any, None)
            }
            unified::UnifiedToolChoice::Specific { function } => (google::FunctionCallingMode::Any, Some(vec![function.name])),
        };

        Self {
            function_calling_config: google::FunctionCallingConfig {
                mode,
                allowed_function_names,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_message_becomes_a_function_response_with_resolved_name() {
        let req = unified::UnifiedRequest {
            model: "gemini-1.5-pro".to_string(),
            messages: vec![
                unified::UnifiedMessage {
                    role: unified::UnifiedRole::Assistant,
                    content: unified::UnifiedContentContainer::Text(String::new()),
                    tool_calls: Some(vec![unified::UnifiedToolCall {
                        id: "call_1".to_string(),
                        function: unified::UnifiedFunctionCall {
                            name: "get_weather".to_string(),
                            arguments: unified::UnifiedArguments::Value(serde_json::json!({"city": "Paris"})),
                        },
                    }]),
                    tool_call_id: None,
                },
                unified::UnifiedMessage {
                    role: unified::UnifiedRole::Tool,
                    content: unified::UnifiedContentContainer::Text("18C and sunny".to_string()),
                    tool_calls: None,
                    tool_call_id: Some("call_1".to_string()),
                },
            ],
            system: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            top_k: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop_sequences: None,
            stream: None,
            tools: None,
            tool_choice: None,
            parallel_tool_calls: None,
            metadata: None,
            unknown_fields: Default::default(),
        };

        let google_req = google::GenerateContentRequest::from(req);

        let google::Part::FunctionResponse { function_response } = &google_req.contents[1].parts[0] else {
            panic!("expected a function response part");
        };
        assert_eq!(function_response.name, "get_weather");
    }
}
