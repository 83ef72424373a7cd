//! Wire types for the OpenAI-shaped `/v1/chat/completions` dialect.
//!
//! Every request, response, and streaming chunk struct carries a flattened
//! [`UnknownFields`] catch-all so a field this proxy doesn't model round-trips instead
//! of being silently dropped: the upstream API evolves independently of this crate, and
//! a client may itself be relying on a field the proxy has no opinion about.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::messages::unknown_fields::UnknownFields;

/// JSON Schema for tool parameters. Kept as an opaque value: the proxy never
/// validates or introspects a tool's parameter schema, only relays it.
pub type JsonSchema = Value;

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    /// The virtual model name requested by the client.
    pub model: String,
    /// Conversation messages, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Repetition penalty based on token frequency so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    /// Penalty encouraging topic diversity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    /// Sequences that halt generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Whether the response is sent as server-sent events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Tools the model may call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// Controls how the model uses the tools above.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Whether the model may emit more than one tool call per turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    /// Fields this proxy doesn't model, preserved for re-serialization.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// A single message in the conversation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    /// Who sent this message.
    pub role: ChatRole,
    /// Plain-text content. `None` for assistant messages that only carry tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls emitted by the assistant in this turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For `role: tool` messages, the id of the call this responds to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Message sender role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instructions.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Tool execution result.
    Tool,
}

/// A callable tool definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tool {
    /// Always `"function"`; kept as a field rather than a unit variant so an
    /// unrecognized future tool type still round-trips instead of failing to parse.
    #[serde(rename = "type")]
    pub tool_type: ToolCallType,
    /// The function being described.
    pub function: FunctionDefinition,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Discriminator for tool/tool-call kinds. OpenAI only defines `function` today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallType {
    /// A callable function.
    Function,
}

/// Function metadata and parameter schema for a [`Tool`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionDefinition {
    /// Function name, unique among the request's tools.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON Schema describing the function's arguments.
    pub parameters: Box<JsonSchema>,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// How the model is allowed to use the request's tools.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// A named mode (`"auto"`, `"none"`, `"required"`).
    Mode(ToolChoiceMode),
    /// Forces a specific tool.
    Specific {
        /// Always `"function"`.
        #[serde(rename = "type")]
        tool_type: ToolCallType,
        /// The forced function.
        function: ToolChoiceFunction,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    /// A shape this proxy doesn't recognize, preserved opaquely.
    Unknown(Value),
}

/// Named tool-choice modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoiceMode {
    /// Never call a tool.
    None,
    /// Let the model decide.
    Auto,
    /// Must call at least one tool.
    Required,
}

/// Names the function forced by [`ToolChoice::Specific`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolChoiceFunction {
    /// Function name.
    pub name: String,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// A tool call emitted by the assistant.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolCall {
    /// Unique id, echoed back by a later `tool` message's `tool_call_id`.
    pub id: String,
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub tool_type: ToolCallType,
    /// The function invocation.
    pub function: FunctionCall,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// A function invocation: name plus JSON-encoded arguments.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionCall {
    /// Function name.
    pub name: String,
    /// Arguments as a JSON-encoded string (OpenAI never sends parsed JSON here).
    pub arguments: String,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// `POST /v1/chat/completions` response, unary case.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionResponse {
    /// Completion id.
    pub id: String,
    /// Always [`ObjectType::ChatCompletion`].
    pub object: ObjectType,
    /// Unix timestamp of creation.
    pub created: u64,
    /// Model that produced the response (rewritten from the virtual name to the
    /// concrete upstream model by the proxy).
    pub model: String,
    /// Response choices. The proxy only ever requests and forwards one.
    pub choices: Vec<ChatChoice>,
    /// Token accounting.
    pub usage: Usage,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// One candidate completion.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatChoice {
    /// Index among the response's choices.
    pub index: u32,
    /// The generated message.
    pub message: ChatMessage,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Reached a natural stop.
    Stop,
    /// Hit `max_tokens`.
    Length,
    /// Blocked by content policy.
    ContentFilter,
    /// Emitted one or more tool calls.
    ToolCalls,
}

/// Token accounting for a unary response or the final streaming chunk.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Usage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens in the completion.
    pub completion_tokens: u32,
    /// `prompt_tokens + completion_tokens`.
    pub total_tokens: u32,
}

/// Discriminates the shape of a JSON response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    /// A single model descriptor.
    Model,
    /// A list container (models, etc).
    List,
    /// A unary chat completion.
    #[serde(rename = "chat.completion")]
    ChatCompletion,
    /// One chunk of a streaming chat completion.
    #[serde(rename = "chat.completion.chunk")]
    ChatCompletionChunk,
}

/// One SSE `data:` frame of a streaming chat completion.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionChunk {
    /// Shared across every chunk of one streaming response.
    pub id: String,
    /// Always [`ObjectType::ChatCompletionChunk`].
    pub object: ObjectType,
    /// Unix timestamp of creation.
    pub created: u64,
    /// Model producing the response.
    pub model: String,
    /// Opaque fingerprint some providers attach; we don't emit our own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    /// Incremental choice updates.
    pub choices: Vec<ChatChoiceDelta>,
    /// Only present on the final chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Incremental update to one choice in a streaming response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatChoiceDelta {
    /// Index of the choice being updated.
    pub index: u32,
    /// Token log-probabilities; never populated by this proxy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Value>,
    /// The incremental content.
    pub delta: ChatMessageDelta,
    /// Set only on the chunk that ends this choice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Incremental message content for one streaming chunk.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatMessageDelta {
    /// Present only on the first chunk of a choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ChatRole>,
    /// Incremental text to append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Legacy single-function-call delta; this proxy never emits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,
    /// Incremental tool-call updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<StreamingToolCall>>,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// A tool call as it appears incrementally in a streaming response.
///
/// The first frame for a given `index` is always a `Start`; every subsequent
/// frame for that index is a `Delta` appending to `arguments`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StreamingToolCall {
    /// Introduces a new tool call.
    Start {
        /// Position among this turn's tool calls.
        index: usize,
        /// Call id, stable for the rest of the stream.
        id: String,
        /// Always `"function"`.
        #[serde(rename = "type")]
        r#type: ToolCallType,
        /// Name plus the (possibly empty) first fragment of arguments.
        function: FunctionStart,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    /// Appends to an already-started call's arguments.
    Delta {
        /// Matches a previously seen `Start.index`.
        index: usize,
        /// The argument fragment to append.
        function: FunctionDelta,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    /// A shape this proxy doesn't recognize, preserved opaquely.
    Unknown(Value),
}

/// Function identity plus the first argument fragment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionStart {
    /// Function name.
    pub name: String,
    /// First fragment of the JSON-encoded arguments (often empty).
    pub arguments: String,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// An argument fragment to append to an in-progress tool call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionDelta {
    /// Fragment to append.
    pub arguments: String,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// A single model descriptor, as returned by `GET /v1/models`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Model {
    /// Model id, usable in a request's `model` field.
    pub id: String,
    /// Always [`ObjectType::Model`].
    pub object: ObjectType,
    /// Unix timestamp; `0` when the upstream doesn't track creation time.
    pub created: u64,
    /// Organization that owns the model.
    pub owned_by: String,
}

/// `GET /v1/models` response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsResponse {
    /// Always [`ObjectType::List`].
    pub object: ObjectType,
    /// The available models.
    pub data: Vec<Model>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_tool_call_response() {
        let json = serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"x\":1}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        });

        let response: ChatCompletionResponse = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(response.choices[0].finish_reason, FinishReason::ToolCalls);

        let reserialized = serde_json::to_value(&response).unwrap();
        assert_eq!(reserialized["choices"][0]["finish_reason"], "tool_calls");
    }

    #[test]
    fn preserves_unknown_top_level_request_fields() {
        let json = serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [],
            "reasoning_effort": "high",
        });

        let request: ChatCompletionRequest = serde_json::from_value(json).unwrap();
        let reserialized = serde_json::to_value(&request).unwrap();
        assert_eq!(reserialized["reasoning_effort"], "high");
    }

    #[test]
    fn preserves_unknown_fields_on_a_message() {
        let json = serde_json::json!({
            "role": "assistant",
            "content": "hi",
            "refusal": null,
        });

        let message: ChatMessage = serde_json::from_value(json).unwrap();
        let reserialized = serde_json::to_value(&message).unwrap();
        assert_eq!(reserialized["refusal"], serde_json::Value::Null);
    }
}
