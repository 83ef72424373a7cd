//! Wire types for the Google (Gemini `generateContent`) dialect.
//!
//! Google is upstream-only: no ingress client ever speaks this dialect
//! to us, so only the request-building and response-parsing directions exist here —
//! there is no `from_google` request path, only [`crate::messages::unified::to_google`]
//! and the response-to-`Unified*` conversions next to it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /v1/models/{model}:generateContent` (or `:streamGenerateContent`).
#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest {
    /// Conversation turns, oldest first. Google has no `system` role; system text is
    /// carried out-of-band in `system_instruction`.
    pub contents: Vec<Content>,
    /// System-level instructions, separate from `contents`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    /// Sampling and length controls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    /// Tools (function declarations) the model may call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// Controls whether/which tools the model must call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
}

/// One turn of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    /// `"user"` or `"model"`; Google has no separate tool-result role, tool results
    /// are `user`-role content carrying a `function_response` part.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// The turn's content, in order.
    pub parts: Vec<Part>,
}

/// System instruction content, structurally identical to a roleless [`Content`].
#[derive(Debug, Clone, Serialize)]
pub struct SystemInstruction {
    /// Instruction text parts.
    pub parts: Vec<Part>,
}

/// One piece of a turn's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },
    /// Inline binary content (e.g. an image).
    InlineData {
        /// Inline binary payload.
        inline_data: Blob,
    },
    /// A model-issued function call.
    FunctionCall {
        /// The call.
        function_call: FunctionCall,
    },
    /// The result of a previously issued function call.
    FunctionResponse {
        /// The result.
        function_response: FunctionResponse,
    },
}

/// Base64-encoded inline binary content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blob {
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

/// A function call the model wants executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name.
    pub name: String,
    /// Parsed JSON arguments (Google, unlike OpenAI, sends structured args, not a string).
    pub args: Value,
}

/// The caller's result for a previously issued [`FunctionCall`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponse {
    /// Name of the function this responds to.
    pub name: String,
    /// The result, wrapped in an object per Google's convention.
    pub response: Value,
}

/// Sampling and length controls, Google's analogue of the unified request's knobs.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Top-k sampling cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Sequences that halt generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// A tool made available to the model; Google groups function declarations under one entry.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// The functions this tool exposes.
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// One callable function's name, description, and parameter schema.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDeclaration {
    /// Function name.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON Schema for the function's arguments.
    pub parameters: Value,
}

/// Controls whether/which tools the model must call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    /// Function-calling specific controls.
    pub function_calling_config: FunctionCallingConfig,
}

/// Mode plus an optional allow-list for function calling.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
    /// Calling mode.
    pub mode: FunctionCallingMode,
    /// If set, restricts the model to these function names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

/// Function-calling mode, Google's analogue of OpenAI's `tool_choice`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionCallingMode {
    /// The model decides freely.
    Auto,
    /// The model may not call any function.
    None,
    /// The model must call a function (optionally restricted by `allowed_function_names`).
    Any,
}

/// Response body for a unary `generateContent` call, and the shape of every chunk of a
/// `streamGenerateContent` call (later chunks simply have fewer populated fields).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Candidate completions. This proxy only ever requests one.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Token accounting; present on the first and/or last chunk depending on provider.
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    /// Upstream model id/version string.
    #[serde(default)]
    pub model_version: Option<String>,
}

/// One candidate completion.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// The generated content.
    #[serde(default)]
    pub content: Option<Content>,
    /// Why generation stopped; absent on non-final streaming chunks.
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    /// Index among the response's candidates.
    #[serde(default)]
    pub index: u32,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    /// Reached a natural stop.
    Stop,
    /// Hit the output token limit.
    MaxTokens,
    /// Blocked by a safety filter.
    Safety,
    /// Blocked for reciting training data.
    Recitation,
    /// Anything else, including values not yet known to this proxy.
    #[serde(other)]
    Other,
}

/// Token accounting for a `generateContent` response.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Tokens in the prompt.
    #[serde(default)]
    pub prompt_token_count: u32,
    /// Tokens in the generated candidates.
    #[serde(default)]
    pub candidates_token_count: u32,
    /// Total tokens billed for this call.
    #[serde(default)]
    pub total_token_count: u32,
}
