//! Fallback token estimation for exchanges whose provider never reports usage.
//!
//! Real usage always comes from the provider's own accounting in [`UnifiedResponse::usage`];
//! this estimator only fires when that number is absent (dry-run synthesis, a dialect
//! that omits usage on a given response shape) so the usage record still carries a
//! number, flagged `estimated = true` rather than treated as billing fact.

use crate::messages::unified::{UnifiedContent, UnifiedContentContainer, UnifiedMessage, UnifiedRequest, UnifiedToolResultContent};

/// Characters per token, the same rough English-prose ratio used wherever this
/// product family estimates usage without an exact tokenizer on hand.
const CHARS_PER_TOKEN: usize = 4;

/// Estimated prompt token count for a request, summing the system prompt and every
/// message's content.
pub fn estimate_prompt_tokens(request: &UnifiedRequest) -> u32 {
    let mut chars = request.system.as_deref().map_or(0, str::len);
    chars += request.messages.iter().map(message_chars).sum::<usize>();
    chars_to_tokens(chars)
}

/// Estimated completion token count for a block of generated messages (one per
/// response choice).
pub fn estimate_completion_tokens(messages: &[UnifiedMessage]) -> u32 {
    chars_to_tokens(messages.iter().map(message_chars).sum())
}

fn message_chars(message: &UnifiedMessage) -> usize {
    match &message.content {
        UnifiedContentContainer::Text(text) => text.len(),
        UnifiedContentContainer::Blocks(blocks) => blocks.iter().map(content_chars).sum(),
    }
}

fn content_chars(content: &UnifiedContent) -> usize {
    match content {
        UnifiedContent::Text { text } => text.len(),
        UnifiedContent::Image { .. } => 0,
        UnifiedContent::ToolUse { input, .. } => input.to_string().len(),
        UnifiedContent::ToolResult { content, .. } => match content {
            UnifiedToolResultContent::Text(text) => text.len(),
            UnifiedToolResultContent::Multiple(parts) => parts.iter().map(String::len).sum(),
        },
    }
}

fn chars_to_tokens(chars: usize) -> u32 {
    (chars / CHARS_PER_TOKEN).max(1) as u32
}

/// Estimates tokens for raw accumulated text, for callers that only have character
/// counts on hand (e.g. the streaming relay, which sees text deltas rather than
/// whole messages).
pub(crate) fn estimate_tokens_for_chars(chars: usize) -> u32 {
    if chars == 0 { 0 } else { chars_to_tokens(chars) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::unified::UnifiedRole;

    fn text_message(role: UnifiedRole, text: &str) -> UnifiedMessage {
        UnifiedMessage {
            role,
            content: UnifiedContentContainer::Text(text.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    #[test]
    fn estimates_at_roughly_four_characters_per_token() {
        let request = UnifiedRequest {
            model: "tingly-test".to_string(),
            messages: vec![text_message(UnifiedRole::User, "0123456789ab")],
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
        };

        assert_eq!(estimate_prompt_tokens(&request), 3);
    }

    #[test]
    fn never_rounds_a_nonempty_prompt_down_to_zero() {
        let request = UnifiedRequest {
            model: "tingly-test".to_string(),
            messages: vec![text_message(UnifiedRole::User, "hi")],
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
        };

        assert_eq!(estimate_prompt_tokens(&request), 1);
    }
}
