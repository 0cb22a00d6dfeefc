use crate::types::{ChatResponse, FinishReason, TokenUsage};

use super::types::{OpenAiChatResponse, OpenAiMessageContent, OpenAiUsage};

/// Maps the first choice of a chat-completions response onto [`ChatResponse`].
pub(crate) fn map_response(
    resp: OpenAiChatResponse,
    provider: &str,
    model: &str,
) -> ChatResponse {
    let raw = serde_json::to_value(&resp).ok();
    let first = resp.choices.first();
    let content = first
        .and_then(|choice| choice.message.as_ref())
        .and_then(|message| message.content.as_ref())
        .map(content_text)
        .unwrap_or_default();
    let finish_reason = first
        .and_then(|choice| choice.finish_reason.as_deref())
        .map(convert_finish_reason);

    ChatResponse {
        content,
        model: Some(model.to_string()),
        provider: provider.to_string(),
        usage: resp.usage.map(convert_usage),
        finish_reason,
        attempts: 0,
        raw,
    }
}

fn content_text(content: &OpenAiMessageContent) -> String {
    match content {
        OpenAiMessageContent::Text(text) => text.clone(),
        OpenAiMessageContent::Parts(parts) => parts
            .iter()
            .filter(|part| part.kind == "text")
            .filter_map(|part| part.text.as_deref())
            .collect(),
    }
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        "function_call" => FinishReason::FunctionCall,
        other => FinishReason::Other(other.to_string()),
    }
}

pub(crate) fn convert_usage(usage: OpenAiUsage) -> TokenUsage {
    TokenUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}
