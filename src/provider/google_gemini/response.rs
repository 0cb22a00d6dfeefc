use crate::types::{ChatResponse, FinishReason, TokenUsage};

use super::types::{GeminiGenerateContentResponse, GeminiUsageMetadata};

/// 将 Gemini 响应映射为统一的 ChatResponse
///
/// 只拼接首个候选中的文本 part；思考片段与非文本 part 仅保留在 `raw` 中。
pub(crate) fn map_response(
    resp: GeminiGenerateContentResponse,
    provider: &str,
    model: &str,
) -> ChatResponse {
    let raw = serde_json::to_value(&resp).ok();
    let first = resp.candidates.first();

    let content = first
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter(|part| part.thought != Some(true))
                .filter_map(|part| part.text.as_deref())
                .collect::<String>()
        })
        .unwrap_or_default();

    let finish_reason = first
        .and_then(|candidate| candidate.finish_reason.as_deref())
        .map(convert_finish_reason)
        .unwrap_or(FinishReason::Stop);

    ChatResponse {
        content,
        model: Some(model.to_string()),
        provider: provider.to_string(),
        usage: resp.usage_metadata.as_ref().map(convert_usage),
        finish_reason: Some(finish_reason),
        attempts: 0,
        raw,
    }
}

/// FinishReason 文本 -> 通用 FinishReason
pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "MALFORMED_FUNCTION_CALL" => FinishReason::FunctionCall,
        // SAFETY / BLOCKLIST / PROHIBITED_CONTENT 等都视为内容过滤
        "SAFETY" | "RECITATION" | "LANGUAGE" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII"
        | "IMAGE_SAFETY" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

pub(crate) fn convert_usage(usage: &GeminiUsageMetadata) -> TokenUsage {
    TokenUsage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
    }
}
