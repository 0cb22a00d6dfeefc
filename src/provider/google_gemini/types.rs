use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// GenerateContentResponse 顶层结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiGenerateContentResponse {
    /// 候选回答列表
    #[serde(default)]
    pub(crate) candidates: Vec<GeminiCandidate>,
    /// token 用量元信息
    #[serde(default, rename = "usageMetadata")]
    pub(crate) usage_metadata: Option<GeminiUsageMetadata>,
    /// 实际使用的模型版本
    #[serde(default, rename = "modelVersion")]
    pub(crate) model_version: Option<String>,
    /// 其余未映射字段，原样保留在 raw 中
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, Value>,
}

/// 单个候选回答
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiCandidate {
    #[serde(default)]
    pub(crate) content: Option<GeminiContent>,
    #[serde(default, rename = "finishReason")]
    pub(crate) finish_reason: Option<String>,
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, Value>,
}

/// 候选内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(default)]
    pub(crate) parts: Vec<GeminiPart>,
    #[serde(default)]
    pub(crate) role: Option<String>,
}

/// Content.part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiPart {
    /// 纯文本
    #[serde(default)]
    pub(crate) text: Option<String>,
    /// 思考模型的推理片段标记
    #[serde(default)]
    pub(crate) thought: Option<bool>,
    /// 函数调用、内联数据等其它字段
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, Value>,
}

/// UsageMetadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    pub(crate) prompt_token_count: Option<u64>,
    #[serde(rename = "candidatesTokenCount", default)]
    pub(crate) candidates_token_count: Option<u64>,
    #[serde(rename = "totalTokenCount", default)]
    pub(crate) total_token_count: Option<u64>,
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, Value>,
}
