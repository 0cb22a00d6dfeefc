use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::LLMError;
use crate::http::{DynHttpTransport, HttpResponse, post_json_with_headers};
use crate::provider::LLMProvider;
use crate::retry::retry_after_from_headers;
use crate::types::{ChatResponse, ProviderRequest};

use super::error::parse_openai_error;
use super::request::build_openai_body;
use super::response::map_response;
use super::types::OpenAiChatResponse;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI Chat Completions 兼容 Provider
pub struct OpenAiChatProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) provider: String,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) default_model: Option<String>,
}

impl OpenAiChatProvider {
    /// 创建带默认 base_url 的 Provider，`provider` 为逻辑名称（如 `deepseek`）
    pub fn new(
        transport: DynHttpTransport,
        provider: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            provider: provider.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            default_model: None,
        }
    }

    /// 自定义 base_url
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 设置默认模型
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// `base_url` is used the way the OpenAI SDK uses it: `/chat/completions` is appended.
    pub(crate) fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        );
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers
    }

    fn resolve_model(&self, request: &ProviderRequest) -> Result<String, LLMError> {
        request
            .model
            .clone()
            .or_else(|| self.default_model.clone())
            .ok_or_else(|| LLMError::Validation {
                message: format!("model is required for provider {}", self.provider),
            })
    }

    fn ensure_success(&self, response: HttpResponse) -> Result<String, LLMError> {
        let HttpResponse {
            status,
            headers,
            body,
        } = response;
        let text = String::from_utf8(body).map_err(|err| LLMError::transport(err.to_string()))?;
        if (200..300).contains(&status) {
            Ok(text)
        } else {
            Err(parse_openai_error(
                status,
                &text,
                retry_after_from_headers(&headers),
            ))
        }
    }

    fn try_parse(&self, text: &str) -> Result<OpenAiChatResponse, LLMError> {
        serde_json::from_str(text).map_err(|err| LLMError::Provider {
            provider: self.name(),
            message: format!("failed to parse chat completion: {err}"),
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAiChatProvider {
    async fn chat(&self, request: ProviderRequest) -> Result<ChatResponse, LLMError> {
        let model = self.resolve_model(&request)?;
        let body = build_openai_body(&request, &model);
        let response = post_json_with_headers(
            self.transport.as_ref(),
            self.endpoint(),
            self.build_headers(),
            &body,
        )
        .await?;
        let text = self.ensure_success(response)?;
        let parsed = self.try_parse(&text)?;
        Ok(map_response(parsed, &self.provider, &model))
    }

    fn name(&self) -> &'static str {
        "openai_chat"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::{Value, json};

    use super::*;
    use crate::http::{HttpRequest, HttpTransport};
    use crate::types::ChatMessage;

    /// 记录请求并返回固定响应的 Transport
    struct RecordingTransport {
        status: u16,
        body: String,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
            self.seen.lock().expect("lock").push(request);
            Ok(HttpResponse {
                status: self.status,
                headers: HashMap::from([("retry-after".to_string(), "7".to_string())]),
                body: self.body.clone().into_bytes(),
            })
        }
    }

    fn request(model: Option<&str>) -> ProviderRequest {
        ProviderRequest {
            messages: vec![ChatMessage::user("hi")],
            model: model.map(str::to_string),
            temperature: 0.7,
            max_tokens: 2048,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn endpoint_appends_chat_completions() {
        let transport = Arc::new(RecordingTransport {
            status: 200,
            body: String::new(),
            seen: Mutex::new(Vec::new()),
        });
        let provider = OpenAiChatProvider::new(transport.clone(), "openai", "k");
        assert_eq!(
            provider.endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
        let provider = OpenAiChatProvider::new(transport, "deepseek", "k")
            .with_base_url("https://api.deepseek.com/");
        assert_eq!(
            provider.endpoint(),
            "https://api.deepseek.com/chat/completions"
        );
    }

    #[tokio::test]
    async fn chat_sends_bearer_and_maps_response() {
        let transport = Arc::new(RecordingTransport {
            status: 200,
            body: json!({
                "id": "x",
                "model": "deepseek-chat",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "pong"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
            })
            .to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let provider = OpenAiChatProvider::new(transport.clone(), "deepseek", "sk-test")
            .with_base_url("https://api.deepseek.com")
            .with_default_model("deepseek-chat");

        let response = provider.chat(request(None)).await.expect("chat succeeds");
        assert_eq!(response.content, "pong");
        assert_eq!(response.provider, "deepseek");
        assert_eq!(response.model.as_deref(), Some("deepseek-chat"));

        let seen = transport.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].headers.get("Authorization").map(String::as_str),
            Some("Bearer sk-test")
        );
        let body: Value =
            serde_json::from_slice(seen[0].body.as_deref().expect("body")).expect("json body");
        assert_eq!(body["model"], json!("deepseek-chat"));
    }

    #[tokio::test]
    async fn chat_maps_rate_limit_with_retry_after() {
        let transport = Arc::new(RecordingTransport {
            status: 429,
            body: r#"{"error":{"message":"slow down"}}"#.to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let provider = OpenAiChatProvider::new(transport, "openai", "k");
        match provider.chat(request(Some("gpt-4o"))).await {
            Err(LLMError::RateLimit { retry_after, .. }) => {
                assert_eq!(retry_after, Some(std::time::Duration::from_secs(7)));
            }
            other => panic!("expected RateLimit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn chat_without_any_model_is_validation_error() {
        let transport = Arc::new(RecordingTransport {
            status: 200,
            body: String::new(),
            seen: Mutex::new(Vec::new()),
        });
        let provider = OpenAiChatProvider::new(transport.clone(), "siliconflow", "k");
        assert!(matches!(
            provider.chat(request(None)).await,
            Err(LLMError::Validation { .. })
        ));
        assert!(transport.seen.lock().expect("lock").is_empty());
    }
}
