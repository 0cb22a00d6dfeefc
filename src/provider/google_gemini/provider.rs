use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::LLMError;
use crate::http::{DynHttpTransport, HttpResponse, post_json_with_headers};
use crate::provider::LLMProvider;
use crate::retry::retry_after_from_headers;
use crate::types::{ChatResponse, ProviderRequest};

use super::error::{clarify_not_found, parse_gemini_error};
use super::request::build_gemini_body;
use super::response::map_response;
use super::types::GeminiGenerateContentResponse;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini 原生 GenerateContent Provider
pub struct GoogleGeminiProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) provider: String,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) default_model: Option<String>,
}

impl GoogleGeminiProvider {
    /// 创建 Provider
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

    /// A base URL without an API version segment gets `/v1beta`.
    pub(crate) fn endpoint(&self, model: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let model = model.strip_prefix("models/").unwrap_or(model);
        let last_segment = base.rsplit('/').next().unwrap_or_default();
        let versioned = last_segment.starts_with('v')
            && last_segment[1..].starts_with(|c: char| c.is_ascii_digit());
        if versioned {
            format!("{base}/models/{model}:generateContent")
        } else {
            format!("{base}/v1beta/models/{model}:generateContent")
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-goog-api-key".to_string(), self.api_key.clone());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
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
            Err(parse_gemini_error(
                status,
                &text,
                retry_after_from_headers(&headers),
            ))
        }
    }

    fn try_parse(&self, text: &str) -> Result<GeminiGenerateContentResponse, LLMError> {
        serde_json::from_str(text).map_err(|err| LLMError::Provider {
            provider: self.name(),
            message: format!("failed to parse generateContent response: {err}"),
        })
    }
}

#[async_trait]
impl LLMProvider for GoogleGeminiProvider {
    async fn chat(&self, request: ProviderRequest) -> Result<ChatResponse, LLMError> {
        let model = self.resolve_model(&request)?;
        let body = build_gemini_body(&request)?;
        let response = post_json_with_headers(
            self.transport.as_ref(),
            self.endpoint(&model),
            self.build_headers(),
            &body,
        )
        .await?;
        let text = self
            .ensure_success(response)
            .map_err(|err| clarify_not_found(err, &model))?;
        let parsed = self.try_parse(&text)?;
        Ok(map_response(parsed, &self.provider, &model))
    }

    fn name(&self) -> &'static str {
        "google_gemini"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::{Value, json};

    use super::*;
    use crate::http::{HttpRequest, HttpTransport};
    use crate::retry::{ErrorKind, classify};
    use crate::types::ChatMessage;

    struct RecordingTransport {
        status: u16,
        body: String,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingTransport {
        fn new(status: u16, body: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                status,
                body: body.into(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
            self.seen.lock().expect("lock").push(request);
            Ok(HttpResponse {
                status: self.status,
                headers: HashMap::new(),
                body: self.body.clone().into_bytes(),
            })
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("ping")],
            model: None,
            temperature: 0.7,
            max_tokens: 2048,
            extra: HashMap::from([("top_p".to_string(), json!(0.5))]),
        }
    }

    #[test]
    fn endpoint_uses_model_path() {
        let provider = GoogleGeminiProvider::new(RecordingTransport::new(200, ""), "gemini", "k");
        assert_eq!(
            provider.endpoint("gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            provider.endpoint("models/gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );

        let bare = GoogleGeminiProvider::new(RecordingTransport::new(200, ""), "gemini", "k")
            .with_base_url("https://proxy.example/");
        assert_eq!(
            bare.endpoint("gemini-2.5-pro"),
            "https://proxy.example/v1beta/models/gemini-2.5-pro:generateContent"
        );
        let pinned = GoogleGeminiProvider::new(RecordingTransport::new(200, ""), "gemini", "k")
            .with_base_url("https://proxy.example/v1");
        assert_eq!(
            pinned.endpoint("gemini-2.5-pro"),
            "https://proxy.example/v1/models/gemini-2.5-pro:generateContent"
        );
    }

    #[tokio::test]
    async fn chat_posts_native_body_with_api_key_header() {
        let transport = RecordingTransport::new(
            200,
            json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "pong"}]},
                    "finishReason": "MAX_TOKENS"
                }]
            })
            .to_string(),
        );
        let provider = GoogleGeminiProvider::new(transport.clone(), "gemini", "g-key")
            .with_default_model("gemini-2.5-pro");

        let response = provider.chat(request()).await.expect("chat succeeds");
        assert_eq!(response.content, "pong");
        assert_eq!(response.provider, "gemini");
        assert_eq!(response.model.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(
            response.finish_reason,
            Some(crate::types::FinishReason::Length)
        );

        let seen = transport.seen.lock().expect("lock");
        assert_eq!(
            seen[0].headers.get("x-goog-api-key").map(String::as_str),
            Some("g-key")
        );
        assert!(seen[0].url.ends_with("/models/gemini-2.5-pro:generateContent"));
        let body: Value =
            serde_json::from_slice(seen[0].body.as_deref().expect("body")).expect("json body");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], json!("be brief"));
        assert_eq!(body["contents"][0]["parts"][0]["text"], json!("User: ping\n"));
        // 原生接口不接受 OpenAI 风格的额外参数
        assert!(body.get("top_p").is_none());
    }

    #[tokio::test]
    async fn unknown_model_is_reported_as_fatal_not_found() {
        let transport = RecordingTransport::new(404, "<html>Not Found</html>");
        let provider = GoogleGeminiProvider::new(transport, "gemini", "g-key");
        let err = provider
            .chat(ProviderRequest {
                model: Some("gemini-9-ultra".to_string()),
                ..request()
            })
            .await
            .expect_err("404 should fail");
        match &err {
            LLMError::ModelNotFound { model, message } => {
                assert_eq!(model.as_deref(), Some("gemini-9-ultra"));
                assert!(message.contains("native generateContent"));
            }
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
        assert_eq!(classify(&err), ErrorKind::Fatal);
    }
}
