use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::ConnectionMode;
use crate::config::{AdapterKind, ProviderSettings};
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::http::reqwest::default_dyn_transport;
use crate::types::{ChatResponse, ProviderRequest};

pub mod google_gemini;
pub mod openai_chat;

use google_gemini::GoogleGeminiProvider;
use openai_chat::OpenAiChatProvider;

/// 统一的 Provider Trait，每种请求形态实现一次
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// 提交完整请求并等待完整响应
    async fn chat(&self, request: ProviderRequest) -> Result<ChatResponse, LLMError>;

    /// 适配器名称，例如 `openai_chat`
    fn name(&self) -> &'static str;
}

/// 线程安全 Provider
pub type DynProvider = Arc<dyn LLMProvider>;

/// Builds provider connections; the seam tests replace with scripted providers.
pub trait ConnectionFactory: Send + Sync {
    /// Constructs a connection for `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection cannot be built, e.g. no API key could
    /// be resolved. Failures are never cached.
    fn connect(
        &self,
        settings: &ProviderSettings,
        mode: ConnectionMode,
    ) -> Result<DynProvider, LLMError>;
}

/// Shared handle to a connection factory.
pub type DynConnectionFactory = Arc<dyn ConnectionFactory>;

/// Per-request HTTP timeout used when the caller does not pick one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// 默认工厂：按 [`AdapterKind`] 构建 HTTP 适配器
///
/// Blocking and async connections get separate transports: the blocking path is
/// driven by the client's private runtime, the async path by the caller's.
pub struct HttpConnectionFactory {
    blocking: DynHttpTransport,
    nonblocking: DynHttpTransport,
}

impl HttpConnectionFactory {
    /// 使用 reqwest 默认 Transport，超时为 [`DEFAULT_REQUEST_TIMEOUT`]
    pub fn new() -> Result<Self, LLMError> {
        Self::with_request_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// 使用 reqwest Transport，每个请求最多等待 `timeout`
    pub fn with_request_timeout(timeout: Duration) -> Result<Self, LLMError> {
        Ok(Self {
            blocking: default_dyn_transport(Some(timeout))?,
            nonblocking: default_dyn_transport(Some(timeout))?,
        })
    }

    /// 两种模式共用同一个 Transport
    pub fn with_transport(transport: DynHttpTransport) -> Self {
        Self {
            blocking: transport.clone(),
            nonblocking: transport,
        }
    }

    fn transport(&self, mode: ConnectionMode) -> DynHttpTransport {
        match mode {
            ConnectionMode::Blocking => self.blocking.clone(),
            ConnectionMode::Async => self.nonblocking.clone(),
        }
    }
}

impl ConnectionFactory for HttpConnectionFactory {
    fn connect(
        &self,
        settings: &ProviderSettings,
        mode: ConnectionMode,
    ) -> Result<DynProvider, LLMError> {
        if settings.api_key.is_empty() {
            return Err(LLMError::Auth {
                message: format!(
                    "no API key configured for provider {} (set {})",
                    settings.provider,
                    crate::config::fallback_key_var(&settings.provider)
                ),
            });
        }

        debug!(
            provider = %settings.provider,
            mode = ?mode,
            adapter = ?settings.adapter,
            "building provider connection"
        );

        let transport = self.transport(mode);
        let provider: DynProvider = match settings.adapter {
            AdapterKind::OpenAiCompatible => {
                let mut provider =
                    OpenAiChatProvider::new(transport, &settings.provider, &settings.api_key);
                if let Some(base_url) = &settings.base_url {
                    provider = provider.with_base_url(base_url.clone());
                }
                if let Some(model) = &settings.default_model {
                    provider = provider.with_default_model(model.clone());
                }
                Arc::new(provider)
            }
            AdapterKind::GeminiNative => {
                let mut provider =
                    GoogleGeminiProvider::new(transport, &settings.provider, &settings.api_key);
                if let Some(base_url) = &settings.base_url {
                    provider = provider.with_base_url(base_url.clone());
                }
                if let Some(model) = &settings.default_model {
                    provider = provider.with_default_model(model.clone());
                }
                Arc::new(provider)
            }
        };
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::http::{HttpRequest, HttpResponse, HttpTransport};

    struct PanicTransport;

    #[async_trait]
    impl HttpTransport for PanicTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, LLMError> {
            panic!("send should not be called");
        }
    }

    fn factory() -> HttpConnectionFactory {
        HttpConnectionFactory::with_transport(Arc::new(PanicTransport))
    }

    #[test]
    fn connect_picks_adapter_from_settings() {
        let config = ProviderConfig {
            api_key: Some("k".to_string()),
            ..ProviderConfig::default()
        };
        let openai = factory()
            .connect(
                &ProviderSettings::from_config("deepseek", &config),
                ConnectionMode::Blocking,
            )
            .expect("deepseek connection");
        assert_eq!(openai.name(), "openai_chat");

        let gemini = factory()
            .connect(
                &ProviderSettings::from_config("gemini", &config),
                ConnectionMode::Async,
            )
            .expect("gemini connection");
        assert_eq!(gemini.name(), "google_gemini");

        let compat = ProviderConfig {
            base_url: Some("https://generativelanguage.googleapis.com/v1beta/openai/".to_string()),
            ..config
        };
        let gemini_compat = factory()
            .connect(
                &ProviderSettings::from_config("gemini", &compat),
                ConnectionMode::Blocking,
            )
            .expect("gemini compat connection");
        assert_eq!(gemini_compat.name(), "openai_chat");
    }

    #[tokio::test]
    async fn request_timeout_reaches_the_adapter_transport() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let config = ProviderConfig {
            api_key: Some("k".to_string()),
            base_url: Some(format!("http://{}/v1", listener.local_addr().expect("addr"))),
            model: Some("m".to_string()),
            ..ProviderConfig::default()
        };
        let factory = HttpConnectionFactory::with_request_timeout(Duration::from_millis(200))
            .expect("factory");
        let connection = factory
            .connect(
                &ProviderSettings::from_config("deepseek", &config),
                ConnectionMode::Async,
            )
            .expect("connection");

        let err = connection
            .chat(ProviderRequest {
                messages: vec![crate::types::ChatMessage::user("hi")],
                model: None,
                temperature: 0.7,
                max_tokens: 16,
                extra: Default::default(),
            })
            .await
            .expect_err("silent server");
        assert!(err.to_string().contains("timed out"), "{err}");
        drop(listener);
    }

    #[test]
    fn connect_without_key_is_an_auth_error() {
        let settings = ProviderSettings::from_config("keylessprovider", &ProviderConfig::default());
        match factory().connect(&settings, ConnectionMode::Blocking) {
            Err(LLMError::Auth { message }) => {
                assert!(message.contains("KEYLESSPROVIDER_API_KEY"), "{message}");
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected auth error"),
        }
    }
}
