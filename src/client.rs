//! Routing client: sticky overrides, fallback chain and per-provider retries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info, warn};

use crate::cache::{ConnectionCache, ConnectionMode};
use crate::config::{LlmConfig, ProviderSettings};
use crate::error::LLMError;
use crate::fallback::effective_chain;
use crate::overrides::{ContextKey, DEFAULT_STATE_PATH, FileOverrideStore, OverrideStore};
use crate::provider::{
    DEFAULT_REQUEST_TIMEOUT, DynConnectionFactory, DynProvider, HttpConnectionFactory,
};
use crate::retry::{DynSleeper, ErrorKind, RetryPolicy, ThreadSleeper, classify};
use crate::types::{ChatMessage, ChatOptions, ChatRequest, ChatResponse, ProviderRequest};

/// Shared handle to an override store.
pub type DynOverrideStore = Arc<dyn OverrideStore>;

/// LLM 调用入口
///
/// [`LLMClient::chat`] blocks the calling thread and walks the fallback chain;
/// [`LLMClient::chat_async`] retries only the requested provider. The client is
/// `Send + Sync` and meant to be shared behind an [`Arc`].
pub struct LLMClient {
    config: LlmConfig,
    context: Option<ContextKey>,
    store: DynOverrideStore,
    overrides: DashMap<String, String>,
    cache: ConnectionCache,
    factory: DynConnectionFactory,
    sleeper: DynSleeper,
    runtime: Option<Runtime>,
}

/// One resolved attempt: the connection plus the request it should receive.
struct Prepared {
    connection: DynProvider,
    request: ProviderRequest,
}

impl LLMClient {
    /// 创建 Builder
    pub fn builder() -> LLMClientBuilder {
        LLMClientBuilder::default()
    }

    /// Client with the configuration file, state file and HTTP adapters at their defaults.
    pub fn new() -> Result<Self, LLMError> {
        Self::builder().build()
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Snapshot of the sticky overrides for this client's context.
    pub fn overrides(&self) -> HashMap<String, String> {
        self.overrides
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Sends `request`, degrading along the fallback chain until a provider answers.
    ///
    /// Blocks the current thread, including during backoff sleeps. Inside async
    /// code prefer [`LLMClient::chat_async`] or `spawn_blocking`.
    ///
    /// # Errors
    ///
    /// Returns the last provider's error unchanged when every candidate failed.
    pub fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        if Handle::try_current().is_err() {
            return self.chat_blocking(request);
        }
        // the private runtime cannot be entered from a thread that already sits in one
        thread::scope(|scope| {
            scope
                .spawn(|| self.chat_blocking(request))
                .join()
                .unwrap_or_else(|_| {
                    Err(LLMError::Unknown {
                        message: "chat worker thread panicked".to_string(),
                    })
                })
        })
    }

    fn chat_blocking(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let runtime = self.runtime.as_ref().ok_or_else(|| LLMError::Unknown {
            message: "client runtime already shut down".to_string(),
        })?;

        let ChatRequest { messages, options } = request;
        let requested = self.requested_provider(&options);
        let effective = self
            .overrides
            .get(&requested)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| requested.clone());
        let substituted = effective != requested;
        if substituted {
            debug!(requested = %requested, effective = %effective, "using sticky provider override");
        }

        let chain = effective_chain(&effective, &self.config.fallback_chain);
        let policy = RetryPolicy::from_options(options.max_retries, options.retry_delay);
        let max_attempts = policy.attempts();
        let mut attempts = 0u32;
        let mut last_error = None;

        for (position, provider) in chain.iter().enumerate() {
            // one-off overrides belong to the provider the caller asked for
            let passthrough = !substituted && *provider == requested;

            for attempt in 0..max_attempts {
                attempts += 1;
                let result = self
                    .prepare(provider, &messages, &options, passthrough, ConnectionMode::Blocking)
                    .and_then(|prepared| {
                        runtime.block_on(prepared.connection.chat(prepared.request))
                    });

                let err = match result {
                    Ok(mut response) => {
                        response.attempts = attempts;
                        if *provider != requested {
                            self.remember(&requested, provider);
                        }
                        return Ok(response);
                    }
                    Err(err) => err,
                };

                warn!(
                    provider = %provider,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %err,
                    "llm attempt failed"
                );
                let give_up = classify(&err) == ErrorKind::Fatal || attempt + 1 == max_attempts;
                last_error = Some(err);
                if give_up {
                    break;
                }

                let delay = policy.backoff_for_attempt(attempt);
                debug!(provider = %provider, delay_ms = delay.as_millis() as u64, "backing off before retry");
                self.sleeper.sleep(delay);
            }

            if let Some(next) = chain.get(position + 1) {
                warn!(from = %provider, to = %next, "provider exhausted, falling back");
            }
        }

        Err(last_error.unwrap_or_else(|| LLMError::Unknown {
            message: "fallback chain was empty".to_string(),
        }))
    }

    /// Sends `request` without blocking, retrying only the requested provider.
    ///
    /// Backoff suspends the task with [`tokio::time::sleep`]. Sticky overrides
    /// are neither consulted nor updated.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error once the provider is exhausted or failed fatally.
    pub async fn chat_async(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let ChatRequest { messages, options } = request;
        let provider = self.requested_provider(&options);
        let policy = RetryPolicy::from_options(options.max_retries, options.retry_delay);
        let max_attempts = policy.attempts();
        let mut last_error = None;

        for attempt in 0..max_attempts {
            let result = match self.prepare(&provider, &messages, &options, true, ConnectionMode::Async)
            {
                Ok(prepared) => prepared.connection.chat(prepared.request).await,
                Err(err) => Err(err),
            };

            let err = match result {
                Ok(mut response) => {
                    response.attempts = attempt + 1;
                    return Ok(response);
                }
                Err(err) => err,
            };

            warn!(
                provider = %provider,
                attempt = attempt + 1,
                max_attempts,
                error = %err,
                "llm attempt failed"
            );
            let give_up = classify(&err) == ErrorKind::Fatal || attempt + 1 == max_attempts;
            last_error = Some(err);
            if give_up {
                break;
            }

            let delay = policy.backoff_for_attempt(attempt);
            debug!(provider = %provider, delay_ms = delay.as_millis() as u64, "backing off before retry");
            tokio::time::sleep(delay).await;
        }

        Err(last_error.unwrap_or_else(|| LLMError::Unknown {
            message: format!("no attempt was made for provider {provider}"),
        }))
    }

    fn requested_provider(&self, options: &ChatOptions) -> String {
        options
            .provider
            .clone()
            .unwrap_or_else(|| self.config.default_provider().to_string())
    }

    fn prepare(
        &self,
        provider: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
        passthrough: bool,
        mode: ConnectionMode,
    ) -> Result<Prepared, LLMError> {
        let config = self.config.provider_config(provider);
        let (model, api_key, base_url) = if passthrough {
            (
                options.model.clone(),
                options.api_key.as_deref(),
                options.base_url.as_deref(),
            )
        } else {
            (None, None, None)
        };

        let connection = if api_key.is_some() || base_url.is_some() {
            let settings = ProviderSettings::with_overrides(provider, &config, api_key, base_url);
            self.factory.connect(&settings, mode)?
        } else {
            let settings = ProviderSettings::from_config(provider, &config);
            self.cache
                .get_or_connect(&settings, mode, self.factory.as_ref())?
        };

        let request = ProviderRequest {
            messages: messages.to_vec(),
            model: model.or_else(|| config.model.clone()),
            temperature: options
                .temperature
                .unwrap_or_else(|| config.temperature_or_default()),
            max_tokens: options
                .max_tokens
                .unwrap_or_else(|| config.max_tokens_or_default()),
            extra: options.extra.clone(),
        };
        Ok(Prepared {
            connection,
            request,
        })
    }

    fn remember(&self, original: &str, stable: &str) {
        self.overrides
            .insert(original.to_string(), stable.to_string());
        self.store.save(self.context.as_ref(), original, stable);
        info!(original = %original, stable = %stable, "fallback succeeded, provider override recorded");
    }
}

impl Drop for LLMClient {
    fn drop(&mut self) {
        // a plain drop would panic when the client is released inside an async context
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// LLMClient 的 Builder
#[derive(Default)]
pub struct LLMClientBuilder {
    config: Option<LlmConfig>,
    config_path: Option<PathBuf>,
    context_id: Option<String>,
    store: Option<DynOverrideStore>,
    state_path: Option<PathBuf>,
    factory: Option<DynConnectionFactory>,
    sleeper: Option<DynSleeper>,
    request_timeout: Option<Duration>,
    load_dotenv: bool,
}

impl LLMClientBuilder {
    /// 直接使用已加载的配置
    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 从指定路径加载配置
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Scopes sticky overrides to `identifier`, e.g. the absolute path of the
    /// document being worked on. Without it nothing is persisted.
    pub fn context_id(mut self, identifier: impl Into<String>) -> Self {
        self.context_id = Some(identifier.into());
        self
    }

    /// Replaces the file-backed override store.
    pub fn override_store(mut self, store: DynOverrideStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Location of the override state file; defaults to [`DEFAULT_STATE_PATH`].
    pub fn state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub fn connection_factory(mut self, factory: DynConnectionFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Replaces the thread sleeper used between blocking retries.
    pub fn sleeper(mut self, sleeper: DynSleeper) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Per-request HTTP timeout of the built-in adapters; defaults to
    /// [`DEFAULT_REQUEST_TIMEOUT`]. Ignored when a connection factory is supplied.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Loads a `.env` file from the working directory before resolving anything.
    pub fn load_dotenv(mut self) -> Self {
        self.load_dotenv = true;
        self
    }

    /// 构建 LLMClient
    ///
    /// # Errors
    ///
    /// Fails only when the HTTP client or the internal runtime cannot be created.
    pub fn build(self) -> Result<LLMClient, LLMError> {
        if self.load_dotenv {
            match dotenvy::dotenv() {
                Ok(path) => debug!(path = %path.display(), "loaded .env"),
                Err(err) => debug!(error = %err, "no .env loaded"),
            }
        }

        let config = match self.config {
            Some(config) => config,
            None => LlmConfig::load(self.config_path.as_deref()),
        };
        let context = self.context_id.map(ContextKey::new);
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(FileOverrideStore::new(
                self.state_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH)),
            )),
        };
        let overrides: DashMap<String, String> =
            store.load(context.as_ref()).into_iter().collect();
        let factory = match self.factory {
            Some(factory) => factory,
            None => Arc::new(HttpConnectionFactory::with_request_timeout(
                self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            )?),
        };
        let sleeper = self.sleeper.unwrap_or_else(|| Arc::new(ThreadSleeper));
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("dialecta-llm")
            .enable_all()
            .build()
            .map_err(|err| LLMError::Unknown {
                message: format!("failed to start client runtime: {err}"),
            })?;

        Ok(LLMClient {
            config,
            context,
            store,
            overrides,
            cache: ConnectionCache::new(),
            factory,
            sleeper,
            runtime: Some(runtime),
        })
    }
}
