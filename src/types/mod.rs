//! Shared data structures modeling chat requests and responses.
//!
//! These types are the provider-agnostic contract between callers, the routing
//! orchestrator, and the individual provider adapters.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chat role understood by every adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn of a conversation.
///
/// Content is forwarded byte-for-byte; the order of messages inside a request is
/// the conversation order and is never rearranged by the client.
///
/// # Examples
///
/// ```
/// # use dialecta_llm::types::{ChatMessage, Role};
/// let msg = ChatMessage::user("Summarize Rust traits.");
/// assert_eq!(msg.role, Role::User);
/// assert_eq!(msg.content, "Summarize Rust traits.");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Per-call knobs accepted by [`crate::client::LLMClient::chat`].
///
/// Every field is optional. `provider` falls back to the configured default,
/// `model`/`temperature`/`max_tokens` fall back to the provider configuration, and
/// the retry fields fall back to [`crate::retry::RetryPolicy::default`].
///
/// `model`, `api_key` and `base_url` are one-off overrides meant for the provider
/// the caller asked for; they are dropped whenever the request is served by a
/// provider reached through a sticky override or the fallback chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Requested provider name, e.g. `deepseek`.
    pub provider: Option<String>,
    /// Model identifier override.
    pub model: Option<String>,
    /// API key override for this call only.
    pub api_key: Option<String>,
    /// Base URL override for this call only.
    pub base_url: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum number of output tokens.
    pub max_tokens: Option<u32>,
    /// Attempts per provider before moving down the chain.
    pub max_retries: Option<u32>,
    /// Base delay of the exponential backoff.
    #[serde(default, with = "optional_secs")]
    pub retry_delay: Option<Duration>,
    /// Extra keyword parameters forwarded to OpenAI-compatible endpoints.
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// Chat request handed to the routing client.
///
/// # Examples
///
/// ```
/// # use dialecta_llm::types::{ChatMessage, ChatRequest};
/// let request = ChatRequest::new(vec![
///     ChatMessage::system("You are concise."),
///     ChatMessage::user("Hello"),
/// ])
/// .provider("deepseek")
/// .temperature(0.2);
/// assert_eq!(request.messages.len(), 2);
/// assert_eq!(request.options.provider.as_deref(), Some("deepseek"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Ordered conversation.
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub options: ChatOptions,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            options: ChatOptions::default(),
        }
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.options.provider = Some(provider.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.options.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.options.base_url = Some(base_url.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.options.max_retries = Some(max_retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.options.retry_delay = Some(delay);
        self
    }

    /// Adds a passthrough keyword parameter such as `top_p` or `response_format`.
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.extra.insert(key.into(), value);
        self
    }
}

/// Fully resolved request as seen by one adapter for one attempt.
///
/// The orchestrator builds one of these per candidate provider after applying
/// configuration defaults and the override passthrough rule.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRequest {
    pub messages: Vec<ChatMessage>,
    /// `None` lets the adapter fall back to its configured default model.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub extra: HashMap<String, Value>,
}

/// Reason a provider stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    FunctionCall,
    Other(String),
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// Provider-agnostic chat completion.
///
/// `raw` keeps the decoded provider payload for diagnostics only; nothing in the
/// client depends on its shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Completion text.
    pub content: String,
    /// Model that was asked for.
    pub model: Option<String>,
    /// Provider that actually served the request.
    pub provider: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<FinishReason>,
    /// Adapter invocations spent by the client on this call, including the successful one.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub raw: Option<Value>,
}

mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<f64>::deserialize(deserializer)?;
        // negative, non-finite or out-of-range values mean "use the default"
        Ok(secs.and_then(|secs| Duration::try_from_secs_f64(secs).ok()))
    }
}
