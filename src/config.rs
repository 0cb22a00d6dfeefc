//! Provider configuration loading and resolution.
//!
//! The configuration file is a JSON object keyed by provider name plus a
//! `provider.default` entry:
//!
//! ```json
//! {
//!   "provider": { "default": "deepseek" },
//!   "deepseek": {
//!     "api_key": "${DEEPSEEK_API_KEY}",
//!     "base_url": "https://api.deepseek.com",
//!     "model": "deepseek-chat",
//!     "temperature": 0.7,
//!     "max_tokens": 4096
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Environment variable that points at the configuration file.
pub const CONFIG_PATH_ENV: &str = "DIALECTA_LLM_CONFIG";
/// Location consulted when neither an explicit path nor [`CONFIG_PATH_ENV`] is given.
pub const DEFAULT_CONFIG_PATH: &str = "llm/config.json";
/// Provider used when neither the request nor the configuration names one.
pub const DEFAULT_PROVIDER: &str = "openai";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
/// Providers ordered by reliability/capability, tried in this order on failure.
pub const DEFAULT_FALLBACK_CHAIN: [&str; 5] =
    ["deepseek", "dashscope", "siliconflow", "gemini", "openai"];
/// The one provider with a native (non OpenAI-compatible) adapter.
pub const GEMINI_PROVIDER: &str = "gemini";

/// 单个 provider 的配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// 字面量密钥，或 `${ENV_NAME}` 占位符
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// 默认模型
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl ProviderConfig {
    /// Resolves the API key for `provider`.
    ///
    /// 1. `${NAME}` reads the environment variable `NAME`.
    /// 2. Any other configured string is used literally.
    /// 3. An empty result falls back to `{PROVIDER}_API_KEY`.
    ///
    /// Both cached connections and one-off override connections go through here.
    pub fn resolve_api_key(&self, provider: &str) -> String {
        let configured = self.api_key.as_deref().unwrap_or_default();
        let key = match placeholder_name(configured) {
            Some(name) => env::var(name).unwrap_or_default(),
            None => configured.to_string(),
        };
        if !key.is_empty() {
            return key;
        }
        env::var(fallback_key_var(provider)).unwrap_or_default()
    }

    pub fn temperature_or_default(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn max_tokens_or_default(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }
}

/// Name of the environment variable consulted when no key is configured.
///
/// # Examples
///
/// ```
/// assert_eq!(dialecta_llm::config::fallback_key_var("deepseek"), "DEEPSEEK_API_KEY");
/// ```
pub fn fallback_key_var(provider: &str) -> String {
    format!("{}_API_KEY", provider.to_uppercase())
}

fn placeholder_name(value: &str) -> Option<&str> {
    value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
}

/// `provider` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSection {
    #[serde(default = "default_provider_name")]
    pub default: String,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            default: default_provider_name(),
        }
    }
}

fn default_provider_name() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn default_fallback_chain() -> Vec<String> {
    DEFAULT_FALLBACK_CHAIN.iter().map(|p| p.to_string()).collect()
}

/// Whole configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderSection,
    /// Replaces [`DEFAULT_FALLBACK_CHAIN`] when present.
    #[serde(default = "default_fallback_chain")]
    pub fallback_chain: Vec<String>,
    /// Every other top-level key is a provider entry.
    #[serde(flatten)]
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderSection::default(),
            fallback_chain: default_fallback_chain(),
            providers: HashMap::new(),
        }
    }
}

impl LlmConfig {
    /// Loads the configuration, never failing.
    ///
    /// The path is taken from `path`, then [`CONFIG_PATH_ENV`], then
    /// [`DEFAULT_CONFIG_PATH`]. A missing, unreadable or malformed file yields
    /// [`LlmConfig::default`].
    pub fn load(path: Option<&Path>) -> Self {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "llm config not readable, using defaults");
                return Self::default();
            }
        };

        Self::from_json(&text).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "llm config is malformed, using defaults");
            Self::default()
        })
    }

    /// Parses a configuration document.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Configuration for `provider`; unknown providers get an empty entry.
    pub fn provider_config(&self, provider: &str) -> ProviderConfig {
        self.providers.get(provider).cloned().unwrap_or_default()
    }

    pub fn default_provider(&self) -> &str {
        &self.provider.default
    }
}

/// Which adapter shape serves a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// OpenAI chat-completions compatible endpoint.
    OpenAiCompatible,
    /// Native Gemini `generateContent` endpoint.
    GeminiNative,
}

impl AdapterKind {
    /// Gemini goes native unless its base URL points at an OpenAI-compatible
    /// surface (contains `/openai`); everything else is OpenAI-compatible.
    pub fn select(provider: &str, base_url: Option<&str>) -> Self {
        if provider != GEMINI_PROVIDER {
            return AdapterKind::OpenAiCompatible;
        }
        match base_url {
            Some(url) if url.contains("/openai") => AdapterKind::OpenAiCompatible,
            _ => AdapterKind::GeminiNative,
        }
    }
}

/// Everything needed to construct a connection for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub provider: String,
    pub adapter: AdapterKind,
    pub api_key: String,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
}

impl ProviderSettings {
    /// Settings derived purely from configuration; used for cached connections.
    pub fn from_config(provider: &str, config: &ProviderConfig) -> Self {
        Self::with_overrides(provider, config, None, None)
    }

    /// Settings for a one-off connection where the caller supplied a key and/or base URL.
    pub fn with_overrides(
        provider: &str,
        config: &ProviderConfig,
        api_key: Option<&str>,
        base_url: Option<&str>,
    ) -> Self {
        let api_key = match api_key {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => config.resolve_api_key(provider),
        };
        let base_url = base_url
            .map(str::to_string)
            .or_else(|| config.base_url.clone());
        Self {
            provider: provider.to_string(),
            adapter: AdapterKind::select(provider, base_url.as_deref()),
            api_key,
            base_url,
            default_model: config.model.clone(),
        }
    }
}
