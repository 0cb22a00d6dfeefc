//! Retry policy, error classification and backoff primitives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LLMError;

/// Attempts per provider when the caller does not say otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Base delay of the exponential backoff.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Lower-cased fragments that mark a failure as a configuration problem.
const FATAL_MARKERS: [&str; 7] = [
    "404",
    "not found",
    "invalid_api_key",
    "invalid api key",
    "permission_denied",
    "permission denied",
    "authentication",
];

/// Whether retrying the same provider can possibly help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad credentials, unknown model or endpoint: move on to the next provider.
    Fatal,
    /// Rate limits, timeouts and everything else: retry after a backoff.
    Transient,
}

/// Classifies a failure by its rendered message.
///
/// This is the only place that inspects error text; adapters only have to make
/// sure status codes and provider error codes end up in the message.
///
/// # Examples
///
/// ```
/// use dialecta_llm::error::LLMError;
/// use dialecta_llm::retry::{ErrorKind, classify};
///
/// let err = LLMError::Auth { message: "bad key".into() };
/// assert_eq!(classify(&err), ErrorKind::Fatal);
/// assert_eq!(classify(&LLMError::transport("timed out")), ErrorKind::Transient);
/// ```
pub fn classify(err: &LLMError) -> ErrorKind {
    let message = err.to_string().to_lowercase();
    if FATAL_MARKERS.iter().any(|marker| message.contains(marker)) {
        ErrorKind::Fatal
    } else {
        ErrorKind::Transient
    }
}

/// Per-provider retry budget and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Builds a policy from optional per-call values, falling back to the defaults.
    pub fn from_options(max_retries: Option<u32>, base_delay: Option<Duration>) -> Self {
        Self {
            max_retries: max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            base_delay: base_delay.unwrap_or(DEFAULT_RETRY_DELAY),
        }
    }

    /// Attempts allowed per provider; never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay before retrying after the failed attempt `attempt` (0-based).
    ///
    /// ```
    /// use std::time::Duration;
    /// use dialecta_llm::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy { max_retries: 3, base_delay: Duration::from_secs(2) };
    /// assert_eq!(policy.backoff_for_attempt(0), Duration::from_secs(2));
    /// assert_eq!(policy.backoff_for_attempt(2), Duration::from_secs(8));
    /// ```
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        match 2u32.checked_pow(attempt) {
            Some(factor) => self.base_delay.saturating_mul(factor),
            None => Duration::MAX,
        }
    }
}

/// Blocks the current thread between attempts.
///
/// Injected into the client so tests can record delays instead of waiting.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Shared handle to a sleeper.
pub type DynSleeper = Arc<dyn Sleeper>;

/// [`Sleeper`] backed by [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Extracts the `Retry-After` header (in seconds) if present.
///
/// HTTP-date values are ignored; providers send the numeric form.
pub(crate) fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_fatal_fragments_case_insensitively() {
        let fatal = [
            LLMError::Auth {
                message: "bad key".to_string(),
            },
            LLMError::ModelNotFound {
                model: None,
                message: "no such model".to_string(),
            },
            LLMError::provider("openai_chat", "Invalid API Key provided (status 401)"),
            LLMError::provider("openai_chat", "PERMISSION_DENIED"),
            LLMError::transport("HTTP 404 from upstream"),
            LLMError::Unknown {
                message: "Incorrect invalid_api_key".to_string(),
            },
        ];
        for err in &fatal {
            assert_eq!(classify(err), ErrorKind::Fatal, "{err}");
        }

        let transient = [
            LLMError::RateLimit {
                message: "slow down".to_string(),
                retry_after: None,
            },
            LLMError::transport("connection reset"),
            LLMError::provider("openai_chat", "status 503: overloaded"),
            LLMError::Validation {
                message: "messages must not be empty".to_string(),
            },
        ];
        for err in &transient {
            assert_eq!(classify(err), ErrorKind::Transient, "{err}");
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
        };
        let delays: Vec<_> = (0..4).map(|a| policy.backoff_for_attempt(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]
        );
        assert_eq!(policy.backoff_for_attempt(64), Duration::MAX);
    }

    #[test]
    fn zero_retries_still_allows_one_attempt() {
        let policy = RetryPolicy::from_options(Some(0), None);
        assert_eq!(policy.attempts(), 1);
        assert_eq!(policy.base_delay, DEFAULT_RETRY_DELAY);
        assert_eq!(RetryPolicy::default().attempts(), 3);
    }

    #[test]
    fn retry_after_header_is_case_insensitive() {
        let headers = HashMap::from([("Retry-After".to_string(), " 12 ".to_string())]);
        assert_eq!(
            retry_after_from_headers(&headers),
            Some(Duration::from_secs(12))
        );
        let headers = HashMap::from([(
            "retry-after".to_string(),
            "Wed, 21 Oct 2015 07:28:00 GMT".to_string(),
        )]);
        assert_eq!(retry_after_from_headers(&headers), None);
    }
}
