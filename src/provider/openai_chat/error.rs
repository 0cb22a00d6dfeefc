use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LLMError, extract_model_identifier, looks_like_token_limit_error};

/// Maps a non-2xx chat-completions response onto [`LLMError`].
///
/// The HTTP status always ends up in the message so string-based classification
/// sees the same `404`/`401` markers the vendor SDKs expose.
pub(crate) fn parse_openai_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<InnerError>,
    }
    #[derive(Deserialize)]
    struct InnerError {
        message: Option<String>,
        #[allow(dead_code)]
        r#type: Option<String>,
        code: Option<Value>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(error) = parsed.error {
            let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
            let code = error.code.map(|code| match code {
                Value::String(text) => text,
                other => other.to_string(),
            });
            if let Some(code) = &code {
                message = format!("{message} ({code})");
            }
            message = format!("{message} (status {status})");

            if looks_like_token_limit_error(code.as_deref(), &message) {
                return LLMError::TokenLimitExceeded { message };
            }

            return match status {
                401 | 403 => LLMError::Auth { message },
                429 => LLMError::RateLimit {
                    message,
                    retry_after,
                },
                404 => LLMError::ModelNotFound {
                    model: extract_model_identifier(&message),
                    message,
                },
                400 => LLMError::Validation { message },
                _ => LLMError::Provider {
                    provider: "openai_chat",
                    message,
                },
            };
        }
    }
    LLMError::Provider {
        provider: "openai_chat",
        message: format!("status {status}: {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{ErrorKind, classify};

    #[test]
    fn invalid_key_is_auth_and_fatal() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        let err = parse_openai_error(401, body, None);
        match &err {
            LLMError::Auth { message } => {
                assert!(message.contains("invalid_api_key"));
                assert!(message.contains("status 401"));
            }
            other => panic!("expected Auth, got {other:?}"),
        }
        assert_eq!(classify(&err), ErrorKind::Fatal);
    }

    #[test]
    fn unknown_model_is_not_found_and_fatal() {
        let body = r#"{"error":{"message":"The model `gpt-9` does not exist","type":"invalid_request_error","code":"model_not_found"}}"#;
        let err = parse_openai_error(404, body, None);
        match &err {
            LLMError::ModelNotFound { model, message } => {
                assert_eq!(model.as_deref(), Some("gpt-9"));
                assert!(message.contains("status 404"));
            }
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
        assert_eq!(classify(&err), ErrorKind::Fatal);
    }

    #[test]
    fn rate_limit_keeps_retry_after_and_is_transient() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests","code":null}}"#;
        let err = parse_openai_error(429, body, Some(Duration::from_secs(3)));
        match &err {
            LLMError::RateLimit { retry_after, .. } => {
                assert_eq!(*retry_after, Some(Duration::from_secs(3)));
            }
            other => panic!("expected RateLimit, got {other:?}"),
        }
        assert_eq!(classify(&err), ErrorKind::Transient);
    }

    #[test]
    fn context_overflow_maps_to_token_limit() {
        let body = r#"{"error":{"message":"This model's maximum context length is 8192 tokens","code":"context_length_exceeded"}}"#;
        assert!(matches!(
            parse_openai_error(400, body, None),
            LLMError::TokenLimitExceeded { .. }
        ));
    }

    #[test]
    fn non_json_body_falls_back_to_provider_error() {
        let err = parse_openai_error(502, "<html>bad gateway</html>", None);
        match &err {
            LLMError::Provider { provider, message } => {
                assert_eq!(*provider, "openai_chat");
                assert!(message.contains("status 502"));
            }
            other => panic!("expected Provider, got {other:?}"),
        }
        assert_eq!(classify(&err), ErrorKind::Transient);
    }
}
