use std::time::Duration;

use serde::Deserialize;

use crate::error::{LLMError, extract_model_identifier, looks_like_token_limit_error};

/// Parses error responses returned by Google Gemini.
pub(crate) fn parse_gemini_error(
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
        status: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(error) = parsed.error {
            let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
            let status_hint = error.status.as_deref().filter(|text| !text.is_empty());
            if let Some(status_text) = status_hint {
                message = format!("{message} ({status_text})");
            }
            message = format!("{message} (status {status})");

            if looks_like_token_limit_error(status_hint, &message) {
                return LLMError::TokenLimitExceeded { message };
            }

            if status == 404 || status_hint == Some("NOT_FOUND") {
                return LLMError::ModelNotFound {
                    model: extract_model_identifier(&message),
                    message,
                };
            }

            return match status {
                401 | 403 => LLMError::Auth { message },
                429 => LLMError::RateLimit {
                    message,
                    retry_after,
                },
                400 => LLMError::Validation { message },
                _ => LLMError::Provider {
                    provider: "google_gemini",
                    message,
                },
            };
        }
    }

    LLMError::Provider {
        provider: "google_gemini",
        message: format!("status {status}: {body}"),
    }
}

/// Rewrites a not-found failure so it names the model and the native API path.
///
/// A bare `404` from here would be indistinguishable from one raised by the
/// OpenAI-compatible path.
pub(crate) fn clarify_not_found(err: LLMError, model: &str) -> LLMError {
    let not_found = matches!(err, LLMError::ModelNotFound { .. }) || err.to_string().contains("404");
    if !not_found {
        return err;
    }
    LLMError::ModelNotFound {
        model: Some(model.to_string()),
        message: format!(
            "Gemini model '{model}' not found via the native generateContent API (status 404); verify the model id ({err})"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{ErrorKind, classify};

    #[test]
    fn parse_auth_and_rate_limit_errors() {
        let body = r#"{
  "error": {
    "code": 403,
    "message": "Permission denied on resource project",
    "status": "PERMISSION_DENIED"
  }
}"#;
        let err = parse_gemini_error(403, body, None);
        match &err {
            LLMError::Auth { message } => {
                assert!(message.contains("PERMISSION_DENIED"));
            }
            other => panic!("expected Auth error, got {other:?}"),
        }
        assert_eq!(classify(&err), ErrorKind::Fatal);

        let body = r#"{
  "error": {
    "code": 429,
    "message": "quota exhausted",
    "status": "RESOURCE_EXHAUSTED"
  }
}"#;
        let err = parse_gemini_error(429, body, Some(Duration::from_secs(5)));
        match &err {
            LLMError::RateLimit {
                message,
                retry_after,
            } => {
                assert!(message.contains("RESOURCE_EXHAUSTED"));
                assert_eq!(*retry_after, Some(Duration::from_secs(5)));
            }
            other => panic!("expected RateLimit error, got {other:?}"),
        }
        assert_eq!(classify(&err), ErrorKind::Transient);
    }

    #[test]
    fn parse_not_found_and_fallback_errors() {
        let body = r#"{
  "error": {
    "code": 404,
    "message": "Model `gemini-pro-oops` not found.",
    "status": "NOT_FOUND"
  }
}"#;
        match parse_gemini_error(404, body, None) {
            LLMError::ModelNotFound { model, .. } => {
                assert_eq!(model.as_deref(), Some("gemini-pro-oops"));
            }
            other => panic!("expected ModelNotFound, got {other:?}"),
        }

        match parse_gemini_error(500, "not a json", None) {
            LLMError::Provider { provider, message } => {
                assert_eq!(provider, "google_gemini");
                assert!(message.contains("status 500: not a json"));
            }
            other => panic!("expected Provider fallback error, got {other:?}"),
        }
    }

    #[test]
    fn clarify_not_found_names_model_and_native_path() {
        let raw = LLMError::Provider {
            provider: "google_gemini",
            message: "status 404: <html>".to_string(),
        };
        match clarify_not_found(raw, "gemini-3-pro") {
            LLMError::ModelNotFound { model, message } => {
                assert_eq!(model.as_deref(), Some("gemini-3-pro"));
                assert!(message.contains("gemini-3-pro"));
                assert!(message.contains("native generateContent"));
            }
            other => panic!("expected ModelNotFound, got {other:?}"),
        }

        let untouched = clarify_not_found(LLMError::transport("reset by peer"), "m");
        assert!(matches!(untouched, LLMError::Transport { .. }));
    }
}
