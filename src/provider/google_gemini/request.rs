use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::types::{ProviderRequest, Role};

/// 构建 Gemini GenerateContent 请求体
///
/// 模型名通过 URL 路径传递，不进入 body。对话被压平成单个 prompt：
/// system 消息拼接为 `systemInstruction`，user/assistant 渲染为带标签的行。
pub(crate) fn build_gemini_body(request: &ProviderRequest) -> Result<Value, LLMError> {
    let (system_instruction, prompt) = flatten_messages(request);
    if prompt.is_empty() {
        return Err(LLMError::Validation {
            message: "Gemini generateContent requires at least one user or assistant message"
                .to_string(),
        });
    }

    let mut body = Map::new();
    body.insert(
        "contents".to_string(),
        json!([{ "role": "user", "parts": [{ "text": prompt }] }]),
    );
    if let Some(system) = system_instruction {
        body.insert(
            "systemInstruction".to_string(),
            json!({ "parts": [{ "text": system }] }),
        );
    }
    body.insert(
        "generationConfig".to_string(),
        json!({
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
        }),
    );
    Ok(Value::Object(body))
}

/// Returns `(system_instruction, prompt)`.
pub(crate) fn flatten_messages(request: &ProviderRequest) -> (Option<String>, String) {
    let mut system_texts = Vec::new();
    let mut prompt = String::new();
    for message in &request.messages {
        match message.role {
            Role::System => system_texts.push(message.content.as_str()),
            Role::User => {
                prompt.push_str("User: ");
                prompt.push_str(&message.content);
                prompt.push('\n');
            }
            Role::Assistant => {
                prompt.push_str("Model: ");
                prompt.push_str(&message.content);
                prompt.push('\n');
            }
        }
    }
    let system = if system_texts.is_empty() {
        None
    } else {
        Some(system_texts.join("\n\n"))
    };
    (system, prompt)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::types::ChatMessage;

    fn request(messages: Vec<ChatMessage>) -> ProviderRequest {
        ProviderRequest {
            messages,
            model: Some("gemini-2.5-pro".to_string()),
            temperature: 0.3,
            max_tokens: 512,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn flattens_turns_into_labelled_prompt() {
        let body = build_gemini_body(&request(vec![
            ChatMessage::system("You are a judge."),
            ChatMessage::user("Is it safe?"),
            ChatMessage::assistant("Partly."),
            ChatMessage::user("Explain."),
        ]))
        .expect("body builds");

        assert_eq!(
            body["contents"][0]["parts"][0]["text"],
            json!("User: Is it safe?\nModel: Partly.\nUser: Explain.\n")
        );
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            json!("You are a judge.")
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], json!(512));
        assert!(body.get("model").is_none());
    }

    #[test]
    fn multiple_system_messages_are_joined() {
        let (system, prompt) = flatten_messages(&request(vec![
            ChatMessage::system("one"),
            ChatMessage::user("q"),
            ChatMessage::system("two"),
        ]));
        assert_eq!(system.as_deref(), Some("one\n\ntwo"));
        assert_eq!(prompt, "User: q\n");
    }

    #[test]
    fn system_only_request_is_rejected() {
        let err = build_gemini_body(&request(vec![ChatMessage::system("alone")]))
            .expect_err("no turns to send");
        assert!(matches!(err, LLMError::Validation { .. }));
    }
}
