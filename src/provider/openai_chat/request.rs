use serde_json::{Map, Value};

use crate::types::ProviderRequest;

const NAMED_KEYS: [&str; 4] = ["model", "messages", "temperature", "max_tokens"];

/// Builds the chat-completions body.
///
/// Passthrough parameters from [`ProviderRequest::extra`] are merged in unless they
/// collide with a key this function already sets.
pub(crate) fn build_openai_body(request: &ProviderRequest, model: &str) -> Value {
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));
    body.insert(
        "messages".to_string(),
        Value::Array(
            request
                .messages
                .iter()
                .map(|message| {
                    let mut obj = Map::new();
                    obj.insert(
                        "role".to_string(),
                        Value::String(message.role.as_str().to_string()),
                    );
                    obj.insert("content".to_string(), Value::String(message.content.clone()));
                    Value::Object(obj)
                })
                .collect(),
        ),
    );
    body.insert("temperature".to_string(), Value::from(request.temperature));
    body.insert("max_tokens".to_string(), Value::from(request.max_tokens));
    for (k, v) in &request.extra {
        if !NAMED_KEYS.contains(&k.as_str()) {
            body.insert(k.clone(), v.clone());
        }
    }
    Value::Object(body)
}
