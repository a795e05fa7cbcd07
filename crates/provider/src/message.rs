//! Per-protocol message serialization (spec.md §4.A "Message serialization").

use serde_json::{json, Value};

use crate::types::NormalizedMessage;

/// OpenAI-compatible role mapping: `tool` becomes `{role, tool_call_id, name, content}`;
/// every other role passes through as `{role, content}`.
pub fn to_openai_compat(message: &NormalizedMessage) -> Value {
    if message.role == "tool" {
        json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "name": message.name,
            "content": message.content,
        })
    } else {
        json!({ "role": message.role, "content": message.content })
    }
}

/// Ollama only ever sends `{role, content}`.
pub fn to_ollama(message: &NormalizedMessage) -> Value {
    json!({ "role": message.role, "content": message.content })
}

/// Anthropic messages: system prompts are extracted and joined separately
/// (see [`extract_anthropic_system`]); every remaining message is coerced
/// to `user`/`assistant`, anything else becomes `user`.
pub fn to_anthropic(message: &NormalizedMessage) -> Value {
    let role = match message.role.as_str() {
        "assistant" => "assistant",
        _ => "user",
    };
    json!({ "role": role, "content": message.content })
}

/// Splits `messages` into `(system_prompt, non_system_messages)`, joining
/// all system-role messages with blank lines per spec.md §4.A.
pub fn extract_anthropic_system(messages: &[NormalizedMessage]) -> (Option<String>, Vec<&NormalizedMessage>) {
    let mut system_parts = Vec::new();
    let mut rest = Vec::new();

    for message in messages {
        if message.role == "system" {
            system_parts.push(message.content.as_str());
        } else {
            rest.push(message);
        }
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NormalizedMessage;

    #[test]
    fn tool_role_maps_to_openai_tool_message() {
        let message = NormalizedMessage::tool("{\"result\":4}", "call_1", "calculator");
        let value = to_openai_compat(&message);
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_1");
        assert_eq!(value["name"], "calculator");
    }

    #[test]
    fn ollama_drops_tool_call_metadata() {
        let message = NormalizedMessage::tool("{}", "call_1", "calculator");
        let value = to_ollama(&message);
        assert_eq!(value, json!({"role": "tool", "content": "{}"}));
    }

    #[test]
    fn anthropic_system_messages_are_joined_and_removed() {
        let messages = vec![
            NormalizedMessage::system("Be terse."),
            NormalizedMessage::system("Never apologize."),
            NormalizedMessage::user("Hi"),
        ];
        let (system, rest) = extract_anthropic_system(&messages);
        assert_eq!(system.as_deref(), Some("Be terse.\n\nNever apologize."));
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn anthropic_coerces_unknown_roles_to_user() {
        let message = NormalizedMessage::tool("result", "call_1", "calculator");
        let value = to_anthropic(&message);
        assert_eq!(value["role"], "user");
    }
}
