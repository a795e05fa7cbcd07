use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

static BRACE_SPAN: OnceLock<Regex> = OnceLock::new();

fn brace_span_pattern() -> &'static Regex {
    BRACE_SPAN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static pattern is valid"))
}

/// A tool invocation recovered from free text rather than a provider's
/// native tool-call protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackToolCommand {
    pub name: String,
    pub arguments: Value,
}

/// Recovers a `{"tool": "...", "args": {...}}` command from free text when
/// the provider emitted no native tool calls.
pub fn parse_fallback_tool_command(text: &str) -> Option<FallbackToolCommand> {
    let stripped = text.trim();
    let payload = if stripped.starts_with('{') && stripped.ends_with('}') {
        serde_json::from_str::<Value>(stripped).ok()
    } else {
        brace_span_pattern()
            .find(text)
            .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
    }?;

    let object = payload.as_object()?;
    let tool = object.get("tool")?.as_str()?.to_string();
    let args = object.get("args").cloned().unwrap_or_else(|| Value::Object(Default::default()));
    if !args.is_object() {
        return None;
    }
    Some(FallbackToolCommand {
        name: tool,
        arguments: args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_pure_json_command() {
        let parsed =
            parse_fallback_tool_command(r#"{"tool":"calculator","args":{"expression":"3*3"}}"#)
                .unwrap();
        assert_eq!(parsed.name, "calculator");
        assert_eq!(parsed.arguments, json!({"expression": "3*3"}));
    }

    #[test]
    fn parses_command_embedded_in_prose() {
        let text = r#"Sure, let me compute that: {"tool":"calculator","args":{"expression":"1+1"}} done."#;
        let parsed = parse_fallback_tool_command(text).unwrap();
        assert_eq!(parsed.name, "calculator");
    }

    #[test]
    fn non_command_text_yields_none() {
        assert!(parse_fallback_tool_command("just a normal reply").is_none());
        assert!(parse_fallback_tool_command(r#"{"tool": 5, "args": {}}"#).is_none());
    }
}
