//! Deterministic in-process tools the race executor can dispatch to during
//! a model's tool-use loop, plus the fallback parser for models that emit a
//! JSON tool command as plain text instead of a native tool call.

mod calculator;
mod code_blocks;
mod error;
mod fallback;
mod json_validate;

pub use calculator::calculator;
pub use code_blocks::extract_code_blocks;
pub use error::{ToolExecutionError, ToolResult};
pub use fallback::{parse_fallback_tool_command, FallbackToolCommand};
pub use json_validate::{json_validate, JsonValidation};

use serde_json::{json, Value};

/// Dispatches a tool call by name. Unknown names fail with
/// [`ToolExecutionError`]; known tools coerce loosely-typed args the way the
/// schema documents rather than requiring exact shapes.
pub fn execute_tool(tool_name: &str, args: &Value) -> ToolResult<Value> {
    match tool_name {
        "calculator" => {
            let expression = args.get("expression").and_then(Value::as_str).unwrap_or("");
            let result = calculator(expression)?;
            Ok(json!({ "result": result }))
        }
        "json_validate" => {
            let json_string = args.get("json_string").and_then(Value::as_str).unwrap_or("");
            let validation = json_validate(json_string);
            Ok(serde_json::to_value(validation).expect("JsonValidation always serializes"))
        }
        "extract_code_blocks" => {
            let text = args.get("text").and_then(Value::as_str).unwrap_or("");
            Ok(json!({ "blocks": extract_code_blocks(text) }))
        }
        other => Err(ToolExecutionError::new(format!("Unknown tool: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dispatches_calculator() {
        let result = execute_tool("calculator", &json!({"expression": "2+2*3"})).unwrap();
        assert_eq!(result, json!({"result": 8.0}));
    }

    #[test]
    fn unknown_tool_fails() {
        let err = execute_tool("frobnicate", &json!({})).unwrap_err();
        assert_eq!(err.0, "Unknown tool: frobnicate");
    }
}
