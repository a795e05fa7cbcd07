//! Wire-protocol-agnostic request/response shapes.

use serde_json::Value;

/// One message in a normalized chat request. Mirrors [`store::StoredMessage`]
/// but lives in this crate so the provider client has no dependency on
/// storage concerns.
#[derive(Debug, Clone)]
pub struct NormalizedMessage {
    pub role: String,
    pub content: String,
    pub tool_call_id: Option<String>,
    pub name: Option<String>,
}

impl NormalizedMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }
}

/// A fully-resolved chat request, independent of wire protocol.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub model: String,
    pub messages: Vec<NormalizedMessage>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
    pub seed: Option<i64>,
    pub stop: Option<Vec<String>>,
    pub tools: Option<Value>,
    pub tool_choice: Option<Value>,
}

impl NormalizedRequest {
    pub fn new(model: impl Into<String>, messages: Vec<NormalizedMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            top_p: None,
            max_tokens: None,
            seed: None,
            stop: None,
            tools: None,
            tool_choice: None,
        }
    }
}

/// A resolved, executable tool call (fully-parsed arguments).
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Token/cost accounting, with the estimation fallback spec.md §4.A requires.
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub completion_tokens: u32,
    pub prompt_tokens: Option<u32>,
    pub estimated: bool,
}

impl Usage {
    /// Fallback used when the provider reports no usage at all: at least one
    /// token, counted from whitespace-split words.
    pub fn estimate_from_text(text: &str) -> Self {
        let words = text.split_whitespace().count().max(1) as u32;
        Self {
            completion_tokens: words,
            prompt_tokens: None,
            estimated: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct TestConnectionOutcome {
    pub ok: bool,
    pub latency_ms: u64,
    pub models: Vec<String>,
    pub error: Option<String>,
}

/// One item of a `generate` stream. Callers fold a `Token`/`Telemetry` prefix
/// into their own telemetry/accumulation, with `Done` always the final item.
#[derive(Debug, Clone)]
pub enum GenerateEvent {
    Token(String),
    Telemetry { event_type: String, payload: Value },
    Done(Box<ProviderResponse>),
}
