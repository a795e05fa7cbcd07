//! Entity definitions for the benchmark data model (spec.md §3).
//!
//! These are plain data structs; persistence behavior lives behind the
//! [`crate::Store`] trait so a future SQL-backed implementation can replace
//! [`crate::memory::MemoryStore`] without touching any other crate.

use jiff::Timestamp;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{CarId, ConnectionId, RunId, RunItemId, SuiteId, TestId};

/// Wire protocol family a [`Connection`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionType {
    Ollama,
    Openai,
    Anthropic,
    Openrouter,
    OpenaiCompat,
    LlamacppOpenai,
    Custom,
}

impl ConnectionType {
    /// The wire protocol family used to talk to this connection type (spec.md §4.A).
    pub fn provider_mode(self) -> ProviderMode {
        match self {
            ConnectionType::Ollama => ProviderMode::Ollama,
            ConnectionType::Anthropic => ProviderMode::Anthropic,
            _ => ProviderMode::OpenaiCompat,
        }
    }

    /// Stable key used for per-provider-type semaphores and provider settings lookup.
    pub fn as_key(self) -> &'static str {
        match self {
            ConnectionType::Ollama => "OLLAMA",
            ConnectionType::Openai => "OPENAI",
            ConnectionType::Anthropic => "ANTHROPIC",
            ConnectionType::Openrouter => "OPENROUTER",
            ConnectionType::OpenaiCompat => "OPENAI_COMPAT",
            ConnectionType::LlamacppOpenai => "LLAMACPP_OPENAI",
            ConnectionType::Custom => "CUSTOM",
        }
    }
}

/// The three wire protocol families a [`ConnectionType`] can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    Ollama,
    Anthropic,
    OpenaiCompat,
}

/// A provider endpoint ("car" garage), spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub name: String,
    pub r#type: ConnectionType,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key_encrypted: Option<SecretString>,
    pub api_key_env_var: Option<String>,
}

/// A model configuration bound to one [`Connection`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Car {
    pub id: CarId,
    pub name: String,
    pub connection_id: ConnectionId,
    pub model_name: String,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    pub seed: Option<i64>,
}

/// An ordered bag of [`Test`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    pub id: SuiteId,
    pub name: String,
    pub category: String,
    pub is_demo: bool,
}

/// One prompt case within a [`Suite`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Test {
    pub id: TestId,
    pub suite_id: SuiteId,
    pub order_index: i32,
    pub name: String,
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub expected_constraints: Option<String>,
    pub tools_schema: Option<Value>,
}

/// Per-`provider_type` concurrency/retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub provider_type: String,
    pub max_in_flight: u32,
    pub timeout_ms: u64,
    pub retry_count: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider_type: String::new(),
            max_in_flight: 1,
            timeout_ms: 60_000,
            retry_count: 1,
            retry_backoff_ms: 400,
        }
    }
}

/// Lifecycle state of a [`Run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// One benchmark invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub suite_id: SuiteId,
    pub status: RunStatus,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub selected_car_ids: Vec<CarId>,
    pub judge_car_id: Option<CarId>,
}

/// Lifecycle state of a [`RunItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunItemStatus {
    Pending,
    Running,
    Completed,
    Failed,
    PartialToolSupport,
}

/// One (Run, Test, Car) leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunItem {
    pub id: RunItemId,
    pub run_id: RunId,
    pub test_id: TestId,
    pub car_id: CarId,
    pub status: RunItemStatus,
    pub attempt_count: u32,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub error_message: Option<String>,
}

/// A single serialized conversation message, as stored in [`Output::request_messages`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    pub tool_call_id: Option<String>,
    pub name: Option<String>,
}

/// The request/response record for a terminal [`RunItem`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub run_item_id: RunItemId,
    pub request_messages: Vec<StoredMessage>,
    pub streamed_text: Option<String>,
    pub final_text: Option<String>,
    pub raw_provider_payload: Option<Value>,
}

/// Computed timing/throughput metrics for a terminal [`RunItem`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub run_item_id: RunItemId,
    pub ttft_ms: Option<i64>,
    pub total_latency_ms: Option<i64>,
    pub generation_ms: Option<i64>,
    pub output_tokens: u32,
    pub output_tokens_estimated: bool,
    pub tokens_per_sec: Option<f64>,
    pub error_flag: bool,
}

/// Outcome of dispatching a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Ok,
    Error,
}

/// Whether a tool call came from the provider's native tool-call protocol
/// or was recovered from free text via the fallback parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStyle {
    Native,
    Fallback,
}

/// One executed tool invocation within a tool loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub run_item_id: RunItemId,
    pub loop_index: u32,
    pub tool_name: String,
    pub args: Value,
    pub result: Value,
    pub status: ToolCallStatus,
    pub provider_style: ProviderStyle,
}

/// A judge rubric score row. Exactly one of `run_item_id`/`car_id` is set for
/// per-item/per-car rows; both are `None` for the single per-run aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeResult {
    pub run_id: RunId,
    pub run_item_id: Option<RunItemId>,
    pub car_id: Option<CarId>,
    pub writing_score: f64,
    pub coding_score: f64,
    pub tool_score: f64,
    pub overall: f64,
    pub rationale: String,
    pub raw: Value,
}

/// An append-only, per-run, monotonically-numbered telemetry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub run_id: RunId,
    pub run_item_id: Option<RunItemId>,
    pub seq_no: u64,
    pub event_type: String,
    pub payload: Value,
    pub created_at: Timestamp,
}
