//! OpenAI-compatible SSE streaming (spec.md §4.A): OPENAI, OPENROUTER,
//! OPENAI_COMPAT, LLAMACPP_OPENAI, CUSTOM connections all speak this dialect.

use std::collections::BTreeMap;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};
use store::{Connection, ConnectionType};

use crate::error::{truncate_body, ApiKeySource, ProviderError};
use crate::types::{GenerateEvent, NormalizedRequest, ProviderResponse, ToolCall, Usage};
use crate::{http_client, message};

fn chat_completions_url(connection: &Connection) -> String {
    let base = connection.base_url.trim_end_matches('/');
    if connection.r#type == ConnectionType::Openrouter {
        format!("{base}/api/v1/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

fn build_body(request: &NormalizedRequest) -> Value {
    let messages: Vec<Value> = request.messages.iter().map(message::to_openai_compat).collect();

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "stream": true,
        "stream_options": { "include_usage": true },
    });

    let obj = body.as_object_mut().expect("body is an object");
    if let Some(temperature) = request.temperature {
        obj.insert("temperature".into(), json!(temperature));
    }
    if let Some(top_p) = request.top_p {
        obj.insert("top_p".into(), json!(top_p));
    }
    if let Some(max_tokens) = request.max_tokens {
        obj.insert("max_tokens".into(), json!(max_tokens));
    }
    if let Some(seed) = request.seed {
        obj.insert("seed".into(), json!(seed));
    }
    if let Some(stop) = &request.stop {
        obj.insert("stop".into(), json!(stop));
    }
    if let Some(tools) = &request.tools {
        obj.insert("tools".into(), tools.clone());
    }
    if let Some(tool_choice) = &request.tool_choice {
        obj.insert("tool_choice".into(), tool_choice.clone());
    }

    body
}

#[derive(Debug, Deserialize, Default)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<UsageChunk>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Deserialize, Default)]
struct Delta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize, Default)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct UsageChunk {
    completion_tokens: Option<u32>,
    prompt_tokens: Option<u32>,
}

#[derive(Default)]
struct ToolCallFragment {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

fn finalize_tool_calls(fragments: BTreeMap<usize, ToolCallFragment>) -> Vec<ToolCall> {
    fragments
        .into_iter()
        .map(|(index, fragment)| {
            let arguments = if fragment.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&fragment.arguments).unwrap_or_else(|_| json!({ "raw": fragment.arguments }))
            };
            ToolCall {
                id: fragment.id.unwrap_or_else(|| format!("call_{index}")),
                name: fragment.name.unwrap_or_default(),
                arguments,
            }
        })
        .collect()
}

struct State {
    events: BoxStream<'static, Result<eventsource_stream::Event, eventsource_stream::EventStreamError<reqwest::Error>>>,
    text: String,
    fragments: BTreeMap<usize, ToolCallFragment>,
    usage: Option<Usage>,
    pending: std::collections::VecDeque<GenerateEvent>,
    finished: bool,
}

fn process_chunk(state: &mut State, chunk: StreamChunk) {
    if let Some(usage) = chunk.usage {
        state.usage = Some(Usage {
            completion_tokens: usage.completion_tokens.unwrap_or(0).max(1),
            prompt_tokens: usage.prompt_tokens,
            estimated: false,
        });
    }

    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(content) = choice.delta.content
            && !content.is_empty()
        {
            state.text.push_str(&content);
            state.pending.push_back(GenerateEvent::Token(content));
        }

        for delta in choice.delta.tool_calls {
            let index = delta.index.unwrap_or(0);
            let fragment = state.fragments.entry(index).or_default();
            if let Some(id) = delta.id {
                fragment.id.get_or_insert(id);
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    fragment.name.get_or_insert(name);
                }
                if let Some(arguments) = function.arguments {
                    fragment.arguments.push_str(&arguments);
                }
            }
        }
    }
}

fn finish(state: &mut State) {
    let tool_calls = finalize_tool_calls(std::mem::take(&mut state.fragments));
    if !tool_calls.is_empty() {
        state.pending.push_back(GenerateEvent::Telemetry {
            event_type: "tool.call.detected".to_string(),
            payload: json!({ "count": tool_calls.len(), "tool_calls": tool_calls.iter().map(|t| json!({"id": t.id, "name": t.name, "arguments": t.arguments})).collect::<Vec<_>>() }),
        });
    }

    let usage = state
        .usage
        .clone()
        .unwrap_or_else(|| Usage::estimate_from_text(&state.text));

    let response = ProviderResponse {
        text: std::mem::take(&mut state.text),
        tool_calls,
        usage,
        raw: json!({ "protocol": "openai_compat" }),
    };

    state.pending.push_back(GenerateEvent::Done(Box::new(response)));
    state.finished = true;
}

fn into_stream(state: State) -> impl Stream<Item = GenerateEvent> {
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.finished {
                return None;
            }

            match state.events.next().await {
                None => finish(&mut state),
                Some(Err(_)) => {
                    log::warn!("SSE parsing error in OpenAI-compatible stream");
                }
                Some(Ok(event)) => {
                    if event.data == "[DONE]" {
                        finish(&mut state);
                        continue;
                    }
                    match serde_json::from_str::<StreamChunk>(&event.data) {
                        Ok(chunk) => process_chunk(&mut state, chunk),
                        Err(_) => log::warn!("failed to parse OpenAI-compatible streaming chunk"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NormalizedMessage;

    fn empty_state() -> State {
        State {
            events: stream::empty().boxed(),
            text: String::new(),
            fragments: BTreeMap::new(),
            usage: None,
            pending: std::collections::VecDeque::new(),
            finished: false,
        }
    }

    #[test]
    fn chunk_with_delta_content_appends_text_and_emits_token() {
        let mut state = empty_state();
        let chunk: StreamChunk = serde_json::from_str(r#"{"choices":[{"delta":{"content":"hel"}}]}"#).unwrap();
        process_chunk(&mut state, chunk);
        assert_eq!(state.text, "hel");
        assert!(matches!(state.pending.front(), Some(GenerateEvent::Token(t)) if t == "hel"));
    }

    #[test]
    fn chunk_with_usage_is_authoritative_and_not_estimated() {
        let mut state = empty_state();
        let chunk: StreamChunk = serde_json::from_str(r#"{"choices":[],"usage":{"completion_tokens":42}}"#).unwrap();
        process_chunk(&mut state, chunk);
        let usage = state.usage.expect("usage recorded");
        assert_eq!(usage.completion_tokens, 42);
        assert!(!usage.estimated);
    }

    #[test]
    fn tool_call_fragments_assemble_across_chunks_defaulting_missing_index_to_zero() {
        let mut state = empty_state();
        let first: StreamChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"tool_calls":[{"id":"call_1","function":{"name":"calculator","arguments":"{\"expr"}}]}}]}"#,
        )
        .unwrap();
        let second: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"tool_calls":[{"function":{"arguments":"ession\":\"2+2\"}"}}]}}]}"#).unwrap();
        process_chunk(&mut state, first);
        process_chunk(&mut state, second);

        finish(&mut state);
        let done = state.pending.back().expect("done event queued");
        match done {
            GenerateEvent::Done(response) => {
                assert_eq!(response.tool_calls.len(), 1);
                let call = &response.tool_calls[0];
                assert_eq!(call.id, "call_1");
                assert_eq!(call.arguments, json!({"expression": "2+2"}));
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn malformed_tool_arguments_fall_back_to_raw_string() {
        let fragments = BTreeMap::from([(
            0,
            ToolCallFragment {
                id: None,
                name: Some("calculator".into()),
                arguments: "not json".into(),
            },
        )]);
        let calls = finalize_tool_calls(fragments);
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[0].arguments, json!({"raw": "not json"}));
    }

    #[test]
    fn build_body_omits_nullable_fields_and_includes_stream_options() {
        let request = NormalizedRequest::new("gpt-4o", vec![NormalizedMessage::user("hi")]);
        let body = build_body(&request);
        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["stream_options"]["include_usage"], json!(true));
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn openrouter_uses_api_prefixed_chat_completions_path() {
        let connection = Connection {
            id: store::ConnectionId(1),
            name: "or".into(),
            r#type: ConnectionType::Openrouter,
            base_url: "https://openrouter.ai/".into(),
            api_key_encrypted: None,
            api_key_env_var: None,
        };
        assert_eq!(chat_completions_url(&connection), "https://openrouter.ai/api/v1/chat/completions");
    }
}

pub async fn generate(
    connection: &Connection,
    headers: HeaderMap,
    request: &NormalizedRequest,
    source: ApiKeySource,
    timeout: Duration,
) -> Result<BoxStream<'static, GenerateEvent>, ProviderError> {
    let client = http_client::client();
    let url = chat_completions_url(connection);
    let body = build_body(request);

    let response = client
        .post(&url)
        .headers(headers)
        .timeout(timeout)
        .json(&body)
        .send()
        .await
        .map_err(|err| ProviderError::Connection {
            action: "generate",
            provider: connection.name.clone(),
            base_url: connection.base_url.clone(),
            source: err.to_string(),
            hint: crate::error::connection_hint(&connection.base_url, err.is_connect()),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let hint = crate::error::http_error_hint(status.as_u16(), &body, source);
        return Err(ProviderError::Http {
            action: "generate",
            provider: connection.name.clone(),
            base_url: connection.base_url.clone(),
            status: status.as_u16(),
            body: truncate_body(&body),
            hint,
        });
    }

    let events = response.bytes_stream().eventsource().boxed();
    let state = State {
        events,
        text: String::new(),
        fragments: BTreeMap::new(),
        usage: None,
        pending: std::collections::VecDeque::new(),
        finished: false,
    };

    Ok(into_stream(state).boxed())
}
