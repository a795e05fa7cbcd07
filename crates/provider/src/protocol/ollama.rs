//! Ollama native streaming: newline-delimited JSON objects over a plain
//! `POST /api/chat` body, no SSE framing (spec.md §4.A).

use std::time::Duration;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};
use store::Connection;

use crate::error::{truncate_body, ApiKeySource, ProviderError};
use crate::message;
use crate::types::{GenerateEvent, NormalizedRequest, ProviderResponse, ToolCall, Usage};
use crate::http_client;

fn chat_url(connection: &Connection) -> String {
    format!("{}/api/chat", connection.base_url.trim_end_matches('/'))
}

fn build_body(request: &NormalizedRequest) -> Value {
    let messages: Vec<Value> = request.messages.iter().map(message::to_ollama).collect();

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "stream": true,
    });

    let obj = body.as_object_mut().expect("body is an object");
    let mut options = serde_json::Map::new();
    if let Some(temperature) = request.temperature {
        options.insert("temperature".into(), json!(temperature));
    }
    if let Some(top_p) = request.top_p {
        options.insert("top_p".into(), json!(top_p));
    }
    if let Some(seed) = request.seed {
        options.insert("seed".into(), json!(seed));
    }
    if let Some(stop) = &request.stop {
        options.insert("stop".into(), json!(stop));
    }
    if !options.is_empty() {
        obj.insert("options".into(), Value::Object(options));
    }
    if let Some(max_tokens) = request.max_tokens {
        obj.entry("options")
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .expect("options is an object")
            .insert("num_predict".into(), json!(max_tokens));
    }
    if let Some(tools) = &request.tools {
        obj.insert("tools".into(), tools.clone());
    }

    body
}

#[derive(Debug, Deserialize, Default)]
struct Line {
    #[serde(default)]
    message: MessageLine,
    #[serde(default)]
    done: bool,
    eval_count: Option<u32>,
    prompt_eval_count: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct MessageLine {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallLine>,
}

#[derive(Debug, Deserialize)]
struct ToolCallLine {
    function: FunctionLine,
}

#[derive(Debug, Deserialize)]
struct FunctionLine {
    name: String,
    #[serde(default)]
    arguments: Value,
}

struct State {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    text: String,
    tool_calls: Vec<ToolCall>,
    usage: Option<Usage>,
    pending: std::collections::VecDeque<GenerateEvent>,
    finished: bool,
}

fn process_line(state: &mut State, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    let Ok(parsed) = serde_json::from_str::<Line>(line) else {
        log::warn!("failed to parse Ollama streaming line");
        return;
    };

    if let Some(content) = parsed.message.content
        && !content.is_empty()
    {
        state.text.push_str(&content);
        state.pending.push_back(GenerateEvent::Token(content));
    }

    for (index, call) in parsed.message.tool_calls.into_iter().enumerate() {
        state.tool_calls.push(ToolCall {
            id: format!("call_{index}"),
            name: call.function.name,
            arguments: call.function.arguments,
        });
    }

    if parsed.done {
        state.usage = Some(match parsed.eval_count {
            Some(completion_tokens) => Usage {
                completion_tokens: completion_tokens.max(1),
                prompt_tokens: parsed.prompt_eval_count,
                estimated: false,
            },
            None => Usage::estimate_from_text(&state.text),
        });
    }
}

fn finish(state: &mut State) {
    let tool_calls = std::mem::take(&mut state.tool_calls);
    if !tool_calls.is_empty() {
        state.pending.push_back(GenerateEvent::Telemetry {
            event_type: "tool.call.detected".to_string(),
            payload: json!({ "count": tool_calls.len(), "tool_calls": tool_calls.iter().map(|t| json!({"id": t.id, "name": t.name, "arguments": t.arguments})).collect::<Vec<_>>() }),
        });
    }

    let usage = state.usage.take().unwrap_or_else(|| Usage::estimate_from_text(&state.text));

    let response = ProviderResponse {
        text: std::mem::take(&mut state.text),
        tool_calls,
        usage,
        raw: json!({ "protocol": "ollama" }),
    };

    state.pending.push_back(GenerateEvent::Done(Box::new(response)));
    state.finished = true;
}

fn drain_buffered_lines(state: &mut State) {
    while let Some(pos) = state.buffer.iter().position(|byte| *byte == b'\n') {
        let line_bytes: Vec<u8> = state.buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line_bytes);
        process_line(state, line.trim_end());
    }
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

            match state.bytes.next().await {
                None => {
                    if !state.buffer.is_empty() {
                        let remaining = std::mem::take(&mut state.buffer);
                        let line = String::from_utf8_lossy(&remaining).to_string();
                        process_line(&mut state, line.trim_end());
                    }
                    finish(&mut state);
                }
                Some(Err(_)) => log::warn!("error reading Ollama response body"),
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(&chunk);
                    drain_buffered_lines(&mut state);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_state() -> State {
        State {
            bytes: stream::empty().boxed(),
            buffer: Vec::new(),
            text: String::new(),
            tool_calls: Vec::new(),
            usage: None,
            pending: std::collections::VecDeque::new(),
            finished: false,
        }
    }

    #[test]
    fn line_with_content_appends_and_emits_token() {
        let mut state = empty_state();
        process_line(&mut state, r#"{"message":{"content":"hi"},"done":false}"#);
        assert_eq!(state.text, "hi");
        assert!(matches!(state.pending.front(), Some(GenerateEvent::Token(t)) if t == "hi"));
    }

    #[test]
    fn done_with_eval_count_records_authoritative_usage() {
        let mut state = empty_state();
        process_line(&mut state, r#"{"message":{"content":""},"done":true,"eval_count":7,"prompt_eval_count":3}"#);
        let usage = state.usage.expect("usage recorded");
        assert_eq!(usage.completion_tokens, 7);
        assert_eq!(usage.prompt_tokens, Some(3));
        assert!(!usage.estimated);
    }

    #[test]
    fn done_without_eval_count_estimates_from_text() {
        let mut state = empty_state();
        process_line(&mut state, r#"{"message":{"content":"two words"},"done":false}"#);
        process_line(&mut state, r#"{"message":{"content":""},"done":true}"#);
        let usage = state.usage.expect("usage recorded");
        assert!(usage.estimated);
        assert_eq!(usage.completion_tokens, 2);
    }

    #[test]
    fn drain_buffered_lines_splits_on_newlines_across_chunks() {
        let mut state = empty_state();
        state.buffer.extend_from_slice(b"{\"message\":{\"content\":\"a\"},\"done\":false}\n{\"mess");
        drain_buffered_lines(&mut state);
        assert_eq!(state.text, "a");
        assert_eq!(state.buffer, b"{\"mess".to_vec());
    }

    #[test]
    fn blank_lines_are_ignored() {
        let mut state = empty_state();
        process_line(&mut state, "   ");
        assert!(state.text.is_empty());
        assert!(state.pending.is_empty());
    }

    #[test]
    fn build_body_nests_sampling_params_under_options_and_num_predict() {
        let request = {
            let mut request = NormalizedRequest::new("llama3", vec![crate::types::NormalizedMessage::user("hi")]);
            request.temperature = Some(0.2);
            request.max_tokens = Some(128);
            request
        };
        let body = build_body(&request);
        assert_eq!(body["options"]["temperature"], json!(0.2));
        assert_eq!(body["options"]["num_predict"], json!(128));
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
    let url = chat_url(connection);
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

    let state = State {
        bytes: response.bytes_stream().map(|chunk| chunk.map(|bytes| bytes.to_vec())).boxed(),
        buffer: Vec::new(),
        text: String::new(),
        tool_calls: Vec::new(),
        usage: None,
        pending: std::collections::VecDeque::new(),
        finished: false,
    };

    Ok(into_stream(state).boxed())
}
