//! Anthropic typed-event SSE streaming (spec.md §4.A).
//!
//! Unlike the OpenAI-compatible dialect, Anthropic pairs each `data:` line
//! with an `event:` line naming its shape, so events are matched on
//! `event.event_type` rather than sniffed from the payload.

use std::collections::BTreeMap;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};
use store::Connection;

use crate::error::{truncate_body, ApiKeySource, ProviderError};
use crate::types::{GenerateEvent, NormalizedRequest, ProviderResponse, ToolCall, Usage};
use crate::{http_client, message};

const DEFAULT_MAX_TOKENS: u32 = 1024;

fn messages_url(connection: &Connection) -> String {
    format!("{}/v1/messages", connection.base_url.trim_end_matches('/'))
}

fn build_body(request: &NormalizedRequest) -> Value {
    let (system, rest) = message::extract_anthropic_system(&request.messages);
    let messages: Vec<Value> = rest.into_iter().map(message::to_anthropic).collect();

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "stream": true,
    });

    let obj = body.as_object_mut().expect("body is an object");
    if let Some(system) = system {
        obj.insert("system".into(), json!(system));
    }
    if let Some(temperature) = request.temperature {
        obj.insert("temperature".into(), json!(temperature));
    }
    if let Some(top_p) = request.top_p {
        obj.insert("top_p".into(), json!(top_p));
    }
    if let Some(stop) = &request.stop {
        obj.insert("stop_sequences".into(), json!(stop));
    }
    if let Some(tools) = &request.tools {
        obj.insert("tools".into(), tools.clone());
    }

    body
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStart },
    #[serde(rename = "content_block_start")]
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: BlockDelta },
    #[serde(rename = "message_delta")]
    MessageDelta { usage: Option<DeltaUsage> },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    usage: Option<DeltaUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum BlockDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Clone)]
struct DeltaUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Default)]
struct ToolCallFragment {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

struct State {
    events: BoxStream<'static, Result<eventsource_stream::Event, eventsource_stream::EventStreamError<reqwest::Error>>>,
    text: String,
    fragments: BTreeMap<usize, ToolCallFragment>,
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    pending: std::collections::VecDeque<GenerateEvent>,
    finished: bool,
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
                id: fragment.id.unwrap_or_else(|| format!("toolu_{index}")),
                name: fragment.name.unwrap_or_default(),
                arguments,
            }
        })
        .collect()
}

fn process_event(state: &mut State, event: StreamEvent) {
    match event {
        StreamEvent::MessageStart { message } => {
            if let Some(usage) = message.usage {
                state.prompt_tokens = usage.input_tokens;
                state.completion_tokens = usage.output_tokens;
            }
        }
        StreamEvent::ContentBlockStart { index, content_block } => {
            if let ContentBlock::ToolUse { id, name } = content_block {
                state.fragments.insert(
                    index,
                    ToolCallFragment {
                        id: Some(id),
                        name: Some(name),
                        arguments: String::new(),
                    },
                );
            }
        }
        StreamEvent::ContentBlockDelta { index, delta } => match delta {
            BlockDelta::TextDelta { text } => {
                state.text.push_str(&text);
                state.pending.push_back(GenerateEvent::Token(text));
            }
            BlockDelta::InputJsonDelta { partial_json } => {
                state.fragments.entry(index).or_default().arguments.push_str(&partial_json);
            }
            BlockDelta::Other => {}
        },
        StreamEvent::MessageDelta { usage } => {
            if let Some(usage) = usage {
                if usage.input_tokens.is_some() {
                    state.prompt_tokens = usage.input_tokens;
                }
                if usage.output_tokens.is_some() {
                    state.completion_tokens = usage.output_tokens;
                }
            }
        }
        StreamEvent::Other => {}
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

    let usage = match state.completion_tokens {
        Some(completion_tokens) => Usage {
            completion_tokens: completion_tokens.max(1),
            prompt_tokens: state.prompt_tokens,
            estimated: false,
        },
        None => Usage::estimate_from_text(&state.text),
    };

    let response = ProviderResponse {
        text: std::mem::take(&mut state.text),
        tool_calls,
        usage,
        raw: json!({ "protocol": "anthropic" }),
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
                Some(Err(_)) => log::warn!("SSE parsing error in Anthropic stream"),
                Some(Ok(event)) => {
                    if event.event == "message_stop" {
                        finish(&mut state);
                        continue;
                    }
                    match serde_json::from_str::<StreamEvent>(&event.data) {
                        Ok(parsed) => process_event(&mut state, parsed),
                        Err(_) => log::warn!("failed to parse Anthropic streaming event {}", event.event),
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
            prompt_tokens: None,
            completion_tokens: None,
            pending: std::collections::VecDeque::new(),
            finished: false,
        }
    }

    #[test]
    fn text_delta_appends_and_emits_token() {
        let mut state = empty_state();
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#).unwrap();
        process_event(&mut state, event);
        assert_eq!(state.text, "hi");
        assert!(matches!(state.pending.front(), Some(GenerateEvent::Token(t)) if t == "hi"));
    }

    #[test]
    fn tool_use_block_start_then_input_json_deltas_assemble_arguments() {
        let mut state = empty_state();
        let start: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"calculator"}}"#,
        )
        .unwrap();
        let delta_a: StreamEvent =
            serde_json::from_str(r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"expr"}}"#)
                .unwrap();
        let delta_b: StreamEvent =
            serde_json::from_str(r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"ession\":\"2+2\"}"}}"#)
                .unwrap();
        process_event(&mut state, start);
        process_event(&mut state, delta_a);
        process_event(&mut state, delta_b);

        finish(&mut state);
        match state.pending.back().expect("done queued") {
            GenerateEvent::Done(response) => {
                assert_eq!(response.tool_calls.len(), 1);
                assert_eq!(response.tool_calls[0].id, "toolu_1");
                assert_eq!(response.tool_calls[0].arguments, json!({"expression": "2+2"}));
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn message_delta_usage_overrides_message_start_usage() {
        let mut state = empty_state();
        let start: StreamEvent =
            serde_json::from_str(r#"{"type":"message_start","message":{"usage":{"input_tokens":10,"output_tokens":1}}}"#).unwrap();
        let delta: StreamEvent = serde_json::from_str(r#"{"type":"message_delta","usage":{"output_tokens":25}}"#).unwrap();
        process_event(&mut state, start);
        process_event(&mut state, delta);
        assert_eq!(state.prompt_tokens, Some(10));
        assert_eq!(state.completion_tokens, Some(25));
    }

    #[test]
    fn no_usage_at_all_falls_back_to_word_count_estimate() {
        let mut state = empty_state();
        state.text = "three word reply".into();
        finish(&mut state);
        match state.pending.back().expect("done queued") {
            GenerateEvent::Done(response) => {
                assert!(response.usage.estimated);
                assert_eq!(response.usage.completion_tokens, 3);
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn build_body_joins_system_messages_and_defaults_max_tokens() {
        let request = NormalizedRequest::new(
            "claude-3-5-sonnet",
            vec![NormalizedMessage::system("be terse"), NormalizedMessage::system("no emoji"), NormalizedMessage::user("hi")],
        );
        let body = build_body(&request);
        assert_eq!(body["system"], json!("be terse\n\nno emoji"));
        assert_eq!(body["max_tokens"], json!(DEFAULT_MAX_TOKENS));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
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
    let url = messages_url(connection);
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
        prompt_tokens: None,
        completion_tokens: None,
        pending: std::collections::VecDeque::new(),
        finished: false,
    };

    Ok(into_stream(state).boxed())
}
