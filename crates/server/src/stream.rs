//! `/api/runs/{id}/stream`: resumable SSE telemetry subscriber (spec.md §4.D).

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use eventlog::SseFrame;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use store::RunId;

use crate::state::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new().route("/api/runs/{id}/stream", get(stream))
}

#[derive(Debug, Deserialize, Default)]
struct StreamQuery {
    after_seq: Option<u64>,
}

fn last_event_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn stream(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let run_id = RunId(id);
    let start_cursor = eventlog::resolve_start_cursor(query.after_seq, last_event_id(&headers).as_deref());

    let frames = eventlog::subscribe(
        state.store.clone(),
        run_id,
        start_cursor,
        state.subscriber_poll_interval,
        state.subscriber_heartbeat_after,
    );

    let events = frames.map(|frame| {
        Ok(match frame {
            SseFrame::Event(event) => Event::default()
                .id(event.seq_no.to_string())
                .event(event.event_type.clone())
                .data(serde_json::to_string(&event.payload).unwrap_or_else(|_| "null".to_string())),
            SseFrame::Heartbeat => Event::default().comment("heartbeat"),
        })
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
