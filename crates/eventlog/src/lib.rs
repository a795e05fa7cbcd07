//! Monotonic per-run telemetry log and its SSE-format subscriber stream.
//!
//! `seq_no` assignment atomicity is delegated to the [`store::Store`]
//! implementation; this crate only shapes the append/read/subscribe API
//! around it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use serde_json::Value;
use tokio::time::Instant;

use store::{RunId, RunItemId, RunStatus, Store, StoreResult, TelemetryEvent};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(400);
pub const DEFAULT_HEARTBEAT_AFTER: Duration = Duration::from_secs(10);

/// Appends a telemetry event, delegating `seq_no` assignment to the store.
pub async fn emit(
    store: &dyn Store,
    run_id: RunId,
    run_item_id: Option<RunItemId>,
    event_type: &str,
    payload: Value,
) -> StoreResult<TelemetryEvent> {
    let event = TelemetryEvent {
        run_id,
        run_item_id,
        seq_no: 0,
        event_type: event_type.to_string(),
        payload,
        created_at: jiff::Timestamp::now(),
    };
    store.append_telemetry_event(event).await
}

pub async fn events_after(store: &dyn Store, run_id: RunId, after_seq: u64) -> StoreResult<Vec<TelemetryEvent>> {
    store.list_telemetry_events_after(run_id, after_seq).await
}

/// One frame of the SSE subscriber stream.
#[derive(Debug, Clone)]
pub enum SseFrame {
    Event(TelemetryEvent),
    Heartbeat,
}

impl SseFrame {
    /// Renders the frame exactly as it appears on the wire.
    pub fn to_wire(&self) -> String {
        match self {
            SseFrame::Event(event) => format!(
                "id: {}\nevent: {}\ndata: {}\n\n",
                event.seq_no,
                event.event_type,
                serde_json::to_string(&event.payload).unwrap_or_else(|_| "null".to_string()),
            ),
            SseFrame::Heartbeat => ": heartbeat\n\n".to_string(),
        }
    }
}

struct SubscribeState {
    store: Arc<dyn Store>,
    run_id: RunId,
    cursor: u64,
    queue: VecDeque<TelemetryEvent>,
    last_emit: Instant,
    poll_interval: Duration,
    heartbeat_after: Duration,
    finished: bool,
}

/// Resolves the starting cursor from the `?after_seq=` query parameter and
/// the `Last-Event-ID` header, per the subscriber's resume semantics.
pub fn resolve_start_cursor(after_seq: Option<u64>, last_event_id: Option<&str>) -> u64 {
    after_seq
        .or_else(|| last_event_id.and_then(|v| v.parse::<u64>().ok()))
        .unwrap_or(0)
}

/// Polls the store for new events on `run_id`, flushing them in order,
/// heartbeating when idle, and terminating once the run is in a terminal
/// state and a poll came back empty.
pub fn subscribe(
    store: Arc<dyn Store>,
    run_id: RunId,
    start_cursor: u64,
    poll_interval: Duration,
    heartbeat_after: Duration,
) -> impl Stream<Item = SseFrame> {
    let state = SubscribeState {
        store,
        run_id,
        cursor: start_cursor,
        queue: VecDeque::new(),
        last_emit: Instant::now(),
        poll_interval,
        heartbeat_after,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queue.pop_front() {
                state.cursor = event.seq_no;
                state.last_emit = Instant::now();
                return Some((SseFrame::Event(event), state));
            }
            if state.finished {
                return None;
            }

            tokio::time::sleep(state.poll_interval).await;
            let events = state
                .store
                .list_telemetry_events_after(state.run_id, state.cursor)
                .await
                .unwrap_or_default();

            if events.is_empty() {
                let run_terminal = matches!(
                    state.store.get_run(state.run_id).await.map(|run| run.status),
                    Ok(RunStatus::Completed) | Ok(RunStatus::Failed)
                );
                if run_terminal {
                    state.finished = true;
                    continue;
                }
                if state.last_emit.elapsed() >= state.heartbeat_after {
                    state.last_emit = Instant::now();
                    return Some((SseFrame::Heartbeat, state));
                }
                continue;
            }

            state.queue.extend(events);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use store::memory::MemoryStore;

    #[tokio::test]
    async fn emitted_events_get_increasing_seq_numbers() {
        let memory = MemoryStore::new();
        let run_id = RunId(1);
        let first = emit(&memory, run_id, None, "run.started", json!({})).await.unwrap();
        let second = emit(&memory, run_id, None, "run.completed", json!({})).await.unwrap();
        assert_eq!(first.seq_no, 1);
        assert_eq!(second.seq_no, 2);
    }

    #[test]
    fn start_cursor_prefers_query_param_over_header() {
        assert_eq!(resolve_start_cursor(Some(5), Some("2")), 5);
        assert_eq!(resolve_start_cursor(None, Some("2")), 2);
        assert_eq!(resolve_start_cursor(None, None), 0);
    }

    #[tokio::test]
    async fn subscribe_terminates_after_run_completes_with_no_new_events() {
        let memory = Arc::new(MemoryStore::new());
        let run = memory
            .create_run(store::Run {
                id: RunId(0),
                suite_id: store::SuiteId(1),
                status: RunStatus::Running,
                started_at: None,
                finished_at: None,
                selected_car_ids: vec![],
                judge_car_id: None,
            })
            .await
            .unwrap();
        emit(memory.as_ref(), run.id, None, "run.started", json!({})).await.unwrap();

        let mut completed = run.clone();
        completed.status = RunStatus::Completed;
        memory.update_run(completed).await.unwrap();

        let frames: Vec<SseFrame> = subscribe(
            memory.clone(),
            run.id,
            0,
            Duration::from_millis(1),
            Duration::from_secs(60),
        )
        .collect()
        .await;

        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], SseFrame::Event(_)));
    }
}
