//! Scheduler, per-provider semaphores, retry/backoff, tool loop, and
//! run-state machine (spec.md §4.E).
//!
//! Grounded on the original `RaceExecutor` (runs/executor.py): FIFO queue +
//! worker task, per-run/per-item/per-attempt procedures. The inner (test,
//! car) loop is executed in parallel per test, one task per pair joined
//! before the next test starts, using the per-provider-type semaphore as
//! the real admission gate rather than a no-op — the extension spec.md §9
//! explicitly allows.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use fastrace::future::FutureExt as _;
use fastrace::prelude::SpanContext;
use fastrace::Span;
use futures::StreamExt;
use jiff::Timestamp;
use provider::{
    GenerateEvent, NormalizedMessage, OpenRouterAttribution, ProviderResponse, SecretSource,
    ToolCall as ProviderToolCall,
};
use serde_json::json;
use store::{
    Car, Connection, Metric, Output, ProviderSettings, ProviderStyle, RunId, RunItemId, RunItemStatus, RunStatus,
    Store, StoredMessage, Test, ToolCall as StoreToolCall, ToolCallStatus,
};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::error::RaceError;
use crate::request::build_request;

/// FIFO queue + semaphore-gated worker that drains it. Construct once per
/// process and share behind an `Arc`.
pub struct RaceExecutor {
    store: Arc<dyn Store>,
    secrets: Arc<dyn SecretSource>,
    attribution: OpenRouterAttribution,
    tool_loop_limit: u32,
    semaphores: DashMap<String, Arc<Semaphore>>,
    queue_tx: mpsc::UnboundedSender<RunId>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<RunId>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RaceExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        secrets: Arc<dyn SecretSource>,
        attribution: OpenRouterAttribution,
        tool_loop_limit: u32,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            store,
            secrets,
            attribution,
            tool_loop_limit: tool_loop_limit.max(1),
            semaphores: DashMap::new(),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            worker: Mutex::new(None),
        })
    }

    /// Enqueues a run for the worker task to pick up. Idempotent per call;
    /// callers are responsible for not enqueuing the same run twice.
    pub fn enqueue(&self, run_id: RunId) {
        let _ = self.queue_tx.send(run_id);
    }

    /// Spawns the worker task if it isn't already running.
    pub async fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return;
        }
        let Some(mut queue_rx) = self.queue_rx.lock().await.take() else {
            return;
        };
        let executor = Arc::clone(self);
        *worker = Some(tokio::spawn(async move {
            while let Some(run_id) = queue_rx.recv().await {
                if let Err(err) = Arc::clone(&executor).execute_run(run_id).await {
                    log::error!("run {run_id} aborted: {err}");
                    executor.fail_run(run_id, err.to_string()).await;
                }
            }
        }));
    }

    /// Cancels and awaits the worker task.
    pub async fn stop(&self) {
        if let Some(handle) = self.worker.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
    }

    fn semaphore_for(&self, key: &str, max_in_flight: u32) -> Arc<Semaphore> {
        self.semaphores
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(max_in_flight.max(1) as usize)))
            .clone()
    }

    async fn fail_run(&self, run_id: RunId, error: String) {
        if let Ok(mut run) = self.store.get_run(run_id).await {
            run.status = RunStatus::Failed;
            run.finished_at = Some(Timestamp::now());
            let _ = self.store.update_run(run).await;
            let _ = eventlog::emit(
                self.store.as_ref(),
                run_id,
                None,
                "run.completed",
                json!({ "status": "FAILED", "error": error }),
            )
            .await;
        }
    }

    async fn execute_run(self: Arc<Self>, run_id: RunId) -> Result<(), RaceError> {
        let span = Span::root("race.run", SpanContext::random());
        self.execute_run_inner(run_id).in_span(span).await
    }

    async fn execute_run_inner(self: Arc<Self>, run_id: RunId) -> Result<(), RaceError> {
        let mut run = self.store.get_run(run_id).await?;
        run.status = RunStatus::Running;
        run.started_at = Some(Timestamp::now());
        self.store.update_run(run.clone()).await?;
        eventlog::emit(self.store.as_ref(), run_id, None, "run.started", json!({ "status": "RUNNING" })).await?;

        let suite = self.store.get_suite(run.suite_id).await?;
        let mut tests = self.store.list_tests_by_suite(suite.id).await?;
        tests.sort_by_key(|test| test.order_index);

        let mut cars_by_id = std::collections::HashMap::new();
        for car_id in &run.selected_car_ids {
            if let Ok(car) = self.store.get_car(*car_id).await {
                cars_by_id.insert(*car_id, car);
            }
        }
        let ordered_cars: Vec<Car> = run
            .selected_car_ids
            .iter()
            .filter_map(|id| cars_by_id.get(id).cloned())
            .collect();

        for test in &tests {
            let run_items = self.store.list_run_items_by_run(run_id).await?;
            let mut joins = Vec::new();

            for car in &ordered_cars {
                let Some(run_item) = run_items.iter().find(|item| item.test_id == test.id && item.car_id == car.id)
                else {
                    continue;
                };

                let connection = match self.store.get_connection(car.connection_id).await {
                    Ok(connection) => connection,
                    Err(_) => {
                        let mut failed = run_item.clone();
                        failed.status = RunItemStatus::Failed;
                        failed.error_message = Some("Connection missing".to_string());
                        self.store.update_run_item(failed).await?;
                        eventlog::emit(
                            self.store.as_ref(),
                            run_id,
                            Some(run_item.id),
                            "item.error",
                            json!({ "error": "Connection missing", "car_id": car.id.0, "test_id": test.id.0 }),
                        )
                        .await?;
                        continue;
                    }
                };

                let executor = Arc::clone(&self);
                let test = test.clone();
                let car = car.clone();
                let run_item_id = run_item.id;
                joins.push(tokio::spawn(async move {
                    executor.execute_item(run_id, run_item_id, test, car, connection).await
                }));
            }

            for join in joins {
                match join.await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => log::warn!("item execution ended in error: {err}"),
                    Err(err) => log::warn!("item execution task panicked: {err}"),
                }
            }
        }

        let run_items = self.store.list_run_items_by_run(run_id).await?;
        let total_items = run_items.len();
        let failed_items = run_items.iter().filter(|item| item.status == RunItemStatus::Failed).count();

        let mut run = self.store.get_run(run_id).await?;
        run.status = if total_items > 0 && failed_items == total_items {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        run.finished_at = Some(Timestamp::now());
        self.store.update_run(run.clone()).await?;

        let status_label = match run.status {
            RunStatus::Failed => "FAILED",
            RunStatus::Completed => "COMPLETED",
            _ => "RUNNING",
        };
        eventlog::emit(self.store.as_ref(), run_id, None, "run.completed", json!({ "status": status_label })).await?;

        Ok(())
    }

    async fn execute_item(
        self: Arc<Self>,
        run_id: RunId,
        run_item_id: RunItemId,
        test: Test,
        car: Car,
        connection: Connection,
    ) -> Result<(), RaceError> {
        let span = Span::root("race.item", SpanContext::random());
        self.execute_item_inner(run_id, run_item_id, test, car, connection)
            .in_span(span)
            .await
    }

    async fn execute_item_inner(
        self: Arc<Self>,
        run_id: RunId,
        run_item_id: RunItemId,
        test: Test,
        car: Car,
        connection: Connection,
    ) -> Result<(), RaceError> {
        let provider_settings = match self.store.get_provider_settings(connection.r#type.as_key()).await {
            Ok(settings) => settings,
            Err(_) => ProviderSettings {
                provider_type: connection.r#type.as_key().to_string(),
                ..Default::default()
            },
        };

        let mut run_item = self.store.get_run_item(run_item_id).await?;
        run_item.status = RunItemStatus::Running;
        run_item.started_at = Some(Timestamp::now());
        self.store.update_run_item(run_item).await?;

        eventlog::emit(
            self.store.as_ref(),
            run_id,
            Some(run_item_id),
            "item.started",
            json!({ "run_item_id": run_item_id.0, "car_id": car.id.0, "test_id": test.id.0 }),
        )
        .await?;

        let retries = provider_settings.retry_count;
        let backoff = Duration::from_millis(provider_settings.retry_backoff_ms);

        let mut last_error = None;
        for attempt in 1..=(retries + 1) {
            match self
                .clone()
                .execute_item_attempt(run_id, run_item_id, attempt, &test, &car, &connection, &provider_settings)
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let retrying = attempt <= retries;
                    last_error = Some(err.to_string());
                    eventlog::emit(
                        self.store.as_ref(),
                        run_id,
                        Some(run_item_id),
                        "item.error",
                        json!({
                            "run_item_id": run_item_id.0,
                            "attempt": attempt,
                            "error": last_error,
                            "retrying": retrying,
                        }),
                    )
                    .await?;
                    if retrying {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        let mut run_item = self.store.get_run_item(run_item_id).await?;
        run_item.status = RunItemStatus::Failed;
        run_item.error_message = last_error;
        run_item.finished_at = Some(Timestamp::now());
        self.store.update_run_item(run_item).await?;

        if self.store.get_metric(run_item_id).await.is_err() {
            self.store
                .upsert_metric(Metric {
                    run_item_id,
                    ttft_ms: None,
                    total_latency_ms: None,
                    generation_ms: None,
                    output_tokens: 0,
                    output_tokens_estimated: true,
                    tokens_per_sec: None,
                    error_flag: true,
                })
                .await?;
        }

        eventlog::emit(
            self.store.as_ref(),
            run_id,
            Some(run_item_id),
            "item.completed",
            json!({ "run_item_id": run_item_id.0, "status": "FAILED" }),
        )
        .await?;

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_item_attempt(
        self: Arc<Self>,
        run_id: RunId,
        run_item_id: RunItemId,
        attempt_number: u32,
        test: &Test,
        car: &Car,
        connection: &Connection,
        provider_settings: &ProviderSettings,
    ) -> Result<(), RaceError> {
        let mut run_item = self.store.get_run_item(run_item_id).await?;
        run_item.attempt_count = attempt_number;
        self.store.update_run_item(run_item).await?;

        let semaphore = self.semaphore_for(connection.r#type.as_key(), provider_settings.max_in_flight);
        let timeout = Duration::from_millis(provider_settings.timeout_ms);

        let request_template = build_request(car, test);
        let mut loop_messages = request_template.messages.clone();

        let started = Instant::now();
        let mut ttft: Option<Duration> = None;
        let mut streamed_text = String::new();
        let mut last_response: Option<ProviderResponse> = None;
        let mut tool_loop_exhausted = false;

        let permit = semaphore
            .acquire()
            .await
            .map_err(|_| RaceError::Missing("provider semaphore closed".into()))?;

        for loop_idx in 0..self.tool_loop_limit {
            let mut request = request_template.clone();
            request.messages = loop_messages.clone();

            eventlog::emit(
                self.store.as_ref(),
                run_id,
                Some(run_item_id),
                "request.sent",
                json!({ "run_item_id": run_item_id.0, "attempt": attempt_number, "loop": loop_idx, "model": request.model }),
            )
            .await?;

            let mut stream = provider::generate(connection, self.secrets.as_ref(), &self.attribution, &request, timeout).await?;

            let mut response: Option<ProviderResponse> = None;
            while let Some(event) = stream.next().await {
                match event {
                    GenerateEvent::Token(token) => {
                        if ttft.is_none() {
                            let elapsed = started.elapsed();
                            ttft = Some(elapsed);
                            eventlog::emit(
                                self.store.as_ref(),
                                run_id,
                                Some(run_item_id),
                                "ttft.recorded",
                                json!({ "run_item_id": run_item_id.0, "ttft_ms": elapsed.as_millis() as i64 }),
                            )
                            .await?;
                        }
                        streamed_text.push_str(&token);
                        eventlog::emit(
                            self.store.as_ref(),
                            run_id,
                            Some(run_item_id),
                            "token.delta",
                            json!({ "run_item_id": run_item_id.0, "token": token }),
                        )
                        .await?;
                    }
                    GenerateEvent::Telemetry { event_type, payload } => {
                        eventlog::emit(self.store.as_ref(), run_id, Some(run_item_id), &event_type, payload).await?;
                    }
                    GenerateEvent::Done(boxed) => response = Some(*boxed),
                }
            }

            let response = response.ok_or_else(|| RaceError::Missing("provider stream ended without a final response".into()))?;

            let mut tool_calls: Vec<ProviderToolCall> = response.tool_calls.clone();
            let mut provider_style = ProviderStyle::Native;

            if tool_calls.is_empty()
                && let Some(fallback) = tools::parse_fallback_tool_command(&response.text)
            {
                tool_calls = vec![ProviderToolCall {
                    id: format!("fallback_{loop_idx}"),
                    name: fallback.name,
                    arguments: fallback.arguments,
                }];
                provider_style = ProviderStyle::Fallback;
            }

            let response_text = response.text.clone();
            last_response = Some(response);

            if tool_calls.is_empty() {
                break;
            }

            if loop_idx == self.tool_loop_limit - 1 {
                tool_loop_exhausted = true;
            }

            if !response_text.is_empty() {
                loop_messages.push(NormalizedMessage::assistant(response_text));
            }

            for tool_call in &tool_calls {
                let args = if tool_call.arguments.is_object() {
                    tool_call.arguments.clone()
                } else {
                    json!({ "raw": tool_call.arguments })
                };

                let (result, status) = match tools::execute_tool(&tool_call.name, &args) {
                    Ok(result) => (result, ToolCallStatus::Ok),
                    Err(err) => (json!({ "error": err.to_string() }), ToolCallStatus::Error),
                };

                self.store
                    .append_tool_call(StoreToolCall {
                        run_item_id,
                        loop_index: loop_idx,
                        tool_name: tool_call.name.clone(),
                        args: args.clone(),
                        result: result.clone(),
                        status,
                        provider_style,
                    })
                    .await?;

                eventlog::emit(
                    self.store.as_ref(),
                    run_id,
                    Some(run_item_id),
                    "tool.call.executed",
                    json!({
                        "run_item_id": run_item_id.0,
                        "tool_name": tool_call.name,
                        "args": args,
                        "result": result,
                        "status": if status == ToolCallStatus::Ok { "ok" } else { "error" },
                    }),
                )
                .await?;

                loop_messages.push(NormalizedMessage::tool(
                    serde_json::to_string(&result).unwrap_or_else(|_| "null".to_string()),
                    tool_call.id.clone(),
                    tool_call.name.clone(),
                ));
            }

            eventlog::emit(
                self.store.as_ref(),
                run_id,
                Some(run_item_id),
                "tool.loop.continue",
                json!({ "run_item_id": run_item_id.0, "loop": loop_idx, "tool_calls": tool_calls.len() }),
            )
            .await?;
        }

        drop(permit);

        if tool_loop_exhausted {
            eventlog::emit(
                self.store.as_ref(),
                run_id,
                Some(run_item_id),
                "tool.loop.exhausted",
                json!({ "run_item_id": run_item_id.0, "limit": self.tool_loop_limit }),
            )
            .await?;
        }

        let finished_ms = started.elapsed().as_millis() as i64;
        let output_text = if !streamed_text.is_empty() {
            streamed_text.clone()
        } else {
            last_response.as_ref().map(|response| response.text.clone()).unwrap_or_default()
        };

        let usage = last_response.as_ref().map(|response| response.usage.clone()).unwrap_or_default();

        let metric_values = metrics::compute_metrics(
            0,
            finished_ms,
            ttft.map(|d| d.as_millis() as i64),
            &output_text,
            Some(usage.completion_tokens),
            usage.estimated,
        );

        let assertion_summary = metrics::evaluate_expected_constraints(test.expected_constraints.as_deref(), &output_text);

        let mut raw = last_response.as_ref().map(|response| response.raw.clone()).unwrap_or_else(|| json!({}));
        if assertion_summary.total > 0
            && let Some(object) = raw.as_object_mut()
        {
            object.insert(
                "assertions".into(),
                serde_json::to_value(&assertion_summary).unwrap_or(serde_json::Value::Null),
            );
        }

        let request_messages: Vec<StoredMessage> = loop_messages
            .iter()
            .map(|message| StoredMessage {
                role: message.role.clone(),
                content: message.content.clone(),
                tool_call_id: message.tool_call_id.clone(),
                name: message.name.clone(),
            })
            .collect();

        self.store
            .upsert_output(Output {
                run_item_id,
                request_messages,
                streamed_text: (!streamed_text.is_empty()).then_some(streamed_text),
                final_text: Some(output_text.clone()),
                raw_provider_payload: Some(raw),
            })
            .await?;

        self.store
            .upsert_metric(Metric {
                run_item_id,
                ttft_ms: metric_values.ttft_ms,
                total_latency_ms: Some(metric_values.total_latency_ms),
                generation_ms: metric_values.generation_ms,
                output_tokens: metric_values.output_tokens,
                output_tokens_estimated: metric_values.output_tokens_estimated,
                tokens_per_sec: metric_values.tokens_per_sec,
                error_flag: false,
            })
            .await?;

        let mut run_item = self.store.get_run_item(run_item_id).await?;
        run_item.status = if tool_loop_exhausted {
            RunItemStatus::PartialToolSupport
        } else {
            RunItemStatus::Completed
        };
        run_item.finished_at = Some(Timestamp::now());
        run_item.error_message = None;
        self.store.update_run_item(run_item.clone()).await?;

        eventlog::emit(
            self.store.as_ref(),
            run_id,
            Some(run_item_id),
            "item.metrics",
            json!({
                "run_item_id": run_item_id.0,
                "ttft_ms": metric_values.ttft_ms,
                "latency_ms": metric_values.total_latency_ms,
                "tokens_per_sec": metric_values.tokens_per_sec,
                "output_tokens": metric_values.output_tokens,
                "estimated": metric_values.output_tokens_estimated,
            }),
        )
        .await?;

        if assertion_summary.total > 0 {
            eventlog::emit(
                self.store.as_ref(),
                run_id,
                Some(run_item_id),
                "item.assertions",
                json!({ "run_item_id": run_item_id.0, "passed": assertion_summary.passed, "total": assertion_summary.total }),
            )
            .await?;
        }

        let status_label = if run_item.status == RunItemStatus::PartialToolSupport {
            "PARTIAL_TOOL_SUPPORT"
        } else {
            "COMPLETED"
        };
        eventlog::emit(
            self.store.as_ref(),
            run_id,
            Some(run_item_id),
            "item.completed",
            json!({ "run_item_id": run_item_id.0, "status": status_label }),
        )
        .await?;

        Ok(())
    }
}
