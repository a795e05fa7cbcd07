//! In-process reference implementation of [`crate::Store`].
//!
//! Backed by `dashmap` for lock-free reads/writes across independent keys,
//! plus one `tokio::sync::Mutex` per run id to serialize telemetry `seq_no`
//! assignment (the "in-process per-run lock" option the race engine's
//! concurrency model allows).

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use jiff::Timestamp;
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::ids::{CarId, ConnectionId, RunId, RunItemId, SuiteId, TestId};
use crate::model::*;
use crate::Store;

#[derive(Default)]
struct IdGen {
    connection: AtomicU64,
    car: AtomicU64,
    suite: AtomicU64,
    test: AtomicU64,
    run: AtomicU64,
    run_item: AtomicU64,
}

impl IdGen {
    fn next(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// In-memory [`Store`]. Cheap to clone (wraps `Arc`-backed maps internally
/// via `dashmap`); construct one per process and share behind an `Arc`.
#[derive(Default)]
pub struct MemoryStore {
    ids: IdGen,
    connections: DashMap<ConnectionId, Connection>,
    cars: DashMap<CarId, Car>,
    suites: DashMap<SuiteId, Suite>,
    tests: DashMap<TestId, Test>,
    provider_settings: DashMap<String, ProviderSettings>,
    runs: DashMap<RunId, Run>,
    run_items: DashMap<RunItemId, RunItem>,
    outputs: DashMap<RunItemId, Output>,
    metrics: DashMap<RunItemId, Metric>,
    tool_calls: DashMap<RunItemId, Vec<ToolCall>>,
    judge_results: DashMap<RunId, Vec<JudgeResult>>,
    telemetry: DashMap<RunId, Vec<TelemetryEvent>>,
    telemetry_locks: DashMap<RunId, Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(kind: &'static str, id: impl std::fmt::Display) -> StoreError {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_connection(&self, mut connection: Connection) -> StoreResult<Connection> {
        connection.id = ConnectionId(IdGen::next(&self.ids.connection));
        self.connections.insert(connection.id, connection.clone());
        Ok(connection)
    }

    async fn get_connection(&self, id: ConnectionId) -> StoreResult<Connection> {
        self.connections
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Self::not_found("Connection", id))
    }

    async fn list_connections(&self) -> StoreResult<Vec<Connection>> {
        Ok(self.connections.iter().map(|e| e.value().clone()).collect())
    }

    async fn update_connection(&self, connection: Connection) -> StoreResult<()> {
        if !self.connections.contains_key(&connection.id) {
            return Err(Self::not_found("Connection", connection.id));
        }
        self.connections.insert(connection.id, connection);
        Ok(())
    }

    async fn delete_connection(&self, id: ConnectionId) -> StoreResult<()> {
        self.connections
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("Connection", id))
    }

    async fn create_car(&self, mut car: Car) -> StoreResult<Car> {
        car.id = CarId(IdGen::next(&self.ids.car));
        self.cars.insert(car.id, car.clone());
        Ok(car)
    }

    async fn get_car(&self, id: CarId) -> StoreResult<Car> {
        self.cars
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Self::not_found("Car", id))
    }

    async fn list_cars(&self) -> StoreResult<Vec<Car>> {
        Ok(self.cars.iter().map(|e| e.value().clone()).collect())
    }

    async fn list_cars_by_connection(&self, connection_id: ConnectionId) -> StoreResult<Vec<Car>> {
        Ok(self
            .cars
            .iter()
            .filter(|e| e.value().connection_id == connection_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn update_car(&self, car: Car) -> StoreResult<()> {
        if !self.cars.contains_key(&car.id) {
            return Err(Self::not_found("Car", car.id));
        }
        self.cars.insert(car.id, car);
        Ok(())
    }

    async fn delete_car(&self, id: CarId) -> StoreResult<()> {
        self.cars
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("Car", id))
    }

    async fn create_suite(&self, mut suite: Suite) -> StoreResult<Suite> {
        suite.id = SuiteId(IdGen::next(&self.ids.suite));
        self.suites.insert(suite.id, suite.clone());
        Ok(suite)
    }

    async fn get_suite(&self, id: SuiteId) -> StoreResult<Suite> {
        self.suites
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Self::not_found("Suite", id))
    }

    async fn list_suites(&self) -> StoreResult<Vec<Suite>> {
        Ok(self.suites.iter().map(|e| e.value().clone()).collect())
    }

    async fn update_suite(&self, suite: Suite) -> StoreResult<()> {
        if !self.suites.contains_key(&suite.id) {
            return Err(Self::not_found("Suite", suite.id));
        }
        self.suites.insert(suite.id, suite);
        Ok(())
    }

    async fn delete_suite(&self, id: SuiteId) -> StoreResult<()> {
        self.suites
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("Suite", id))
    }

    async fn create_test(&self, mut test: Test) -> StoreResult<Test> {
        test.id = TestId(IdGen::next(&self.ids.test));
        self.tests.insert(test.id, test.clone());
        Ok(test)
    }

    async fn get_test(&self, id: TestId) -> StoreResult<Test> {
        self.tests
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Self::not_found("Test", id))
    }

    async fn list_tests_by_suite(&self, suite_id: SuiteId) -> StoreResult<Vec<Test>> {
        let mut tests: Vec<Test> = self
            .tests
            .iter()
            .filter(|e| e.value().suite_id == suite_id)
            .map(|e| e.value().clone())
            .collect();
        tests.sort_by_key(|t| t.order_index);
        Ok(tests)
    }

    async fn update_test(&self, test: Test) -> StoreResult<()> {
        if !self.tests.contains_key(&test.id) {
            return Err(Self::not_found("Test", test.id));
        }
        self.tests.insert(test.id, test);
        Ok(())
    }

    async fn delete_test(&self, id: TestId) -> StoreResult<()> {
        self.tests
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("Test", id))
    }

    async fn get_provider_settings(&self, provider_type: &str) -> StoreResult<ProviderSettings> {
        Ok(self
            .provider_settings
            .get(provider_type)
            .map(|entry| entry.clone())
            .unwrap_or_else(|| ProviderSettings {
                provider_type: provider_type.to_string(),
                ..ProviderSettings::default()
            }))
    }

    async fn upsert_provider_settings(&self, settings: ProviderSettings) -> StoreResult<()> {
        self.provider_settings
            .insert(settings.provider_type.clone(), settings);
        Ok(())
    }

    async fn list_provider_settings(&self) -> StoreResult<Vec<ProviderSettings>> {
        Ok(self.provider_settings.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn create_run(&self, mut run: Run) -> StoreResult<Run> {
        run.id = RunId(IdGen::next(&self.ids.run));
        self.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, id: RunId) -> StoreResult<Run> {
        self.runs
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Self::not_found("Run", id))
    }

    async fn list_runs(&self) -> StoreResult<Vec<Run>> {
        Ok(self.runs.iter().map(|e| e.value().clone()).collect())
    }

    async fn update_run(&self, run: Run) -> StoreResult<()> {
        if !self.runs.contains_key(&run.id) {
            return Err(Self::not_found("Run", run.id));
        }
        self.runs.insert(run.id, run);
        Ok(())
    }

    async fn create_run_item(&self, mut item: RunItem) -> StoreResult<RunItem> {
        item.id = RunItemId(IdGen::next(&self.ids.run_item));
        self.run_items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_run_item(&self, id: RunItemId) -> StoreResult<RunItem> {
        self.run_items
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Self::not_found("RunItem", id))
    }

    async fn list_run_items_by_run(&self, run_id: RunId) -> StoreResult<Vec<RunItem>> {
        Ok(self
            .run_items
            .iter()
            .filter(|e| e.value().run_id == run_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn update_run_item(&self, item: RunItem) -> StoreResult<()> {
        if !self.run_items.contains_key(&item.id) {
            return Err(Self::not_found("RunItem", item.id));
        }
        self.run_items.insert(item.id, item);
        Ok(())
    }

    async fn upsert_output(&self, output: Output) -> StoreResult<()> {
        self.outputs.insert(output.run_item_id, output);
        Ok(())
    }

    async fn get_output(&self, run_item_id: RunItemId) -> StoreResult<Output> {
        self.outputs
            .get(&run_item_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Self::not_found("Output", run_item_id))
    }

    async fn upsert_metric(&self, metric: Metric) -> StoreResult<()> {
        self.metrics.insert(metric.run_item_id, metric);
        Ok(())
    }

    async fn get_metric(&self, run_item_id: RunItemId) -> StoreResult<Metric> {
        self.metrics
            .get(&run_item_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Self::not_found("Metric", run_item_id))
    }

    async fn list_metrics_by_run(&self, run_id: RunId) -> StoreResult<Vec<Metric>> {
        let item_ids: Vec<RunItemId> = self
            .run_items
            .iter()
            .filter(|e| e.value().run_id == run_id)
            .map(|e| e.value().id)
            .collect();
        Ok(item_ids
            .into_iter()
            .filter_map(|id| self.metrics.get(&id).map(|e| e.clone()))
            .collect())
    }

    async fn append_tool_call(&self, call: ToolCall) -> StoreResult<()> {
        self.tool_calls.entry(call.run_item_id).or_default().push(call);
        Ok(())
    }

    async fn list_tool_calls_by_run_item(&self, run_item_id: RunItemId) -> StoreResult<Vec<ToolCall>> {
        Ok(self
            .tool_calls
            .get(&run_item_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn insert_judge_result(&self, result: JudgeResult) -> StoreResult<()> {
        self.judge_results.entry(result.run_id).or_default().push(result);
        Ok(())
    }

    async fn delete_judge_results_by_run(&self, run_id: RunId) -> StoreResult<()> {
        self.judge_results.remove(&run_id);
        Ok(())
    }

    async fn list_judge_results_by_run(&self, run_id: RunId) -> StoreResult<Vec<JudgeResult>> {
        Ok(self
            .judge_results
            .get(&run_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn append_telemetry_event(&self, mut event: TelemetryEvent) -> StoreResult<TelemetryEvent> {
        let lock = self
            .telemetry_locks
            .entry(event.run_id)
            .or_insert_with(|| Mutex::new(()));
        let _guard = lock.lock().await;

        let mut events = self.telemetry.entry(event.run_id).or_default();
        let next_seq = events.last().map(|e| e.seq_no + 1).unwrap_or(1);
        event.seq_no = next_seq;
        event.created_at = Timestamp::now();
        events.push(event.clone());
        Ok(event)
    }

    async fn list_telemetry_events_after(
        &self,
        run_id: RunId,
        after_seq: u64,
    ) -> StoreResult<Vec<TelemetryEvent>> {
        Ok(self
            .telemetry
            .get(&run_id)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|e| e.seq_no > after_seq)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_connection() -> Connection {
        Connection {
            id: ConnectionId(0),
            name: "local".into(),
            r#type: ConnectionType::Ollama,
            base_url: "http://localhost:11434".into(),
            api_key_encrypted: None,
            api_key_env_var: None,
        }
    }

    #[tokio::test]
    async fn create_connection_assigns_incrementing_ids() {
        let store = MemoryStore::new();
        let a = store.create_connection(test_connection()).await.unwrap();
        let b = store.create_connection(test_connection()).await.unwrap();
        assert_eq!(a.id, ConnectionId(1));
        assert_eq!(b.id, ConnectionId(2));
    }

    #[tokio::test]
    async fn get_unknown_run_returns_not_found() {
        let store = MemoryStore::new();
        let err = store.get_run(RunId(42)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "Run", .. }));
    }

    #[tokio::test]
    async fn telemetry_seq_no_is_monotonic_per_run() {
        let store = MemoryStore::new();
        let run_id = RunId(1);
        for i in 0..5 {
            let event = TelemetryEvent {
                run_id,
                run_item_id: None,
                seq_no: 0,
                event_type: "test".into(),
                payload: json!({ "i": i }),
                created_at: Timestamp::now(),
            };
            let appended = store.append_telemetry_event(event).await.unwrap();
            assert_eq!(appended.seq_no, i + 1);
        }
        let events = store.list_telemetry_events_after(run_id, 2).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].seq_no, 3);
    }

    #[tokio::test]
    async fn provider_settings_falls_back_to_default() {
        let store = MemoryStore::new();
        let settings = store.get_provider_settings("OPENAI").await.unwrap();
        assert_eq!(settings.provider_type, "OPENAI");
        assert_eq!(settings.max_in_flight, 1);
    }
}
