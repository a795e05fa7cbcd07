//! Abstract persistence seam for the benchmark data model.
//!
//! The real persistence schema is an external collaborator; this crate
//! defines the [`Store`] trait plus [`memory::MemoryStore`], an in-process
//! reference implementation sufficient to run and test the engine end to
//! end without a database.

pub mod error;
pub mod ids;
pub mod memory;
pub mod model;

use async_trait::async_trait;

pub use error::{StoreError, StoreResult};
pub use ids::{CarId, ConnectionId, RunId, RunItemId, SuiteId, TestId};
pub use model::*;

/// Everything `race`, `judge`, `views`, and `server` need from persistence.
///
/// Implementations must make [`Store::append_telemetry_event`] atomic with
/// respect to `seq_no` assignment per `run_id`: two concurrent callers for
/// the same run must never observe or assign the same `seq_no`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_connection(&self, connection: Connection) -> StoreResult<Connection>;
    async fn get_connection(&self, id: ConnectionId) -> StoreResult<Connection>;
    async fn list_connections(&self) -> StoreResult<Vec<Connection>>;
    async fn update_connection(&self, connection: Connection) -> StoreResult<()>;
    async fn delete_connection(&self, id: ConnectionId) -> StoreResult<()>;

    async fn create_car(&self, car: Car) -> StoreResult<Car>;
    async fn get_car(&self, id: CarId) -> StoreResult<Car>;
    async fn list_cars(&self) -> StoreResult<Vec<Car>>;
    async fn list_cars_by_connection(&self, connection_id: ConnectionId) -> StoreResult<Vec<Car>>;
    async fn update_car(&self, car: Car) -> StoreResult<()>;
    async fn delete_car(&self, id: CarId) -> StoreResult<()>;

    async fn create_suite(&self, suite: Suite) -> StoreResult<Suite>;
    async fn get_suite(&self, id: SuiteId) -> StoreResult<Suite>;
    async fn list_suites(&self) -> StoreResult<Vec<Suite>>;
    async fn update_suite(&self, suite: Suite) -> StoreResult<()>;
    async fn delete_suite(&self, id: SuiteId) -> StoreResult<()>;

    async fn create_test(&self, test: Test) -> StoreResult<Test>;
    async fn get_test(&self, id: TestId) -> StoreResult<Test>;
    async fn list_tests_by_suite(&self, suite_id: SuiteId) -> StoreResult<Vec<Test>>;
    async fn update_test(&self, test: Test) -> StoreResult<()>;
    async fn delete_test(&self, id: TestId) -> StoreResult<()>;

    /// Falls back to [`ProviderSettings::default`] with `provider_type` set
    /// when no row has been configured for this provider type.
    async fn get_provider_settings(&self, provider_type: &str) -> StoreResult<ProviderSettings>;
    async fn upsert_provider_settings(&self, settings: ProviderSettings) -> StoreResult<()>;
    /// Lists every provider type with an explicitly configured row; types
    /// still running on defaults are not included.
    async fn list_provider_settings(&self) -> StoreResult<Vec<ProviderSettings>>;

    async fn create_run(&self, run: Run) -> StoreResult<Run>;
    async fn get_run(&self, id: RunId) -> StoreResult<Run>;
    async fn list_runs(&self) -> StoreResult<Vec<Run>>;
    async fn update_run(&self, run: Run) -> StoreResult<()>;

    async fn create_run_item(&self, item: RunItem) -> StoreResult<RunItem>;
    async fn get_run_item(&self, id: RunItemId) -> StoreResult<RunItem>;
    async fn list_run_items_by_run(&self, run_id: RunId) -> StoreResult<Vec<RunItem>>;
    async fn update_run_item(&self, item: RunItem) -> StoreResult<()>;

    async fn upsert_output(&self, output: Output) -> StoreResult<()>;
    async fn get_output(&self, run_item_id: RunItemId) -> StoreResult<Output>;

    async fn upsert_metric(&self, metric: Metric) -> StoreResult<()>;
    async fn get_metric(&self, run_item_id: RunItemId) -> StoreResult<Metric>;
    async fn list_metrics_by_run(&self, run_id: RunId) -> StoreResult<Vec<Metric>>;

    async fn append_tool_call(&self, call: ToolCall) -> StoreResult<()>;
    async fn list_tool_calls_by_run_item(&self, run_item_id: RunItemId) -> StoreResult<Vec<ToolCall>>;

    async fn insert_judge_result(&self, result: JudgeResult) -> StoreResult<()>;
    async fn delete_judge_results_by_run(&self, run_id: RunId) -> StoreResult<()>;
    async fn list_judge_results_by_run(&self, run_id: RunId) -> StoreResult<Vec<JudgeResult>>;

    /// Assigns the next `seq_no` for `event.run_id` and appends atomically.
    /// Any `seq_no` on the passed-in event is ignored and overwritten.
    async fn append_telemetry_event(&self, event: TelemetryEvent) -> StoreResult<TelemetryEvent>;
    async fn list_telemetry_events_after(
        &self,
        run_id: RunId,
        after_seq: u64,
    ) -> StoreResult<Vec<TelemetryEvent>>;
}
