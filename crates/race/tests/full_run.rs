//! End-to-end "full loop" scenario from spec.md §8 #5: a mocked
//! OpenAI-compatible provider answers four tests, and the whole
//! (queue -> run -> item -> metrics) pipeline is exercised without a real
//! model endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::{Json, Router};
use provider::{OpenRouterAttribution, PassthroughSecretSource};
use race::RaceExecutor;
use serde_json::Value;
use store::{
    Car, CarId, Connection, ConnectionId, ConnectionType, Run, RunId, RunItem, RunItemId, RunItemStatus, RunStatus,
    Store, Suite, SuiteId, Test, TestId,
};

async fn chat_completions(Json(body): Json<Value>) -> String {
    let model = body["model"].as_str().unwrap_or("unknown");
    format!(
        "data: {{\"choices\":[{{\"delta\":{{\"content\":\"model={model} prompt_ok\"}}}}]}}\n\ndata: [DONE]\n\n"
    )
}

async fn spawn_mock_server() -> String {
    let app = Router::new().route("/v1/chat/completions", post(chat_completions));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn full_loop_completes_run_with_metrics_and_telemetry() {
    let base_url = spawn_mock_server().await;
    let store: Arc<dyn Store> = Arc::new(store::memory::MemoryStore::new());

    let connection = store
        .create_connection(Connection {
            id: ConnectionId(0),
            name: "mock".into(),
            r#type: ConnectionType::OpenaiCompat,
            base_url,
            api_key_encrypted: None,
            api_key_env_var: None,
        })
        .await
        .unwrap();

    let car = store
        .create_car(Car {
            id: CarId(0),
            name: "mock-car".into(),
            connection_id: connection.id,
            model_name: "mock-model".into(),
            temperature: Some(0.0),
            top_p: None,
            max_tokens: None,
            stop: None,
            seed: None,
        })
        .await
        .unwrap();

    let suite = store
        .create_suite(Suite {
            id: SuiteId(0),
            name: "smoke".into(),
            category: "demo".into(),
            is_demo: true,
        })
        .await
        .unwrap();

    let mut tests = Vec::new();
    for i in 0..4 {
        let test = store
            .create_test(Test {
                id: TestId(0),
                suite_id: suite.id,
                order_index: i,
                name: format!("test-{i}"),
                system_prompt: None,
                user_prompt: format!("say hello #{i}"),
                expected_constraints: None,
                tools_schema: None,
            })
            .await
            .unwrap();
        tests.push(test);
    }

    let run = store
        .create_run(Run {
            id: RunId(0),
            suite_id: suite.id,
            status: RunStatus::Queued,
            started_at: None,
            finished_at: None,
            selected_car_ids: vec![car.id],
            judge_car_id: None,
        })
        .await
        .unwrap();

    for test in &tests {
        store
            .create_run_item(RunItem {
                id: RunItemId(0),
                run_id: run.id,
                test_id: test.id,
                car_id: car.id,
                status: RunItemStatus::Pending,
                attempt_count: 0,
                started_at: None,
                finished_at: None,
                error_message: None,
            })
            .await
            .unwrap();
    }

    let executor = RaceExecutor::new(
        Arc::clone(&store),
        Arc::new(PassthroughSecretSource),
        OpenRouterAttribution::default(),
        3,
    );
    executor.start().await;
    executor.enqueue(run.id);

    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let run = store.get_run(run.id).await.unwrap();
            if matches!(run.status, RunStatus::Completed | RunStatus::Failed) {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("run finished within timeout");
    executor.stop().await;

    assert_eq!(finished.status, RunStatus::Completed);

    let items = store.list_run_items_by_run(run.id).await.unwrap();
    assert_eq!(items.len(), 4);
    for item in &items {
        assert_eq!(item.status, RunItemStatus::Completed);
        let output = store.get_output(item.id).await.unwrap();
        assert!(output.final_text.unwrap().contains("mock-model"));
        let metric = store.get_metric(item.id).await.unwrap();
        assert!(!metric.error_flag);
    }

    let events = store.list_telemetry_events_after(run.id, 0).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == "run.started"));
    assert!(events.iter().any(|e| e.event_type == "run.completed"));
    let seq_nos: Vec<u64> = events.iter().map(|e| e.seq_no).collect();
    let mut sorted = seq_nos.clone();
    sorted.sort_unstable();
    assert_eq!(seq_nos, sorted, "telemetry seq_no must be non-decreasing in append order");
}
