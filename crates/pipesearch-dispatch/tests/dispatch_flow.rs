//! End-to-end dispatch tests against the scripted mock engine and the
//! in-memory solution store.

use std::sync::Arc;
use std::time::Duration;

use pipesearch_client::engine::SearchEngine;
use pipesearch_client::mock::{MockSearchEngine, MockSolution};
use pipesearch_client::{ClientError, SearchClient};
use pipesearch_core::config::SearchConfig;
use pipesearch_core::stubs::InMemorySolutionStore;
use pipesearch_core::traits::SolutionStore;
use pipesearch_core::types::{
    Metric, PipelineDescription, PipelineStep, SearchRequest, StatusEvent, StatusState, TaskType,
};
use pipesearch_dispatch::{
    DispatchError, PipelineCache, SearchInputs, SolutionDispatcher, SubmitPipeline, SubmitRequest,
};

fn search_config() -> SearchConfig {
    SearchConfig {
        pull_max: 128,
        pull_timeout_ms: 200,
        time_budget_minutes: 1,
    }
}

fn harness(
    engine: MockSearchEngine,
    config: &SearchConfig,
) -> (
    Arc<SolutionDispatcher>,
    Arc<InMemorySolutionStore>,
    Arc<MockSearchEngine>,
) {
    let engine = Arc::new(engine);
    let client = Arc::new(SearchClient::new(
        engine.clone() as Arc<dyn SearchEngine>,
        config,
    ));
    let store = Arc::new(InMemorySolutionStore::new());
    let dispatcher = Arc::new(SolutionDispatcher::new(
        client,
        store.clone() as Arc<dyn SolutionStore>,
    ));
    (dispatcher, store, engine)
}

fn request() -> SearchRequest {
    SearchRequest::new("ds_1852", "price", TaskType::Classification)
        .with_metrics(vec![Metric::Accuracy])
}

fn inputs() -> SearchInputs {
    SearchInputs::new("file:///data/train", "file:///data/test")
}

async fn drain(
    mut sub: pipesearch_dispatch::StatusSubscription,
) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Some(ev) = sub.recv().await {
        events.push(ev);
    }
    events
}

fn terminal_position(events: &[StatusEvent], solution_id: &str) -> usize {
    events
        .iter()
        .position(|ev| {
            ev.solution_id.as_deref() == Some(solution_id)
                && matches!(ev.state, StatusState::Solution(s) if s.is_terminal())
        })
        .unwrap_or_else(|| panic!("no terminal event for {}", solution_id))
}

/// Fan-out/join: the request-completed event is observed strictly after
/// every candidate's terminal status, for K in {0, 1, 10}.
#[tokio::test]
async fn test_fanout_join_ordering() {
    for k in [0usize, 1, 10] {
        let solutions: Vec<MockSolution> =
            (0..k).map(|i| MockSolution::new(format!("s-{}", i))).collect();
        let (dispatcher, store, engine) = harness(MockSearchEngine::new(solutions), &search_config());

        let handle = dispatcher.dispatch(request(), inputs()).await.unwrap();
        let sub = handle.subscribe();
        handle.wait().await.unwrap();
        let events = drain(sub).await;

        let last = events.last().unwrap();
        assert!(last.is_request_terminal(), "k={}: last event must be the request terminal", k);
        assert_eq!(last.state.to_string(), "REQUEST_COMPLETED");

        let request_terminal_pos = events.len() - 1;
        for i in 0..k {
            let pos = terminal_position(&events, &format!("s-{}", i));
            assert!(pos < request_terminal_pos, "k={}: candidate s-{} terminal after request terminal", k, i);
        }

        assert_eq!(store.solution_count(), k);
        assert_eq!(engine.end_search_count(), 1);
    }
}

/// Every candidate's persisted transitions pass through
/// PENDING→FITTING→SCORING→PRODUCING in order before the terminal.
#[tokio::test]
async fn test_candidate_milestones_persisted_in_order() {
    let (dispatcher, store, _engine) = harness(
        MockSearchEngine::new(vec![MockSolution::new("s-1").with_score("accuracy", 0.87)]),
        &search_config(),
    );

    let handle = dispatcher.dispatch(request(), inputs()).await.unwrap();
    handle.wait().await.unwrap();

    assert_eq!(
        store.solution_progress("s-1"),
        vec![
            "SOLUTION_PENDING",
            "SOLUTION_FITTING",
            "SOLUTION_SCORING",
            "SOLUTION_PRODUCING",
            "SOLUTION_COMPLETED",
        ]
    );
    assert_eq!(store.score_rows("s-1"), vec![("accuracy".to_string(), 0.87)]);

    let results = store.result_rows("s-1");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].fitted_solution_id, "fitted-s-1");
    assert_eq!(results[0].result_uri, "/results/s-1/predictions.csv");
    // The result row and the result table agree on the identifier.
    assert_eq!(
        store.result_uri(&results[0].result_id).as_deref(),
        Some("/results/s-1/predictions.csv")
    );
}

/// Error isolation: a candidate failing at the fit step leaves its
/// siblings COMPLETED and the request COMPLETED, not ERRORED.
#[tokio::test]
async fn test_candidate_error_isolation() {
    let (dispatcher, store, _engine) = harness(
        MockSearchEngine::new(vec![
            MockSolution::new("s-1"),
            MockSolution::new("s-2").failing_fit(),
            MockSolution::new("s-3"),
        ]),
        &search_config(),
    );

    let handle = dispatcher.dispatch(request(), inputs()).await.unwrap();
    let sub = handle.subscribe();
    handle.wait().await.unwrap();
    let events = drain(sub).await;

    assert!(store.solution_progress("s-1").ends_with(&["SOLUTION_COMPLETED".to_string()]));
    assert!(store.solution_progress("s-3").ends_with(&["SOLUTION_COMPLETED".to_string()]));
    assert!(store.solution_progress("s-2").ends_with(&["SOLUTION_ERRORED".to_string()]));

    let errored = events
        .iter()
        .find(|ev| ev.solution_id.as_deref() == Some("s-2") && ev.error.is_some())
        .expect("errored event for s-2");
    assert!(errored.error.as_ref().unwrap().contains("fit"));

    assert_eq!(events.last().unwrap().state.to_string(), "REQUEST_COMPLETED");
}

/// A persistence failure for one candidate is likewise isolated.
#[tokio::test]
async fn test_persistence_error_becomes_solution_errored() {
    let (dispatcher, store, _engine) = harness(
        MockSearchEngine::new(vec![MockSolution::new("s-1"), MockSolution::new("s-2")]),
        &search_config(),
    );
    store.fail_solution("s-2");

    let handle = dispatcher.dispatch(request(), inputs()).await.unwrap();
    let sub = handle.subscribe();
    handle.wait().await.unwrap();
    let events = drain(sub).await;

    assert!(store.solution_progress("s-1").ends_with(&["SOLUTION_COMPLETED".to_string()]));
    let errored = events
        .iter()
        .find(|ev| ev.solution_id.as_deref() == Some("s-2") && ev.error.is_some())
        .expect("errored event for s-2");
    assert!(errored.error.as_ref().unwrap().contains("injected"));
    assert_eq!(events.last().unwrap().state.to_string(), "REQUEST_COMPLETED");
}

/// A search-phase failure aborts the whole request and propagates to the
/// dispatch caller.
#[tokio::test]
async fn test_start_failure_aborts_request() {
    let (dispatcher, store, _engine) =
        harness(MockSearchEngine::new(vec![]).with_start_failure(), &search_config());

    let err = dispatcher.dispatch(request(), inputs()).await.unwrap_err();
    assert!(matches!(err, DispatchError::Client(ClientError::Connection(_))));

    let ids = store.request_ids();
    assert_eq!(ids.len(), 1);
    assert_eq!(
        store.request_progress(&ids[0]),
        vec!["REQUEST_PENDING", "REQUEST_ERRORED"]
    );
}

/// Listener attached late still observes the full history.
#[tokio::test]
async fn test_late_listener_replay() {
    let (dispatcher, _store, _engine) = harness(
        MockSearchEngine::new(vec![MockSolution::new("s-1")]),
        &search_config(),
    );

    let handle = dispatcher.dispatch(request(), inputs()).await.unwrap();
    // Let the whole search finish before anyone listens.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let sub = handle.subscribe();
    handle.wait().await.unwrap();
    let events = drain(sub).await;

    let states: Vec<String> = events.iter().map(|ev| ev.state.to_string()).collect();
    assert!(states.contains(&"REQUEST_PENDING".to_string()));
    assert!(states.contains(&"SOLUTION_PENDING".to_string()));
    assert!(states.contains(&"SOLUTION_COMPLETED".to_string()));
    assert_eq!(states.last().unwrap(), "REQUEST_COMPLETED");
}

/// Stopping one search cancels its in-flight work without touching a
/// concurrent search on the same dispatcher.
#[tokio::test]
async fn test_stop_cancels_only_its_search() {
    let config = SearchConfig {
        pull_max: 128,
        pull_timeout_ms: 10_000,
        time_budget_minutes: 1,
    };
    let (dispatcher, _store, engine) = harness(
        MockSearchEngine::new(vec![MockSolution::new("s-1")]).with_silent_search(1),
        &config,
    );

    // Search 1 hangs on a silent stream; search 2 proceeds normally.
    let hanging = dispatcher.dispatch(request(), inputs()).await.unwrap();
    let healthy = dispatcher.dispatch(request(), inputs()).await.unwrap();
    assert_ne!(hanging.search_id(), healthy.search_id());

    healthy.wait().await.unwrap();

    let stopped_id = hanging.search_id().to_string();
    dispatcher.stop(&stopped_id).await.unwrap();
    let err = hanging.wait().await.unwrap_err();
    assert!(matches!(err, DispatchError::Client(ClientError::Cancelled)));
    assert_eq!(engine.stop_search_count(), 1);
    // Both searches were formally ended with the engine.
    assert_eq!(engine.end_search_count(), 2);
}

/// Cache idempotence: two identical submissions issue exactly one remote
/// dispatch and return the same result URI.
#[tokio::test]
async fn test_submit_pipeline_cache_idempotence() {
    let (dispatcher, _store, engine) = harness(
        MockSearchEngine::new(vec![MockSolution::new("s-1")]),
        &search_config(),
    );
    let cache = Arc::new(PipelineCache::new());
    let facade = SubmitPipeline::new(dispatcher, cache.clone());

    let submit = SubmitRequest {
        pipeline: PipelineDescription::new(vec![PipelineStep::new(
            "primitives.learner.random_forest",
            "RandomForest",
        )]),
        dataset_id: "ds_1852".to_string(),
        target_feature: "price".to_string(),
        task_type: TaskType::Classification,
        metrics: vec![Metric::Accuracy],
        time_budget_minutes: 1,
        dataset_uris: vec!["file:///data/train".to_string()],
        produce_uris: vec!["file:///data/test".to_string()],
    };

    let first = facade.submit(&submit).await.unwrap();
    assert_eq!(first, "/results/s-1/predictions.csv");
    assert_eq!(engine.start_search_count(), 1);

    let second = facade.submit(&submit).await.unwrap();
    assert_eq!(second, first);
    // No new round trip.
    assert_eq!(engine.start_search_count(), 1);
    assert_eq!(cache.stats().hits, 1);

    // A different produce input misses the cache and dispatches again.
    let mut changed = submit.clone();
    changed.produce_uris = vec!["file:///data/holdout".to_string()];
    let _ = facade.submit(&changed).await.unwrap();
    assert_eq!(engine.start_search_count(), 2);
}
