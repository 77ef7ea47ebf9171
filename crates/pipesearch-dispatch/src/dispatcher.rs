//! The per-request dispatch state machine.
//!
//! One [`SolutionDispatcher`] drives any number of concurrent searches.
//! Per search: submit, stream discovered candidates, fan one concurrent
//! lifecycle out per candidate (score → fit → produce with persisted
//! milestones), rejoin them all, end the search with the engine, and
//! deliver exactly one terminal status to the caller.
//!
//! # Lifecycle
//!
//! ```text
//! REQUEST_PENDING ─→ REQUEST_RUNNING ─→ REQUEST_COMPLETED | REQUEST_ERRORED
//!                        │
//!                        ├─ candidate s-1: PENDING → FITTING → SCORING → PRODUCING → COMPLETED|ERRORED
//!                        ├─ candidate s-2: ...
//!                        └─ (all candidates joined before the request terminal)
//! ```
//!
//! Candidate failures never abort siblings or the request; request-level
//! errors are reserved for search-phase failures (start/stream).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pipesearch_client::messages::{FitRequest, ProduceRequest, ScoreRequest, SearchId};
use pipesearch_client::{CancelToken, ClientError, SearchClient};
use pipesearch_core::traits::SolutionStore;
use pipesearch_core::types::{RequestState, SearchRequest, SolutionState, StatusEvent};

use crate::cache::{normalize_uri, result_id};
use crate::error::{DispatchError, DispatchResult};
use crate::status::{StatusBus, StatusSubscription};

/// Output key produced pipelines expose by default.
pub const DEFAULT_EXPOSED_OUTPUT: &str = "outputs.0";

/// Partitioned dataset URIs a search runs against.
///
/// Produced by the splitter: candidates are scored and produce
/// predictions against the test partition and are fitted on the train
/// partition.
#[derive(Debug, Clone)]
pub struct SearchInputs {
    pub train_uri: String,
    pub test_uri: String,
    /// Output keys requested from every produce call. The explainability
    /// augmentor appends its keys here.
    pub exposed_outputs: Vec<String>,
}

impl SearchInputs {
    pub fn new(train_uri: impl Into<String>, test_uri: impl Into<String>) -> Self {
        Self {
            train_uri: train_uri.into(),
            test_uri: test_uri.into(),
            exposed_outputs: vec![DEFAULT_EXPOSED_OUTPUT.to_string()],
        }
    }

    pub fn with_exposed_outputs(mut self, exposed_outputs: Vec<String>) -> Self {
        self.exposed_outputs = exposed_outputs;
        self
    }
}

/// Everything one in-flight search shares across its candidate tasks.
struct RequestCtx {
    client: Arc<SearchClient>,
    store: Arc<dyn SolutionStore>,
    bus: Arc<StatusBus>,
    request: SearchRequest,
    inputs: SearchInputs,
    request_id: Uuid,
    search_id: SearchId,
    cancel: CancelToken,
    /// Candidates currently between discovery and terminal status.
    outstanding: AtomicUsize,
}

/// Handle returned by [`SolutionDispatcher::dispatch`].
///
/// Carries the status-subscription capability and the completion channel
/// for the terminal result. Dropping the handle does not cancel the
/// search; use [`SolutionDispatcher::stop`] for that.
#[derive(Debug)]
pub struct RequestHandle {
    request_id: Uuid,
    search_id: SearchId,
    bus: Arc<StatusBus>,
    done: oneshot::Receiver<DispatchResult<()>>,
}

impl RequestHandle {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn search_id(&self) -> &str {
        &self.search_id
    }

    /// Attach a status listener. Late attachment replays everything
    /// already published for this request.
    pub fn subscribe(&self) -> StatusSubscription {
        self.bus.subscribe()
    }

    /// Block until the dispatcher signals final completion or error.
    ///
    /// The terminal status has already been broadcast to listeners by
    /// the time this resolves.
    pub async fn wait(self) -> DispatchResult<()> {
        self.done.await.unwrap_or_else(|_| {
            Err(DispatchError::Internal(
                "dispatcher exited without reporting a terminal status".to_string(),
            ))
        })
    }
}

/// Dispatches solution searches and tracks their cancellation tokens.
pub struct SolutionDispatcher {
    client: Arc<SearchClient>,
    store: Arc<dyn SolutionStore>,
    /// search id -> cancellation token for its in-flight round trips.
    cancels: Arc<DashMap<SearchId, CancelToken>>,
}

impl SolutionDispatcher {
    pub fn new(client: Arc<SearchClient>, store: Arc<dyn SolutionStore>) -> Self {
        Self {
            client,
            store,
            cancels: Arc::new(DashMap::new()),
        }
    }

    /// Submit a search and start orchestrating it.
    ///
    /// Returns once the engine has accepted the search and the request
    /// is RUNNING; candidate discovery and the per-candidate lifecycles
    /// continue in the background until the handle's terminal result.
    ///
    /// Start failures abort the whole request and are returned here;
    /// later failures are delivered through [`RequestHandle::wait`].
    pub async fn dispatch(
        &self,
        request: SearchRequest,
        inputs: SearchInputs,
    ) -> DispatchResult<RequestHandle> {
        let request_id = Uuid::new_v4();
        let bus = Arc::new(StatusBus::new(request_id));
        bus.register_channel(None);

        self.store
            .persist_request(
                request_id,
                &request.dataset_id,
                &RequestState::Pending.to_string(),
                Utc::now(),
            )
            .await?;
        bus.publish(StatusEvent::request(request_id, RequestState::Pending));

        let cancel = CancelToken::new();
        let search_id = match self.client.start_search(&request, &cancel).await {
            Ok(id) => id,
            Err(e) => {
                self.fail_request(&bus, request_id, &request.dataset_id, &e.to_string())
                    .await;
                return Err(e.into());
            }
        };
        self.cancels.insert(search_id.clone(), cancel.clone());
        info!(%request_id, %search_id, "search dispatched");

        let ctx = Arc::new(RequestCtx {
            client: self.client.clone(),
            store: self.store.clone(),
            bus: bus.clone(),
            request,
            inputs,
            request_id,
            search_id: search_id.clone(),
            cancel,
            outstanding: AtomicUsize::new(0),
        });

        // Persist first, broadcast second; the store's read-after-write
        // contract lets listeners query on receipt.
        if let Err(e) = Self::update_request(&ctx, RequestState::Running).await {
            self.cancels.remove(&search_id);
            self.fail_request(&bus, request_id, &ctx.request.dataset_id, &e.to_string())
                .await;
            return Err(e);
        }

        let (done_tx, done_rx) = oneshot::channel();
        let cancels = self.cancels.clone();
        let task_ctx = ctx.clone();
        tokio::spawn(async move {
            let outcome = Self::run_search(task_ctx.clone()).await;
            cancels.remove(&task_ctx.search_id);
            Self::finish_request(&task_ctx, outcome, done_tx).await;
        });

        Ok(RequestHandle {
            request_id,
            search_id,
            bus,
            done: done_rx,
        })
    }

    /// Stop a running search.
    ///
    /// Cancels the search's token first, aborting any in-flight
    /// fit/score/produce round trips; the protocol's own stop-search
    /// call only halts candidate discovery. Other concurrent searches
    /// are unaffected. Idempotent.
    pub async fn stop(&self, search_id: &str) -> DispatchResult<()> {
        if let Some(token) = self.cancels.get(search_id) {
            token.cancel();
        }
        self.client.stop_search(search_id, &CancelToken::new()).await?;
        info!(%search_id, "search stopped");
        Ok(())
    }

    /// Drive the stream of discovered candidates to exhaustion.
    async fn run_search(ctx: Arc<RequestCtx>) -> DispatchResult<()> {
        let handler_ctx = ctx.clone();
        let stream_outcome = ctx
            .client
            .stream_search_results(&ctx.search_id, &ctx.cancel, move |frame| {
                let ctx = handler_ctx.clone();
                async move { Self::run_candidate(ctx, frame.solution_id).await }
            })
            .await;

        // stream_search_results joins every spawned candidate handler
        // before returning: this is the completion barrier, so every
        // candidate has reached a terminal status here.
        debug_assert_eq!(ctx.outstanding.load(Ordering::SeqCst), 0);

        // The search is formally ended with the engine before the
        // overall terminal status is delivered, stream failure or not.
        let end_outcome = ctx.client.end_search(&ctx.search_id).await;

        let spawned = stream_outcome?;
        end_outcome?;
        info!(
            request_id = %ctx.request_id,
            candidates = spawned,
            "all candidates terminal, search ended"
        );
        Ok(())
    }

    /// One candidate's full lifecycle. Never fails: errors become the
    /// candidate's terminal ERRORED status, and the fan-out counter is
    /// decremented on every path.
    async fn run_candidate(ctx: Arc<RequestCtx>, solution_id: String) {
        ctx.bus.register_channel(Some(&solution_id));
        let in_flight = ctx.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(%solution_id, in_flight, "candidate discovered");

        if let Err(e) = Self::candidate_sequence(&ctx, &solution_id).await {
            let message = e.to_string();
            warn!(%solution_id, error = %message, "candidate errored");
            if let Err(pe) = ctx
                .store
                .persist_solution(
                    ctx.request_id,
                    &solution_id,
                    &SolutionState::Errored.to_string(),
                    Some(&message),
                    Utc::now(),
                )
                .await
            {
                error!(%solution_id, error = %pe, "failed to persist errored solution status");
            }
            ctx.bus.publish(
                StatusEvent::solution(ctx.request_id, &solution_id, SolutionState::Errored)
                    .with_error(message),
            );
        }

        ctx.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    /// Score, fit, and produce one candidate, persisting every milestone.
    async fn candidate_sequence(ctx: &RequestCtx, solution_id: &str) -> DispatchResult<()> {
        Self::update_solution(ctx, solution_id, SolutionState::Pending).await?;

        // The engine fits the candidate internally before it can score
        // it, so the fitting milestone opens the sequence even though
        // the explicit fit round trip follows the score below.
        Self::update_solution(ctx, solution_id, SolutionState::Fitting).await?;
        let metrics: Vec<String> = ctx
            .request
            .metrics
            .iter()
            .map(|m| m.key().to_string())
            .collect();
        let score_frames = ctx
            .client
            .score_solution(
                &ScoreRequest {
                    solution_id: solution_id.to_string(),
                    dataset_uri: ctx.inputs.test_uri.clone(),
                    metrics,
                },
                &ctx.cancel,
            )
            .await?;

        Self::update_solution(ctx, solution_id, SolutionState::Scoring).await?;
        for frame in score_frames.iter().filter(|f| f.progress.is_completed()) {
            for score in &frame.scores {
                ctx.store
                    .persist_solution_score(solution_id, &score.metric, score.value)
                    .await?;
            }
        }

        let fit_frames = ctx
            .client
            .fit_solution(
                &FitRequest {
                    solution_id: solution_id.to_string(),
                    dataset_uri: ctx.inputs.train_uri.clone(),
                },
                &ctx.cancel,
            )
            .await?;
        let fitted_solution_id = fit_frames
            .iter()
            .rev()
            .find(|f| f.progress.is_completed())
            .map(|f| f.fitted_solution_id.clone())
            .ok_or_else(|| {
                DispatchError::Client(ClientError::Protocol(
                    "fit stream ended without a completed frame".to_string(),
                ))
            })?;

        Self::update_solution(ctx, solution_id, SolutionState::Producing).await?;
        let (produce_request_id, produce_frames) = ctx
            .client
            .produce_solution(
                &ProduceRequest {
                    fitted_solution_id: fitted_solution_id.clone(),
                    dataset_uri: ctx.inputs.test_uri.clone(),
                    exposed_outputs: ctx.inputs.exposed_outputs.clone(),
                },
                &ctx.cancel,
            )
            .await?;

        let output_key = ctx
            .inputs
            .exposed_outputs
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_EXPOSED_OUTPUT.to_string());
        let raw_uri = produce_frames
            .iter()
            .rev()
            .find(|f| f.progress.is_completed())
            .and_then(|f| f.exposed_outputs.get(&output_key).cloned())
            .ok_or_else(|| {
                DispatchError::Client(ClientError::Protocol(format!(
                    "produce request {} exposed no '{}' output",
                    produce_request_id, output_key
                )))
            })?;

        // The result id is a hash of the normalized path, not of the
        // file's contents.
        let result_uri = normalize_uri(&raw_uri);
        let rid = result_id(&raw_uri);
        ctx.store
            .persist_solution_result(
                solution_id,
                &fitted_solution_id,
                &rid,
                &result_uri,
                &SolutionState::Completed.to_string(),
                Utc::now(),
            )
            .await?;
        ctx.store.persist_result(&rid, &result_uri, Utc::now()).await?;

        ctx.store
            .persist_solution(
                ctx.request_id,
                solution_id,
                &SolutionState::Completed.to_string(),
                None,
                Utc::now(),
            )
            .await?;
        ctx.bus.publish(
            StatusEvent::solution(ctx.request_id, solution_id, SolutionState::Completed)
                .with_result(rid, result_uri),
        );
        Ok(())
    }

    /// Persist and broadcast a non-terminal solution milestone.
    async fn update_solution(
        ctx: &RequestCtx,
        solution_id: &str,
        state: SolutionState,
    ) -> DispatchResult<()> {
        ctx.store
            .persist_solution(
                ctx.request_id,
                solution_id,
                &state.to_string(),
                None,
                Utc::now(),
            )
            .await?;
        ctx.bus
            .publish(StatusEvent::solution(ctx.request_id, solution_id, state));
        Ok(())
    }

    /// Persist and broadcast a non-terminal request transition.
    async fn update_request(ctx: &RequestCtx, state: RequestState) -> DispatchResult<()> {
        ctx.store
            .persist_request(
                ctx.request_id,
                &ctx.request.dataset_id,
                &state.to_string(),
                Utc::now(),
            )
            .await?;
        ctx.bus.publish(StatusEvent::request(ctx.request_id, state));
        Ok(())
    }

    /// Deliver the request's terminal status: persist it, broadcast it
    /// (always, even if persistence fails, so listeners are never left
    /// waiting), then resolve the caller's completion channel.
    async fn finish_request(
        ctx: &RequestCtx,
        mut outcome: DispatchResult<()>,
        done_tx: oneshot::Sender<DispatchResult<()>>,
    ) {
        if outcome.is_ok() {
            if let Err(e) = ctx
                .store
                .persist_request(
                    ctx.request_id,
                    &ctx.request.dataset_id,
                    &RequestState::Completed.to_string(),
                    Utc::now(),
                )
                .await
            {
                outcome = Err(e.into());
            }
        }

        match &outcome {
            Ok(()) => {
                ctx.bus
                    .publish(StatusEvent::request(ctx.request_id, RequestState::Completed));
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(pe) = ctx
                    .store
                    .persist_request(
                        ctx.request_id,
                        &ctx.request.dataset_id,
                        &RequestState::Errored.to_string(),
                        Utc::now(),
                    )
                    .await
                {
                    error!(request_id = %ctx.request_id, error = %pe, "failed to persist errored request status");
                }
                ctx.bus.publish(
                    StatusEvent::request(ctx.request_id, RequestState::Errored)
                        .with_error(message),
                );
            }
        }

        let _ = done_tx.send(outcome);
    }

    /// Best-effort terminal error for a request that failed before its
    /// background task existed.
    async fn fail_request(&self, bus: &StatusBus, request_id: Uuid, dataset_id: &str, message: &str) {
        if let Err(e) = self
            .store
            .persist_request(
                request_id,
                dataset_id,
                &RequestState::Errored.to_string(),
                Utc::now(),
            )
            .await
        {
            error!(%request_id, error = %e, "failed to persist errored request status");
        }
        bus.publish(StatusEvent::request(request_id, RequestState::Errored).with_error(message));
    }
}
