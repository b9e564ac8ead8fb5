//! The scheduler loop.
//!
//! One [`Orchestrator`] executes a [`TaskGraph`] against one run's
//! [`SharedState`] at a time:
//!
//! 1. every node whose dependencies have all settled is promoted from the
//!    ready frontier, in declaration order;
//! 2. a promoted node whose dependency failed or was skipped, or whose own
//!    `validate` rejects the state, settles as `Skipped` without running;
//! 3. every other promoted node is spawned against a view of the current
//!    state, under its timeout;
//! 4. each settlement is published, checkpointed and credited to progress
//!    as soon as it arrives, which may promote more nodes.
//!
//! When nothing is left in flight the reducer builds the action plan and the
//! run completes. Only checkpoint failures and cancellation fail a run.

use crate::analysis::reduce;
use crate::error::{RunError, UnitFailure};
use crate::graph::{GraphNode, TaskGraph};
use crate::models::{Settlement, SkipReason, Snapshot};
use crate::state::SharedState;
use crate::store::CheckpointStore;
use futures::stream::{FuturesUnordered, StreamExt};
use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Reason recorded on a run that was cancelled.
pub const CANCELLED_REASON: &str = "cancelled";

/// Tunables for [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Applied to units without their own timeout.
    pub default_unit_timeout: Duration,
    /// Truncate the action plan to this many items.
    pub max_actions: Option<usize>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            default_unit_timeout: Duration::from_secs(60),
            max_actions: None,
        }
    }
}

type Settling = Pin<Box<dyn Future<Output = (String, Settlement)> + Send>>;

/// Aborts every spawned unit task when dropped.
#[derive(Default)]
struct TaskGuard(Vec<AbortHandle>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Bookkeeping for one execution.
#[derive(Default)]
struct Progress {
    settled: HashSet<String>,
    scheduled: HashSet<String>,
}

/// Executes a task graph, checkpointing through a [`CheckpointStore`].
pub struct Orchestrator {
    graph: Arc<TaskGraph>,
    store: Arc<dyn CheckpointStore>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        graph: Arc<TaskGraph>,
        store: Arc<dyn CheckpointStore>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            graph,
            store,
            options,
        }
    }

    /// Run the graph to completion.
    ///
    /// Returns the completed state. On cancellation or a checkpoint failure
    /// the run is recorded as `Failed` (best effort) and the error returned;
    /// results settled before that point stay persisted.
    #[instrument(name = "run_execute", skip_all, fields(run_id = %state.run_id()))]
    pub async fn execute(
        &self,
        mut state: SharedState,
        cancel: CancellationToken,
    ) -> Result<SharedState, RunError> {
        info!(
            run_id = %state.run_id(),
            target_url = %state.input().target_url,
            units = self.graph.len(),
            "run_started"
        );

        match self.run(&mut state, &cancel).await {
            Ok(()) => {
                info!(
                    run_id = %state.run_id(),
                    actions = state.action_plan().map_or(0, <[_]>::len),
                    "run_completed"
                );
                Ok(state)
            }
            Err(e) => {
                self.record_failure(&mut state, &e).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        state: &mut SharedState,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        state.mark_running()?;
        self.store.set_status(&state.status_view()).await?;

        let mut progress = Progress::default();
        let mut guard = TaskGuard::default();
        let mut in_flight: FuturesUnordered<Settling> = FuturesUnordered::new();

        loop {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            self.promote_ready(state, &mut progress, &mut guard, &mut in_flight)
                .await?;
            if in_flight.is_empty() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RunError::Cancelled),
                next = in_flight.next() => next,
            };
            if let Some((unit_id, settlement)) = next {
                self.settle(state, &mut progress, &unit_id, settlement).await?;
            }
        }
        drop(guard);

        let plan = reduce(state, &self.graph, self.options.max_actions);
        self.store.append_action_plan(state.run_id(), &plan).await?;
        state.set_action_plan(plan)?;
        state.mark_completed()?;
        self.store.set_status(&state.status_view()).await?;
        Ok(())
    }

    /// Launch or skip everything on the ready frontier until it is empty.
    async fn promote_ready(
        &self,
        state: &mut SharedState,
        progress: &mut Progress,
        guard: &mut TaskGuard,
        in_flight: &mut FuturesUnordered<Settling>,
    ) -> Result<(), RunError> {
        loop {
            let ready: Vec<&GraphNode> = self
                .graph
                .ready_frontier(&progress.settled, &progress.scheduled);
            if ready.is_empty() {
                return Ok(());
            }

            for node in ready {
                progress.scheduled.insert(node.id().to_string());

                if let Some(reason) = blocked_by(node, state) {
                    self.settle(state, progress, node.id(), Settlement::skipped(reason))
                        .await?;
                    continue;
                }

                let view = state.view();
                if !node.unit().validate(&view) {
                    self.settle(
                        state,
                        progress,
                        node.id(),
                        Settlement::skipped(SkipReason::ValidationFailed),
                    )
                    .await?;
                    continue;
                }

                let limit = node.timeout().unwrap_or(self.options.default_unit_timeout);
                let unit = Arc::clone(node.unit());
                debug!(
                    run_id = %state.run_id(),
                    unit = %node.id(),
                    timeout_ms = limit.as_millis() as u64,
                    "unit_launched"
                );

                let handle = tokio::spawn(async move {
                    tokio::time::timeout(limit, async move { unit.analyze(&view).await }).await
                });
                guard.0.push(handle.abort_handle());

                let unit_id = node.id().to_string();
                in_flight.push(Box::pin(async move {
                    let settlement = match handle.await {
                        Ok(Ok(result)) => Settlement::from_result(result),
                        Ok(Err(_elapsed)) => Settlement::Err {
                            failure: UnitFailure::Timeout {
                                timeout_ms: limit.as_millis() as u64,
                            },
                        },
                        Err(join_error) => Settlement::Err {
                            failure: join_failure(join_error),
                        },
                    };
                    (unit_id, settlement)
                }));
            }
        }
    }

    /// Publish, checkpoint and credit one settlement.
    async fn settle(
        &self,
        state: &mut SharedState,
        progress: &mut Progress,
        unit_id: &str,
        settlement: Settlement,
    ) -> Result<(), RunError> {
        let settlement = if unit_id == self.graph.root_id() {
            capture_snapshot(state, settlement)?
        } else {
            settlement
        };
        log_settlement(state, unit_id, &settlement);

        self.store
            .append_result(state.run_id(), unit_id, &settlement)
            .await?;
        state.publish(unit_id, settlement)?;

        progress.settled.insert(unit_id.to_string());
        state.advance_progress(self.graph.progress_for(&progress.settled))?;
        self.store.set_status(&state.status_view()).await?;
        Ok(())
    }

    async fn record_failure(&self, state: &mut SharedState, e: &RunError) {
        let reason = match e {
            RunError::Cancelled => CANCELLED_REASON.to_string(),
            other => other.to_string(),
        };
        match e {
            RunError::Cancelled => warn!(run_id = %state.run_id(), "run_cancelled"),
            other => error!(run_id = %state.run_id(), error = %other, "run_failed"),
        }
        if let Err(state_error) = state.mark_failed(reason) {
            warn!(run_id = %state.run_id(), error = %state_error, "run_already_terminal");
            return;
        }
        if let Err(store_error) = self.store.set_status(&state.status_view()).await {
            error!(run_id = %state.run_id(), error = %store_error, "failure_not_recorded");
        }
    }
}

/// The first dependency that did not settle `Ok`, as a skip reason.
fn blocked_by(node: &GraphNode, state: &SharedState) -> Option<SkipReason> {
    node.deps().iter().find_map(|dep| match state.result(dep) {
        Some(Settlement::Err { .. }) => Some(SkipReason::UpstreamFailed { unit: dep.clone() }),
        Some(Settlement::Skipped { .. }) => Some(SkipReason::UpstreamSkipped { unit: dep.clone() }),
        _ => None,
    })
}

/// Store the root's payload as the run snapshot. A payload that is not a
/// snapshot turns the root's settlement into a failure.
fn capture_snapshot(
    state: &mut SharedState,
    settlement: Settlement,
) -> Result<Settlement, RunError> {
    let Settlement::Ok(output) = settlement else {
        return Ok(settlement);
    };
    match serde_json::from_value::<Snapshot>(output.payload.clone()) {
        Ok(snapshot) => {
            state.set_snapshot(snapshot)?;
            Ok(Settlement::Ok(output))
        }
        Err(e) => Ok(Settlement::Err {
            failure: UnitFailure::execution(format!("root payload is not a snapshot: {}", e)),
        }),
    }
}

fn join_failure(join_error: JoinError) -> UnitFailure {
    if join_error.is_panic() {
        UnitFailure::Panicked {
            message: panic_message(join_error.into_panic()),
        }
    } else {
        UnitFailure::execution("unit task was cancelled")
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn log_settlement(state: &SharedState, unit_id: &str, settlement: &Settlement) {
    match settlement {
        Settlement::Ok(output) => info!(
            run_id = %state.run_id(),
            unit = %unit_id,
            outcome = "ok",
            execution_seconds = output.metrics.execution_seconds,
            tokens_used = output.metrics.tokens_used,
            cost_usd = output.metrics.cost_usd,
            "unit_settled"
        ),
        Settlement::Err { failure } => warn!(
            run_id = %state.run_id(),
            unit = %unit_id,
            outcome = "error",
            error = %failure,
            "unit_settled"
        ),
        Settlement::Skipped { reason } => info!(
            run_id = %state.run_id(),
            unit = %unit_id,
            outcome = "skipped",
            reason = %reason,
            "unit_settled"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ActionRule;
    use crate::error::StoreError;
    use crate::models::{
        ActionItem, ActionTemplate, Priority, RunId, RunInput, RunResults, RunStatus,
        RunStatusView,
    };
    use crate::store::MemoryStore;
    use crate::units::testing::{sample_snapshot, ScriptedUnit};
    use crate::units::AnalysisUnit;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    fn page() -> Value {
        serde_json::to_value(sample_snapshot("https://bakery.example/")).unwrap()
    }

    fn emitting(
        unit: ScriptedUnit,
        title: &'static str,
        priority: Priority,
        impact: u8,
    ) -> ScriptedUnit {
        unit.with_rule(ActionRule::when(
            "always",
            |_| true,
            move |_| ActionTemplate::new("test", title, priority, impact, 2),
        ))
    }

    fn arc(unit: ScriptedUnit) -> Arc<dyn AnalysisUnit> {
        Arc::new(unit)
    }

    fn new_state() -> SharedState {
        SharedState::new(RunId::from("run"), RunInput::new("https://bakery.example/", "en-US"))
    }

    async fn run_graph(
        graph: TaskGraph,
        store: Arc<dyn CheckpointStore>,
    ) -> Result<SharedState, RunError> {
        let state = new_state();
        store.create_run(state.run_id(), state.input()).await.unwrap();
        Orchestrator::new(Arc::new(graph), store, OrchestratorOptions::default())
            .execute(state, CancellationToken::new())
            .await
    }

    fn label(state: &SharedState, id: &str) -> &'static str {
        state.result(id).map_or("missing", Settlement::label)
    }

    /// Memory store that remembers every progress value it was given.
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryStore,
        progress: Mutex<Vec<f64>>,
        fail_appends: bool,
    }

    #[async_trait]
    impl CheckpointStore for RecordingStore {
        async fn create_run(&self, run_id: &RunId, input: &RunInput) -> Result<(), StoreError> {
            self.inner.create_run(run_id, input).await
        }

        async fn append_result(
            &self,
            run_id: &RunId,
            unit_id: &str,
            settlement: &Settlement,
        ) -> Result<(), StoreError> {
            if self.fail_appends {
                return Err(StoreError::Corrupt("disk full".to_string()));
            }
            self.inner.append_result(run_id, unit_id, settlement).await
        }

        async fn set_status(&self, status: &RunStatusView) -> Result<(), StoreError> {
            self.progress.lock().unwrap().push(status.progress);
            self.inner.set_status(status).await
        }

        async fn append_action_plan(
            &self,
            run_id: &RunId,
            items: &[ActionItem],
        ) -> Result<(), StoreError> {
            self.inner.append_action_plan(run_id, items).await
        }

        async fn load_status(&self, run_id: &RunId) -> Result<RunStatusView, StoreError> {
            self.inner.load_status(run_id).await
        }

        async fn load_results(&self, run_id: &RunId) -> Result<RunResults, StoreError> {
            self.inner.load_results(run_id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_branch_skips_join() {
        let graph = TaskGraph::builder()
            .root(arc(emitting(
                ScriptedUnit::ok("fetch", page()),
                "from fetch",
                Priority::Low,
                1,
            )))
            .unit(
                arc(emitting(ScriptedUnit::ok("a", json!({})), "from a", Priority::High, 3)),
                &["fetch"],
            )
            .unit(
                arc(emitting(
                    ScriptedUnit::sleeping("b", Duration::from_secs(30), json!({})),
                    "from b",
                    Priority::Critical,
                    5,
                )),
                &["fetch"],
            )
            .unit(
                arc(emitting(ScriptedUnit::ok("c", json!({})), "from c", Priority::Critical, 5)),
                &["a", "b"],
            )
            .timeout("b", Duration::from_secs(1))
            .build()
            .unwrap();

        let state = run_graph(graph, Arc::new(MemoryStore::new())).await.unwrap();

        assert_eq!(state.status(), RunStatus::Completed);
        assert_eq!(label(&state, "fetch"), "ok");
        assert_eq!(label(&state, "a"), "ok");
        assert!(matches!(
            state.result("b"),
            Some(Settlement::Err { failure: UnitFailure::Timeout { timeout_ms: 1000 } })
        ));
        assert_eq!(
            state.result("c"),
            Some(&Settlement::skipped(SkipReason::UpstreamFailed { unit: "b".to_string() }))
        );
        let sources: Vec<&str> = state
            .action_plan()
            .unwrap()
            .iter()
            .map(|i| i.source_unit.as_str())
            .collect();
        assert_eq!(sources, vec!["a", "fetch"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_siblings_run_concurrently() {
        let graph = TaskGraph::builder()
            .root(arc(ScriptedUnit::ok("fetch", page())))
            .unit(
                arc(ScriptedUnit::sleeping("a", Duration::from_secs(10), json!({}))),
                &["fetch"],
            )
            .unit(
                arc(ScriptedUnit::sleeping("b", Duration::from_secs(10), json!({}))),
                &["fetch"],
            )
            .build()
            .unwrap();

        let started = tokio::time::Instant::now();
        let state = run_graph(graph, Arc::new(MemoryStore::new())).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(state.status(), RunStatus::Completed);
        assert_eq!(label(&state, "a"), "ok");
        assert_eq!(label(&state, "b"), "ok");
        assert!(elapsed >= Duration::from_secs(10), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(15), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_everything() {
        let graph = TaskGraph::builder()
            .root(arc(ScriptedUnit::failing("fetch", "connection refused")))
            .unit(
                arc(emitting(ScriptedUnit::ok("a", json!({})), "a", Priority::High, 3)),
                &["fetch"],
            )
            .unit(arc(ScriptedUnit::ok("b", json!({}))), &["fetch"])
            .unit(arc(ScriptedUnit::ok("c", json!({}))), &["a", "b"])
            .build()
            .unwrap();

        let state = run_graph(graph, Arc::new(MemoryStore::new())).await.unwrap();

        assert_eq!(state.status(), RunStatus::Completed);
        assert_eq!(label(&state, "fetch"), "error");
        for id in ["a", "b", "c"] {
            assert_eq!(label(&state, id), "skipped", "{}", id);
        }
        assert!(state.snapshot().is_none());
        assert_eq!(state.action_plan(), Some(&[][..]));
        assert_eq!(state.progress(), 100.0);
    }

    #[tokio::test]
    async fn test_skips_propagate_transitively() {
        let invalid = ScriptedUnit::ok("b", json!({})).invalid();
        let b_runs = invalid.runs();
        let graph = TaskGraph::builder()
            .root(arc(ScriptedUnit::ok("fetch", page())))
            .unit(arc(ScriptedUnit::failing("a", "boom")), &["fetch"])
            .unit(arc(ScriptedUnit::ok("a2", json!({}))), &["a"])
            .unit(arc(ScriptedUnit::ok("a3", json!({}))), &["a2"])
            .unit(arc(invalid), &["fetch"])
            .unit(arc(ScriptedUnit::ok("b2", json!({}))), &["b"])
            .build()
            .unwrap();

        let state = run_graph(graph, Arc::new(MemoryStore::new())).await.unwrap();

        assert_eq!(state.status(), RunStatus::Completed);
        assert_eq!(
            state.result("a2"),
            Some(&Settlement::skipped(SkipReason::UpstreamFailed { unit: "a".to_string() }))
        );
        assert_eq!(
            state.result("a3"),
            Some(&Settlement::skipped(SkipReason::UpstreamSkipped { unit: "a2".to_string() }))
        );
        assert_eq!(
            state.result("b"),
            Some(&Settlement::skipped(SkipReason::ValidationFailed))
        );
        assert_eq!(b_runs.load(Ordering::SeqCst), 0);
        assert_eq!(
            state.result("b2"),
            Some(&Settlement::skipped(SkipReason::UpstreamSkipped { unit: "b".to_string() }))
        );
    }

    #[tokio::test]
    async fn test_progress_is_monotone_and_ends_at_100() {
        let graph = TaskGraph::builder()
            .root(arc(ScriptedUnit::ok("fetch", page())))
            .unit(arc(ScriptedUnit::ok("a", json!({}))), &["fetch"])
            .unit(arc(ScriptedUnit::failing("b", "boom")), &["fetch"])
            .unit(arc(ScriptedUnit::ok("c", json!({}))), &["a", "b"])
            .weight("fetch", 3)
            .build()
            .unwrap();
        let store = Arc::new(RecordingStore::default());

        run_graph(graph, store.clone()).await.unwrap();

        let progress = store.progress.lock().unwrap().clone();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
        assert_eq!(progress.first(), Some(&0.0));
        assert_eq!(progress.last(), Some(&100.0));
        // fetch carries half of the total weight
        assert!(progress.contains(&50.0));
    }

    #[tokio::test]
    async fn test_upstream_results_are_visible() {
        let graph = TaskGraph::builder()
            .root(arc(ScriptedUnit::ok("fetch", page())))
            .unit(arc(ScriptedUnit::ok("a", json!({})).expecting(&["fetch"])), &["fetch"])
            .unit(arc(ScriptedUnit::ok("b", json!({})).expecting(&["fetch"])), &["fetch"])
            .unit(
                arc(ScriptedUnit::ok("c", json!({})).expecting(&["fetch", "a", "b"])),
                &["a", "b"],
            )
            .build()
            .unwrap();

        let state = run_graph(graph, Arc::new(MemoryStore::new())).await.unwrap();

        for id in ["fetch", "a", "b", "c"] {
            assert_eq!(label(&state, id), "ok", "{}", id);
        }
        assert_eq!(state.snapshot().unwrap().headings_at(1).len(), 1);
        assert_eq!(state.settled_units().first().map(String::as_str), Some("fetch"));
        assert_eq!(state.settled_units().last().map(String::as_str), Some("c"));
    }

    #[tokio::test]
    async fn test_panicking_unit_settles_as_error() {
        let graph = TaskGraph::builder()
            .root(arc(ScriptedUnit::ok("fetch", page())))
            .unit(arc(ScriptedUnit::panicking("a")), &["fetch"])
            .unit(arc(ScriptedUnit::ok("b", json!({}))), &["fetch"])
            .build()
            .unwrap();

        let state = run_graph(graph, Arc::new(MemoryStore::new())).await.unwrap();

        assert_eq!(state.status(), RunStatus::Completed);
        match state.result("a") {
            Some(Settlement::Err { failure: UnitFailure::Panicked { message } }) => {
                assert!(message.contains("scripted panic in a"))
            }
            other => panic!("unexpected settlement: {:?}", other),
        }
        assert_eq!(label(&state, "b"), "ok");
    }

    #[tokio::test]
    async fn test_root_payload_must_be_a_snapshot() {
        let graph = TaskGraph::builder()
            .root(arc(ScriptedUnit::ok("fetch", json!({"not": "a page"}))))
            .unit(arc(ScriptedUnit::ok("a", json!({}))), &["fetch"])
            .build()
            .unwrap();

        let state = run_graph(graph, Arc::new(MemoryStore::new())).await.unwrap();

        assert_eq!(label(&state, "fetch"), "error");
        assert_eq!(label(&state, "a"), "skipped");
        assert!(state.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_ranked_plan_end_to_end() {
        let graph = TaskGraph::builder()
            .root(arc(ScriptedUnit::ok("fetch", page())))
            .unit(
                arc(emitting(ScriptedUnit::ok("a", json!({})), "high/3", Priority::High, 3)),
                &["fetch"],
            )
            .unit(
                arc(emitting(
                    ScriptedUnit::ok("b", json!({})),
                    "critical/2",
                    Priority::Critical,
                    2,
                )),
                &["fetch"],
            )
            .build()
            .unwrap();
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryStore::new());

        let state = run_graph(graph, Arc::clone(&store)).await.unwrap();

        let titles: Vec<&str> = state
            .action_plan()
            .unwrap()
            .iter()
            .map(|i| i.title.as_str())
            .collect();
        assert_eq!(titles, vec!["critical/2", "high/3"]);
        let persisted = store.load_results(state.run_id()).await.unwrap();
        assert_eq!(persisted.action_plan.as_deref(), state.action_plan());
        assert_eq!(persisted.units.len(), 3);
        assert_eq!(persisted.status.status, RunStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_keeps_settled_results() {
        let graph = TaskGraph::builder()
            .root(arc(ScriptedUnit::ok("fetch", page())))
            .unit(
                arc(ScriptedUnit::sleeping("slow", Duration::from_secs(50), json!({}))),
                &["fetch"],
            )
            .build()
            .unwrap();
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryStore::new());
        let state = new_state();
        let run_id = state.run_id().clone();
        store.create_run(&run_id, state.input()).await.unwrap();

        let orchestrator = Orchestrator::new(
            Arc::new(graph),
            Arc::clone(&store),
            OrchestratorOptions::default(),
        );
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let running = tokio::spawn(async move { orchestrator.execute(state, token).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let outcome = running.await.unwrap();

        assert!(matches!(outcome, Err(RunError::Cancelled)));
        let results = store.load_results(&run_id).await.unwrap();
        assert_eq!(results.status.status, RunStatus::Failed);
        assert_eq!(results.status.error.as_deref(), Some(CANCELLED_REASON));
        assert_eq!(results.status.settled_units, vec!["fetch"]);
        assert!(results.action_plan.is_none());
    }

    #[tokio::test]
    async fn test_checkpoint_failure_fails_run() {
        let graph = TaskGraph::builder()
            .root(arc(ScriptedUnit::ok("fetch", page())))
            .build()
            .unwrap();
        let store = Arc::new(RecordingStore {
            fail_appends: true,
            ..Default::default()
        });

        let outcome = run_graph(graph, store.clone()).await;

        assert!(matches!(outcome, Err(RunError::Infrastructure(_))));
        let status = store.load_status(&RunId::from("run")).await.unwrap();
        assert_eq!(status.status, RunStatus::Failed);
        assert!(status.error.unwrap().contains("disk full"));
    }
}
