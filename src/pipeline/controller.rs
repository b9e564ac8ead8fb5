//! Run-control façade: start runs in the background, poll them, cancel them.

use crate::error::ControllerError;
use crate::models::{RunId, RunInput, RunResults, RunStatusView};
use crate::pipeline::Orchestrator;
use crate::state::SharedState;
use crate::store::CheckpointStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Handle on a run started by this controller.
struct RunHandle {
    cancel: CancellationToken,
    /// Fired once the run task has finished.
    done: CancellationToken,
}

/// Starts runs and answers status queries from the checkpoint store.
pub struct RunController {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn CheckpointStore>,
    /// Runs still executing; entries are removed when the run task ends.
    runs: Arc<RwLock<HashMap<RunId, RunHandle>>>,
}

impl RunController {
    pub fn new(orchestrator: Arc<Orchestrator>, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            orchestrator,
            store,
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a run and execute it in the background.
    ///
    /// Returns as soon as the run is persisted as `Pending`.
    pub async fn start(&self, input: RunInput) -> Result<RunId, ControllerError> {
        let run_id = RunId::generate();
        self.store
            .create_run(&run_id, &input)
            .await
            .map_err(ControllerError::Store)?;

        let state = SharedState::new(run_id.clone(), input);
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();

        // insert before spawning so an immediate cancel finds the handle
        self.runs.write().await.insert(
            run_id.clone(),
            RunHandle {
                cancel: cancel.clone(),
                done: done.clone(),
            },
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        let runs = Arc::clone(&self.runs);
        let task_run_id = run_id.clone();
        tokio::spawn(async move {
            // fires on return and on panic
            let _finished = done.drop_guard();
            match orchestrator.execute(state, cancel).await {
                Ok(_) => debug!(run_id = %task_run_id, "run_task_finished"),
                Err(e) => debug!(run_id = %task_run_id, error = %e, "run_task_failed"),
            }
            runs.write().await.remove(&task_run_id);
        });

        info!(run_id = %run_id, "run_accepted");
        Ok(run_id)
    }

    pub async fn status(&self, run_id: &RunId) -> Result<RunStatusView, ControllerError> {
        Ok(self.store.load_status(run_id).await?)
    }

    pub async fn results(&self, run_id: &RunId) -> Result<RunResults, ControllerError> {
        Ok(self.store.load_results(run_id).await?)
    }

    /// Request cancellation. Cancelling a finished run is a no-op.
    pub async fn cancel(&self, run_id: &RunId) -> Result<(), ControllerError> {
        if let Some(handle) = self.runs.read().await.get(run_id) {
            debug!(run_id = %run_id, "cancel_requested");
            handle.cancel.cancel();
            return Ok(());
        }
        self.store.load_status(run_id).await?;
        Ok(())
    }

    /// Wait until the run reaches a terminal status and return it.
    pub async fn wait(&self, run_id: &RunId) -> Result<RunStatusView, ControllerError> {
        let done = self
            .runs
            .read()
            .await
            .get(run_id)
            .map(|handle| handle.done.clone());
        if let Some(done) = done {
            done.cancelled().await;
        }
        self.status(run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskGraph;
    use crate::models::RunStatus;
    use crate::pipeline::OrchestratorOptions;
    use crate::store::MemoryStore;
    use crate::units::testing::{sample_snapshot, ScriptedUnit};
    use serde_json::json;
    use std::time::Duration;

    fn controller(slow: Duration) -> RunController {
        let page = serde_json::to_value(sample_snapshot("https://bakery.example/")).unwrap();
        let graph = TaskGraph::builder()
            .root(Arc::new(ScriptedUnit::ok("fetch", page)))
            .unit(
                Arc::new(ScriptedUnit::sleeping("slow", slow, json!({"done": true}))),
                &["fetch"],
            )
            .build()
            .unwrap();
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(
            Arc::new(graph),
            Arc::clone(&store),
            OrchestratorOptions::default(),
        );
        RunController::new(Arc::new(orchestrator), store)
    }

    fn input() -> RunInput {
        RunInput::new("https://bakery.example/", "en-US")
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_wait() {
        let controller = controller(Duration::from_secs(5));
        let run_id = controller.start(input()).await.unwrap();

        let status = controller.wait(&run_id).await.unwrap();
        assert_eq!(status.status, RunStatus::Completed);
        assert_eq!(status.progress, 100.0);

        let results = controller.results(&run_id).await.unwrap();
        assert_eq!(results.units.len(), 2);
        assert_eq!(results.action_plan, Some(vec![]));
    }

    #[tokio::test]
    async fn test_unknown_run_is_not_found() {
        let controller = controller(Duration::ZERO);
        let missing = RunId::from("nope");
        assert!(matches!(
            controller.status(&missing).await,
            Err(ControllerError::NotFound(_))
        ));
        assert!(matches!(
            controller.results(&missing).await,
            Err(ControllerError::NotFound(_))
        ));
        assert!(matches!(
            controller.cancel(&missing).await,
            Err(ControllerError::NotFound(_))
        ));
        assert!(matches!(
            controller.wait(&missing).await,
            Err(ControllerError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_running_run() {
        let controller = controller(Duration::from_secs(40));
        let run_id = controller.start(input()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            controller.status(&run_id).await.unwrap().status,
            RunStatus::Running
        );
        controller.cancel(&run_id).await.unwrap();

        let status = controller.wait(&run_id).await.unwrap();
        assert_eq!(status.status, RunStatus::Failed);
        assert_eq!(status.error.as_deref(), Some("cancelled"));
        assert_eq!(status.settled_units, vec!["fetch"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_runs_release_handles() {
        let controller = controller(Duration::from_secs(2));
        let mut run_ids = Vec::new();
        for _ in 0..20 {
            run_ids.push(controller.start(input()).await.unwrap());
        }
        assert_eq!(controller.runs.read().await.len(), 20);

        for run_id in &run_ids {
            let status = controller.wait(run_id).await.unwrap();
            assert_eq!(status.status, RunStatus::Completed);
        }
        assert!(controller.runs.read().await.is_empty());

        // finished runs are still answered from the store
        assert_eq!(
            controller.wait(&run_ids[0]).await.unwrap().status,
            RunStatus::Completed
        );
        controller.cancel(&run_ids[0]).await.unwrap();
    }

    #[tokio::test]
    async fn test_runs_are_independent() {
        let controller = controller(Duration::ZERO);
        let first = controller.start(input()).await.unwrap();
        let second = controller.start(input()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(controller.wait(&first).await.unwrap().status, RunStatus::Completed);
        assert_eq!(controller.wait(&second).await.unwrap().status, RunStatus::Completed);
    }
}
