use super::CheckpointStore;
use crate::error::StoreError;
use crate::models::{
    ActionItem, RunId, RunInput, RunResults, RunStatus, RunStatusView, Settlement, UnitRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct RunRecord {
    input: RunInput,
    status: RunStatusView,
    units: Vec<UnitRecord>,
    action_plan: Option<Vec<ActionItem>>,
}

impl RunRecord {
    fn status_view(&self) -> RunStatusView {
        RunStatusView {
            settled_units: self.units.iter().map(|u| u.unit_id.clone()).collect(),
            ..self.status.clone()
        }
    }
}

/// Process-local store; runs are lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    runs: RwLock<HashMap<RunId, RunRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn create_run(&self, run_id: &RunId, input: &RunInput) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        runs.entry(run_id.clone()).or_insert_with(|| RunRecord {
            input: input.clone(),
            status: RunStatusView {
                run_id: run_id.clone(),
                status: RunStatus::Pending,
                progress: 0.0,
                settled_units: Vec::new(),
                error: None,
                started_at: None,
                finished_at: None,
            },
            units: Vec::new(),
            action_plan: None,
        });
        Ok(())
    }

    async fn append_result(
        &self,
        run_id: &RunId,
        unit_id: &str,
        settlement: &Settlement,
    ) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::NotFound(run_id.clone()))?;
        if !run.units.iter().any(|u| u.unit_id == unit_id) {
            run.units.push(UnitRecord {
                unit_id: unit_id.to_string(),
                settlement: settlement.clone(),
                recorded_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn set_status(&self, status: &RunStatusView) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&status.run_id)
            .ok_or_else(|| StoreError::NotFound(status.run_id.clone()))?;
        run.status = status.clone();
        Ok(())
    }

    async fn append_action_plan(
        &self,
        run_id: &RunId,
        items: &[ActionItem],
    ) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::NotFound(run_id.clone()))?;
        run.action_plan = Some(items.to_vec());
        Ok(())
    }

    async fn load_status(&self, run_id: &RunId) -> Result<RunStatusView, StoreError> {
        let runs = self.runs.read().await;
        runs.get(run_id)
            .map(RunRecord::status_view)
            .ok_or_else(|| StoreError::NotFound(run_id.clone()))
    }

    async fn load_results(&self, run_id: &RunId) -> Result<RunResults, StoreError> {
        let runs = self.runs.read().await;
        let run = runs
            .get(run_id)
            .ok_or_else(|| StoreError::NotFound(run_id.clone()))?;
        Ok(RunResults {
            input: run.input.clone(),
            status: run.status_view(),
            units: run.units.clone(),
            action_plan: run.action_plan.clone(),
        })
    }
}
