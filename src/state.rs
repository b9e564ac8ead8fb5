//! Per-run shared state.
//!
//! A [`SharedState`] is owned by exactly one run and written only by the
//! orchestrator. Units never see it directly: each launch receives a
//! [`StateView`], a read-only copy of the state at launch time.

use crate::error::StateError;
use crate::models::{
    ActionItem, RunId, RunInput, RunStatus, RunStatusView, Settlement, Snapshot,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Mutable record of one run.
#[derive(Debug, Clone)]
pub struct SharedState {
    run_id: RunId,
    input: Arc<RunInput>,
    snapshot: Option<Arc<Snapshot>>,
    results: HashMap<String, Arc<Settlement>>,
    /// Unit ids in the order their results were published.
    settled: Vec<String>,
    status: RunStatus,
    progress: f64,
    run_error: Option<String>,
    action_plan: Option<Vec<ActionItem>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl SharedState {
    /// Create a pending state for a new run.
    pub fn new(run_id: RunId, input: RunInput) -> Self {
        Self {
            run_id,
            input: Arc::new(input),
            snapshot: None,
            results: HashMap::new(),
            settled: Vec::new(),
            status: RunStatus::Pending,
            progress: 0.0,
            run_error: None,
            action_plan: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn input(&self) -> &RunInput {
        &self.input
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_deref()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn action_plan(&self) -> Option<&[ActionItem]> {
        self.action_plan.as_deref()
    }

    /// Settlement published by a unit, if any.
    pub fn result(&self, unit_id: &str) -> Option<&Settlement> {
        self.results.get(unit_id).map(|s| s.as_ref())
    }

    /// Unit ids in publication order.
    pub fn settled_units(&self) -> &[String] {
        &self.settled
    }

    fn ensure_open(&self) -> Result<(), StateError> {
        if self.status.is_terminal() {
            return Err(StateError::Terminal(self.status));
        }
        Ok(())
    }

    /// Transition `Pending -> Running`. Calling it on a running state is a no-op.
    pub fn mark_running(&mut self) -> Result<(), StateError> {
        self.ensure_open()?;
        if self.status == RunStatus::Pending {
            self.status = RunStatus::Running;
            self.started_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Publish a unit's settlement. Each unit id can be written once.
    pub fn publish(&mut self, unit_id: &str, settlement: Settlement) -> Result<(), StateError> {
        self.ensure_open()?;
        if self.results.contains_key(unit_id) {
            return Err(StateError::AlreadyPublished(unit_id.to_string()));
        }
        self.results
            .insert(unit_id.to_string(), Arc::new(settlement));
        self.settled.push(unit_id.to_string());
        Ok(())
    }

    /// Record the snapshot produced by the fetch stage. Write-once.
    pub fn set_snapshot(&mut self, snapshot: Snapshot) -> Result<(), StateError> {
        self.ensure_open()?;
        if self.snapshot.is_some() {
            return Err(StateError::AlreadyPublished("snapshot".to_string()));
        }
        self.snapshot = Some(Arc::new(snapshot));
        Ok(())
    }

    /// Move progress forward. Values below the current progress are ignored.
    pub fn advance_progress(&mut self, progress: f64) -> Result<(), StateError> {
        self.ensure_open()?;
        let clamped = progress.clamp(0.0, 100.0);
        if clamped > self.progress {
            self.progress = clamped;
        }
        Ok(())
    }

    pub fn set_action_plan(&mut self, items: Vec<ActionItem>) -> Result<(), StateError> {
        self.ensure_open()?;
        self.action_plan = Some(items);
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<(), StateError> {
        self.ensure_open()?;
        self.status = RunStatus::Completed;
        self.progress = 100.0;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Transition to `Failed`. Already-published results are kept.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), StateError> {
        self.ensure_open()?;
        self.status = RunStatus::Failed;
        self.run_error = Some(error.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Read-only copy handed to a unit at launch.
    pub fn view(&self) -> StateView {
        StateView {
            input: Arc::clone(&self.input),
            snapshot: self.snapshot.clone(),
            results: self.results.clone(),
        }
    }

    pub fn status_view(&self) -> RunStatusView {
        RunStatusView {
            run_id: self.run_id.clone(),
            status: self.status,
            progress: self.progress,
            settled_units: self.settled.clone(),
            error: self.run_error.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// What a unit can see while it runs.
#[derive(Debug, Clone)]
pub struct StateView {
    input: Arc<RunInput>,
    snapshot: Option<Arc<Snapshot>>,
    results: HashMap<String, Arc<Settlement>>,
}

impl StateView {
    pub fn input(&self) -> &RunInput {
        &self.input
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_deref()
    }

    pub fn result(&self, unit_id: &str) -> Option<&Settlement> {
        self.results.get(unit_id).map(|s| s.as_ref())
    }

    /// Payload of an upstream unit that settled `Ok`.
    pub fn payload(&self, unit_id: &str) -> Option<&Value> {
        self.result(unit_id).and_then(Settlement::payload)
    }
}

#[cfg(test)]
impl StateView {
    pub fn for_input(input: RunInput) -> Self {
        Self {
            input: Arc::new(input),
            snapshot: None,
            results: HashMap::new(),
        }
    }

    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = Some(Arc::new(snapshot));
        self
    }

    pub fn with_result(mut self, unit_id: &str, settlement: Settlement) -> Self {
        self.results
            .insert(unit_id.to_string(), Arc::new(settlement));
        self
    }
}
