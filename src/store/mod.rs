//! Checkpoint persistence for runs.
//!
//! The orchestrator appends every unit settlement as it happens, so a
//! crashed or cancelled run still exposes what it had finished. All writes
//! are idempotent per `(run_id, unit_id)`: replaying a result keeps the
//! first recorded settlement.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::models::{ActionItem, RunId, RunInput, RunResults, RunStatusView, Settlement};
use async_trait::async_trait;

/// Storage used by the orchestrator and the run controller.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Register a new run as `Pending`. Registering an existing id is a no-op.
    async fn create_run(&self, run_id: &RunId, input: &RunInput) -> Result<(), StoreError>;

    /// Record one unit's settlement; a second write for the same unit is ignored.
    async fn append_result(
        &self,
        run_id: &RunId,
        unit_id: &str,
        settlement: &Settlement,
    ) -> Result<(), StoreError>;

    /// Overwrite status, progress, error and timestamps of a run.
    async fn set_status(&self, status: &RunStatusView) -> Result<(), StoreError>;

    /// Store the final action plan, replacing any earlier one.
    async fn append_action_plan(&self, run_id: &RunId, items: &[ActionItem])
        -> Result<(), StoreError>;

    /// Current status; `settled_units` lists recorded units in write order.
    async fn load_status(&self, run_id: &RunId) -> Result<RunStatusView, StoreError>;

    async fn load_results(&self, run_id: &RunId) -> Result<RunResults, StoreError>;
}
