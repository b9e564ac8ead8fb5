//! Error types for the pipeline.
//!
//! Only [`RunError::Infrastructure`] is fatal for a run. Unit failures and
//! skips are data, recorded in the shared state's result map.

use crate::models::RunId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural problems detected while building a task graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate unit id: {0}")]
    DuplicateNode(String),

    #[error("unit '{node}' requires unknown unit '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("cycle detected among units: {}", .nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    #[error("no root unit declared")]
    MissingRoot,

    #[error("more than one root unit declared: '{first}' and '{second}'")]
    MultipleRoots { first: String, second: String },

    #[error("unit '{0}' has no dependencies but is neither the root nor marked independent")]
    Orphan(String),

    #[error("unit '{node}' does not depend on root unit '{root}'")]
    Unrooted { node: String, root: String },

    #[error("weight for unit '{0}' must be greater than zero")]
    ZeroWeight(String),

    #[error("unknown unit '{0}'")]
    UnknownNode(String),
}

/// Why a unit that ran did not produce a result.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitFailure {
    /// The unit ran and reported an error.
    #[error("{message}")]
    Execution { message: String },

    /// The unit exceeded its time budget.
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The unit's task panicked.
    #[error("unit panicked: {message}")]
    Panicked { message: String },
}

impl UnitFailure {
    pub fn execution(message: impl Into<String>) -> Self {
        UnitFailure::Execution {
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, UnitFailure::Timeout { .. })
    }
}

/// Violations of the shared state's write rules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("result for unit '{0}' was already published")]
    AlreadyPublished(String),

    #[error("run is already {0} and can no longer change")]
    Terminal(crate::models::RunStatus),
}

/// Errors from a checkpoint store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run not found: {0}")]
    NotFound(RunId),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Fatal conditions that end a run as `Failed`.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("checkpoint failed: {0}")]
    Infrastructure(#[from] StoreError),

    #[error("shared state rejected an update: {0}")]
    State(#[from] StateError),

    #[error("run cancelled")]
    Cancelled,
}

/// Errors returned by the run-control surface.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("run not found: {0}")]
    NotFound(RunId),

    #[error("could not establish run: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ControllerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ControllerError::NotFound(id),
            other => ControllerError::Store(other),
        }
    }
}

/// Errors from the fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
}

/// Errors from optional remote collaborators (language model, places, search).
///
/// Units absorb these and degrade their output instead of failing.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned an unexpected response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}
