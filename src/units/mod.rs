//! Analysis units.
//!
//! Every stage of the pipeline implements [`AnalysisUnit`]. The orchestrator
//! only knows this contract: it calls `validate` before launching a unit,
//! runs `analyze` on a snapshot of the shared state, and hands the unit's
//! [`ActionRule`]s to the reducer once the run has settled.

pub mod content;
pub mod entities;
pub mod fetch;
pub mod keywords;
pub mod serp;
pub mod technical;

#[cfg(test)]
pub mod testing;

use crate::analysis::ActionRule;
use crate::models::{UnitMetrics, UnitOutput, UnitResult};
use crate::services::{
    CompletionOptions, Fetcher, InferenceClient, PlacesClient, SearchClient, SnapshotCache,
};
use crate::state::StateView;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

pub use content::ContentUnit;
pub use entities::EntityUnit;
pub use fetch::FetchUnit;
pub use keywords::KeywordUnit;
pub use serp::SerpUnit;
pub use technical::TechnicalUnit;

/// Contract implemented by every analysis stage.
#[async_trait]
pub trait AnalysisUnit: Send + Sync {
    /// Stable identifier; also the key of the unit's result.
    fn id(&self) -> &str;

    /// Cheap precondition check. A `false` records the unit as skipped.
    fn validate(&self, state: &StateView) -> bool;

    /// Do the unit's work. Never mutates the state; the result is published
    /// by the orchestrator.
    async fn analyze(&self, state: &StateView) -> UnitResult;

    /// Rules the reducer applies to this unit's payload.
    fn rules(&self) -> Vec<ActionRule> {
        Vec::new()
    }
}

/// External services shared by the units of every run.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub cache: Option<Arc<SnapshotCache>>,
    pub inference: Option<Arc<dyn InferenceClient>>,
    pub completion: CompletionOptions,
    /// Estimated USD cost per 1000 model tokens, for metrics only.
    pub cost_per_1k_tokens: f64,
    pub places: Option<Arc<dyn PlacesClient>>,
    pub search: Option<Arc<dyn SearchClient>>,
}

impl Collaborators {
    /// Only a fetcher; every optional service disabled.
    pub fn with_fetcher(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            cache: None,
            inference: None,
            completion: CompletionOptions::default(),
            cost_per_1k_tokens: 0.0,
            places: None,
            search: None,
        }
    }
}

/// Measures a unit's execution and assembles its output.
pub(crate) struct Stopwatch {
    started: Instant,
    tokens_used: u64,
    cost_per_1k_tokens: f64,
}

impl Stopwatch {
    pub(crate) fn start(cost_per_1k_tokens: f64) -> Self {
        Self {
            started: Instant::now(),
            tokens_used: 0,
            cost_per_1k_tokens,
        }
    }

    pub(crate) fn add_tokens(&mut self, tokens: u64) {
        self.tokens_used += tokens;
    }

    pub(crate) fn finish(self, payload: Value) -> UnitResult {
        let metrics = UnitMetrics {
            execution_seconds: self.started.elapsed().as_secs_f64(),
            tokens_used: self.tokens_used,
            cost_usd: self.tokens_used as f64 / 1000.0 * self.cost_per_1k_tokens,
        };
        Ok(UnitOutput::new(payload).with_metrics(metrics))
    }
}

/// Issue entry shared by the payload shapes of several units.
pub(crate) fn issue(kind: &str, severity: &str, title: &str, description: String) -> Value {
    serde_json::json!({
        "type": kind,
        "severity": severity,
        "title": title,
        "description": description,
    })
}
