//! Root stage: fetch the target page into a snapshot.

use crate::analysis::rules::number_at;
use crate::analysis::ActionRule;
use crate::error::UnitFailure;
use crate::models::{ActionTemplate, Priority, UnitResult};
use crate::services::fetcher::validate_url;
use crate::services::{Fetcher, SnapshotCache};
use crate::state::StateView;
use crate::units::{AnalysisUnit, Stopwatch};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const ID: &str = "fetch";

/// Fetches `target_url`, consulting the snapshot cache first.
///
/// The payload is the serialized [`Snapshot`](crate::models::Snapshot); the
/// orchestrator parses it back and stores it as the run's snapshot.
pub struct FetchUnit {
    fetcher: Arc<dyn Fetcher>,
    cache: Option<Arc<SnapshotCache>>,
}

impl FetchUnit {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: Option<Arc<SnapshotCache>>) -> Self {
        Self { fetcher, cache }
    }
}

#[async_trait]
impl AnalysisUnit for FetchUnit {
    fn id(&self) -> &str {
        ID
    }

    fn validate(&self, state: &StateView) -> bool {
        validate_url(&state.input().target_url).is_ok()
    }

    async fn analyze(&self, state: &StateView) -> UnitResult {
        let watch = Stopwatch::start(0.0);
        let url = &state.input().target_url;

        let cached = match &self.cache {
            Some(cache) => cache.get(url).await,
            None => None,
        };
        let snapshot = match cached {
            Some(snapshot) => snapshot,
            None => {
                let snapshot = self
                    .fetcher
                    .fetch(url)
                    .await
                    .map_err(|e| UnitFailure::execution(e.to_string()))?;
                if let Some(cache) = &self.cache {
                    cache.insert(url, snapshot.clone()).await;
                }
                snapshot
            }
        };

        debug!(
            url = %snapshot.url,
            status = snapshot.status_code,
            links = snapshot.links.len(),
            "snapshot_ready"
        );

        let payload = serde_json::to_value(&snapshot)
            .map_err(|e| UnitFailure::execution(format!("snapshot not serializable: {}", e)))?;
        watch.finish(payload)
    }

    fn rules(&self) -> Vec<ActionRule> {
        vec![ActionRule::when(
            "http_status",
            |p| number_at(p, "/status_code").is_some_and(|s| s != 200.0),
            |p| {
                let status = number_at(p, "/status_code").unwrap_or(0.0);
                ActionTemplate::new(
                    "technical",
                    "Restore page availability",
                    Priority::Critical,
                    5,
                    3,
                )
                .describe(format!(
                    "The page answered with HTTP {}; search engines cannot index it reliably.",
                    status
                ))
            },
        )]
    }
}
