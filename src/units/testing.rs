//! Test doubles for units and collaborators.

use crate::analysis::ActionRule;
use crate::error::{CollaboratorError, FetchError, UnitFailure};
use crate::models::{RunInput, Snapshot, UnitOutput, UnitResult};
use crate::services::html::{parse_page, ExtractLimits};
use crate::services::llm::Completion;
use crate::services::{
    CompletionOptions, Fetcher, InferenceClient, Place, PlacesClient, SearchClient, SearchResults,
};
use crate::state::StateView;
use crate::units::AnalysisUnit;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SAMPLE_PAGE: &str = include_str!("../../fixtures/sample_page.html");

/// Snapshot of the bakery fixture page.
pub fn sample_snapshot(url: &str) -> Snapshot {
    parse_page(url, 200, SAMPLE_PAGE, 0.6, ExtractLimits::default())
}

enum Behavior {
    Ok(Value),
    Fail(String),
    Sleep(Duration, Value),
    Panic,
}

/// Unit whose outcome is fixed up front.
pub struct ScriptedUnit {
    id: String,
    behavior: Behavior,
    valid: bool,
    requires_visible: Vec<String>,
    rules: Vec<ActionRule>,
    runs: Arc<AtomicUsize>,
}

impl ScriptedUnit {
    fn new(id: &str, behavior: Behavior) -> Self {
        Self {
            id: id.to_string(),
            behavior,
            valid: true,
            requires_visible: Vec::new(),
            rules: Vec::new(),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn ok(id: &str, payload: Value) -> Self {
        Self::new(id, Behavior::Ok(payload))
    }

    pub fn failing(id: &str, message: &str) -> Self {
        Self::new(id, Behavior::Fail(message.to_string()))
    }

    pub fn sleeping(id: &str, duration: Duration, payload: Value) -> Self {
        Self::new(id, Behavior::Sleep(duration, payload))
    }

    pub fn panicking(id: &str) -> Self {
        Self::new(id, Behavior::Panic)
    }

    /// Fail validation so the unit is skipped.
    pub fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }

    /// Fail at run time if any of these results is missing from the view.
    pub fn expecting(mut self, ids: &[&str]) -> Self {
        self.requires_visible = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_rule(mut self, rule: ActionRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Counter of `analyze` calls, shared with the unit.
    pub fn runs(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }
}

#[async_trait]
impl AnalysisUnit for ScriptedUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self, _state: &StateView) -> bool {
        self.valid
    }

    async fn analyze(&self, state: &StateView) -> UnitResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(missing) = self
            .requires_visible
            .iter()
            .find(|id| state.result(id).is_none())
        {
            return Err(UnitFailure::execution(format!("'{}' not visible", missing)));
        }
        match &self.behavior {
            Behavior::Ok(payload) => Ok(UnitOutput::new(payload.clone())),
            Behavior::Fail(message) => Err(UnitFailure::execution(message.clone())),
            Behavior::Sleep(duration, payload) => {
                tokio::time::sleep(*duration).await;
                Ok(UnitOutput::new(payload.clone()))
            }
            Behavior::Panic => panic!("scripted panic in {}", self.id),
        }
    }

    fn rules(&self) -> Vec<ActionRule> {
        self.rules.clone()
    }
}

/// Fetcher returning a fixed snapshot or error.
pub struct FakeFetcher {
    snapshot: Option<Snapshot>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn serving(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            snapshot: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Snapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.snapshot {
            Some(snapshot) => {
                let mut snapshot = snapshot.clone();
                snapshot.url = url.to_string();
                Ok(snapshot)
            }
            None => Err(FetchError::Request {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// Inference client with a canned reply; `None` means unavailable.
pub struct FakeInference {
    reply: Option<String>,
}

impl FakeInference {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
        }
    }

    pub fn unavailable() -> Self {
        Self { reply: None }
    }
}

#[async_trait]
impl InferenceClient for FakeInference {
    async fn complete(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<Completion, CollaboratorError> {
        match &self.reply {
            Some(text) => Ok(Completion {
                text: text.clone(),
                prompt_tokens: 120,
                completion_tokens: 30,
            }),
            None => Err(CollaboratorError::Unavailable {
                service: "language model",
                message: "offline".to_string(),
            }),
        }
    }
}

/// Places client with canned listings; `None` means unavailable.
pub struct FakePlaces(pub Option<Vec<Place>>);

#[async_trait]
impl PlacesClient for FakePlaces {
    async fn lookup(
        &self,
        _query: &str,
        _input: &RunInput,
    ) -> Result<Vec<Place>, CollaboratorError> {
        self.0.clone().ok_or(CollaboratorError::Unavailable {
            service: "places lookup",
            message: "offline".to_string(),
        })
    }
}

/// Search client with canned results; `None` means unavailable.
pub struct FakeSearch(pub Option<SearchResults>);

#[async_trait]
impl SearchClient for FakeSearch {
    async fn search(
        &self,
        _query: &str,
        _input: &RunInput,
    ) -> Result<SearchResults, CollaboratorError> {
        self.0.clone().ok_or(CollaboratorError::Unavailable {
            service: "search lookup",
            message: "offline".to_string(),
        })
    }
}
