//! Data models for the analysis pipeline.
//!
//! This module contains the core data structures shared by the task graph,
//! the orchestrator, the reducer, the checkpoint stores and the reports.

use crate::error::UnitFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Priority of a recommended action.
///
/// Variants are declared in ascending order so that `Ord` ranks
/// `Critical` highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Nice to have
    Low,
    /// Worth scheduling
    Medium,
    /// Noticeably hurts visibility
    High,
    /// Blocks indexing or ranking outright
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "Low"),
            Priority::Medium => write!(f, "Medium"),
            Priority::High => write!(f, "High"),
            Priority::Critical => write!(f, "Critical"),
        }
    }
}

impl Priority {
    /// Returns an emoji representation of the priority.
    pub fn emoji(&self) -> &'static str {
        match self {
            Priority::Low => "🟢",
            Priority::Medium => "🟡",
            Priority::High => "🟠",
            Priority::Critical => "🔴",
        }
    }
}

impl From<&str> for Priority {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "critical" => Priority::Critical,
            "high" => Priority::High,
            "medium" => Priority::Medium,
            _ => Priority::Low,
        }
    }
}

/// Identifier of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh random run id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The immutable input of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInput {
    /// Page to analyze.
    pub target_url: String,
    /// Locale used for lookups and language-model prompts, e.g. `en-US`.
    pub locale: String,
}

impl RunInput {
    pub fn new(target_url: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            locale: locale.into(),
        }
    }

    /// Language part of the locale (`en` for `en-US`).
    pub fn language(&self) -> &str {
        self.locale.split(['-', '_']).next().unwrap_or("en")
    }

    /// Region part of the locale (`US` for `en-US`), if any.
    pub fn region(&self) -> Option<&str> {
        self.locale.split(['-', '_']).nth(1)
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Terminal statuses are sinks: no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// A hyperlink found on the fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default)]
    pub text: String,
}

/// An image found on the fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub src: String,
    #[serde(default)]
    pub alt: String,
}

/// Structured bundle produced by the fetch stage.
///
/// The orchestrator stores it unexamined; only analysis units read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub url: String,
    pub status_code: u16,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub meta_keywords: Option<String>,
    /// Heading texts keyed by level (`h1` .. `h6`).
    #[serde(default)]
    pub headings: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub links: Vec<Link>,
    /// Parsed JSON-LD blocks.
    #[serde(default)]
    pub structured_data: Vec<Value>,
    /// Visible body text with markup stripped.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub content_length: usize,
    #[serde(default)]
    pub load_time_seconds: f64,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    /// Headings at a given level (1-6).
    pub fn headings_at(&self, level: u8) -> &[String] {
        self.headings
            .get(&format!("h{}", level))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Title, meta description, headings and body text joined for text analysis.
    pub fn combined_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(title) = &self.title {
            parts.push(title);
        }
        if let Some(desc) = &self.meta_description {
            parts.push(desc);
        }
        for texts in self.headings.values() {
            parts.extend(texts.iter().map(String::as_str));
        }
        parts.push(&self.text);
        parts.join("\n")
    }
}

/// Observability data attached to a successful unit result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitMetrics {
    /// Wall time spent in `analyze`.
    pub execution_seconds: f64,
    /// Estimated language-model tokens consumed.
    pub tokens_used: u64,
    /// Estimated cost in USD.
    pub cost_usd: f64,
}

/// Payload published by a unit that ran successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOutput {
    pub payload: Value,
    #[serde(default)]
    pub metrics: UnitMetrics,
}

impl UnitOutput {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            metrics: UnitMetrics::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: UnitMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Outcome of running one unit's `analyze`.
pub type UnitResult = Result<UnitOutput, UnitFailure>;

/// Why a unit was not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The unit's own precondition check rejected the state.
    ValidationFailed,
    /// A required predecessor ran and failed.
    UpstreamFailed { unit: String },
    /// A required predecessor was itself skipped.
    UpstreamSkipped { unit: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ValidationFailed => write!(f, "precondition not met"),
            SkipReason::UpstreamFailed { unit } => write!(f, "upstream '{}' failed", unit),
            SkipReason::UpstreamSkipped { unit } => write!(f, "upstream '{}' was skipped", unit),
        }
    }
}

/// Final per-unit state written into the shared state's result map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Settlement {
    Ok(UnitOutput),
    Err { failure: UnitFailure },
    Skipped { reason: SkipReason },
}

impl Settlement {
    pub fn from_result(result: UnitResult) -> Self {
        match result {
            Ok(output) => Settlement::Ok(output),
            Err(failure) => Settlement::Err { failure },
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Settlement::Skipped { reason }
    }

    /// Payload of a successful settlement.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Settlement::Ok(output) => Some(&output.payload),
            _ => None,
        }
    }

    /// Short label used in logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Settlement::Ok(_) => "ok",
            Settlement::Err { .. } => "error",
            Settlement::Skipped { .. } => "skipped",
        }
    }

    /// Human-readable error or skip reason, if any.
    pub fn detail(&self) -> Option<String> {
        match self {
            Settlement::Ok(_) => None,
            Settlement::Err { failure } => Some(failure.to_string()),
            Settlement::Skipped { reason } => Some(reason.to_string()),
        }
    }
}

/// Action item content before provenance is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub category: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub impact: u8,
    pub effort: u8,
}

impl ActionTemplate {
    pub fn new(
        category: impl Into<String>,
        title: impl Into<String>,
        priority: Priority,
        impact: u8,
        effort: u8,
    ) -> Self {
        Self {
            category: category.into(),
            title: title.into(),
            description: String::new(),
            priority,
            impact,
            effort,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach provenance; impact and effort are clamped to 1-5.
    pub fn into_item(self, source_unit: &str) -> ActionItem {
        ActionItem {
            category: self.category,
            title: self.title,
            description: self.description,
            priority: self.priority,
            impact: self.impact.clamp(1, 5),
            effort: self.effort.clamp(1, 5),
            source_unit: source_unit.to_string(),
        }
    }
}

/// One recommended action in the final plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub category: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    /// Expected benefit, 1 (minor) to 5 (major).
    pub impact: u8,
    /// Expected work, 1 (trivial) to 5 (large).
    pub effort: u8,
    /// Unit whose rule produced this item.
    pub source_unit: String,
}

/// Read-only projection of a run's status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatusView {
    pub run_id: RunId,
    pub status: RunStatus,
    pub progress: f64,
    /// Units that have settled so far, in settlement order.
    #[serde(default)]
    pub settled_units: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Persisted settlement of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub unit_id: String,
    pub settlement: Settlement,
    pub recorded_at: DateTime<Utc>,
}

/// Everything a finished (or in-flight) run exposes to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    pub input: RunInput,
    pub status: RunStatusView,
    /// Per-unit settlements in the order they were recorded.
    pub units: Vec<UnitRecord>,
    /// Present only once the reducer has run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_plan: Option<Vec<ActionItem>>,
}

impl RunResults {
    pub fn unit(&self, unit_id: &str) -> Option<&Settlement> {
        self.units
            .iter()
            .find(|r| r.unit_id == unit_id)
            .map(|r| &r.settlement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Critical);
    }

    #[test]
    fn test_priority_emoji() {
        assert_eq!(Priority::Critical.emoji(), "🔴");
        assert_eq!(Priority::High.emoji(), "🟠");
        assert_eq!(Priority::Medium.emoji(), "🟡");
        assert_eq!(Priority::Low.emoji(), "🟢");
    }

    #[test]
    fn test_priority_from_str() {
        assert_eq!(Priority::from("CRITICAL"), Priority::Critical);
        assert_eq!(Priority::from("high"), Priority::High);
        assert_eq!(Priority::from("whatever"), Priority::Low);
    }

    #[test]
    fn test_run_status_round_trip_and_terminal() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>(), Ok(status));
        }
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!("bogus".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_locale_parts() {
        let input = RunInput::new("https://example.com", "zh-CN");
        assert_eq!(input.language(), "zh");
        assert_eq!(input.region(), Some("CN"));

        let bare = RunInput::new("https://example.com", "de");
        assert_eq!(bare.language(), "de");
        assert_eq!(bare.region(), None);
    }

    #[test]
    fn test_template_clamps_impact_and_effort() {
        let item = ActionTemplate::new("technical", "Fix", Priority::High, 9, 0)
            .describe("details")
            .into_item("technical");
        assert_eq!(item.impact, 5);
        assert_eq!(item.effort, 1);
        assert_eq!(item.source_unit, "technical");
        assert_eq!(item.description, "details");
    }

    #[test]
    fn test_settlement_serialization_is_tagged() {
        let skipped = Settlement::skipped(SkipReason::UpstreamFailed {
            unit: "fetch".to_string(),
        });
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"]["reason"], "upstream_failed");

        let back: Settlement = serde_json::from_value(json).unwrap();
        assert_eq!(back, skipped);
        assert_eq!(back.label(), "skipped");
        assert!(back.payload().is_none());
    }

    #[test]
    fn test_snapshot_helpers() {
        let mut headings = BTreeMap::new();
        headings.insert("h1".to_string(), vec!["Welcome".to_string()]);
        let snapshot = Snapshot {
            url: "https://example.com".to_string(),
            status_code: 200,
            title: Some("Example".to_string()),
            meta_description: None,
            meta_keywords: None,
            headings,
            images: vec![],
            links: vec![],
            structured_data: vec![],
            text: "Body text".to_string(),
            content_length: 9,
            load_time_seconds: 0.4,
            fetched_at: Utc::now(),
        };
        assert_eq!(snapshot.headings_at(1), ["Welcome".to_string()]);
        assert!(snapshot.headings_at(2).is_empty());
        let text = snapshot.combined_text();
        assert!(text.contains("Example"));
        assert!(text.contains("Welcome"));
        assert!(text.contains("Body text"));
    }
}
