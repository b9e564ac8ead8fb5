//! Action plan aggregation and run statistics.
//!
//! Helpers used by the report renderer to summarize a plan and the
//! per-unit outcomes of a run.

use crate::models::{ActionItem, Priority, RunResults, Settlement};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Count of action items per priority and category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub by_category: BTreeMap<String, usize>,
}

impl PlanSummary {
    pub fn from_items(items: &[ActionItem]) -> Self {
        let mut summary = PlanSummary {
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            match item.priority {
                Priority::Critical => summary.critical += 1,
                Priority::High => summary.high += 1,
                Priority::Medium => summary.medium += 1,
                Priority::Low => summary.low += 1,
            }
            *summary.by_category.entry(item.category.clone()).or_default() += 1;
        }
        summary
    }

    /// Number of items at or above `threshold`.
    pub fn at_or_above(&self, threshold: Priority) -> usize {
        [
            (Priority::Critical, self.critical),
            (Priority::High, self.high),
            (Priority::Medium, self.medium),
            (Priority::Low, self.low),
        ]
        .iter()
        .filter(|(p, _)| *p >= threshold)
        .map(|(_, n)| n)
        .sum()
    }
}

/// Settlement counts and summed metrics over all units of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub ok: usize,
    pub failed: usize,
    pub skipped: usize,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub execution_seconds: f64,
}

pub fn summarize_outcomes(results: &RunResults) -> OutcomeSummary {
    let mut summary = OutcomeSummary::default();
    for record in &results.units {
        match &record.settlement {
            Settlement::Ok(output) => {
                summary.ok += 1;
                summary.tokens_used += output.metrics.tokens_used;
                summary.cost_usd += output.metrics.cost_usd;
                summary.execution_seconds += output.metrics.execution_seconds;
            }
            Settlement::Err { .. } => summary.failed += 1,
            Settlement::Skipped { .. } => summary.skipped += 1,
        }
    }
    summary
}

/// Group items by category, keeping plan order inside each group.
pub fn group_by_category(items: &[ActionItem]) -> BTreeMap<&str, Vec<&ActionItem>> {
    let mut grouped: BTreeMap<&str, Vec<&ActionItem>> = BTreeMap::new();
    for item in items {
        grouped.entry(item.category.as_str()).or_default().push(item);
    }
    grouped
}

/// Group items by the unit that produced them.
pub fn group_by_source(items: &[ActionItem]) -> BTreeMap<&str, Vec<&ActionItem>> {
    let mut grouped: BTreeMap<&str, Vec<&ActionItem>> = BTreeMap::new();
    for item in items {
        grouped.entry(item.source_unit.as_str()).or_default().push(item);
    }
    grouped
}

/// High-impact, low-effort items in plan order.
pub fn quick_wins(items: &[ActionItem], n: usize) -> Vec<&ActionItem> {
    items
        .iter()
        .filter(|i| i.impact >= 4 && i.effort <= 2)
        .take(n)
        .collect()
}

/// Plain-text summary of a plan.
pub fn generate_summary_text(summary: &PlanSummary) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Total Actions: {}", summary.total));
    lines.push(format!(
        "- {} Critical: {}",
        Priority::Critical.emoji(),
        summary.critical
    ));
    lines.push(format!("- {} High: {}", Priority::High.emoji(), summary.high));
    lines.push(format!(
        "- {} Medium: {}",
        Priority::Medium.emoji(),
        summary.medium
    ));
    lines.push(format!("- {} Low: {}", Priority::Low.emoji(), summary.low));

    if !summary.by_category.is_empty() {
        lines.push(String::new());
        lines.push("By Category:".to_string());

        let mut categories: Vec<_> = summary.by_category.iter().collect();
        categories.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

        for (category, count) in categories {
            lines.push(format!("- {}: {}", category, count));
        }
    }

    lines.join("\n")
}
