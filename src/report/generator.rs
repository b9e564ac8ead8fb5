//! Markdown and JSON report generation.
//!
//! Reports are rendered from [`RunResults`] as loaded from the checkpoint
//! store, so a report can be produced for any run, finished or not.

use crate::analysis::aggregator::{
    group_by_category, group_by_source, quick_wins, summarize_outcomes, OutcomeSummary,
    PlanSummary,
};
use crate::models::{ActionItem, Priority, RunResults, Settlement, UnitRecord};
use anyhow::Result;
use serde_json::Value;

/// Quick wins listed in the summary.
const QUICK_WIN_COUNT: usize = 3;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(results: &RunResults) -> String {
    let mut output = String::new();

    output.push_str("# SiteScout Report\n\n");

    let outcomes = summarize_outcomes(results);
    output.push_str(&generate_metadata_section(results, &outcomes));

    let items = results.action_plan.as_deref().unwrap_or_default();
    output.push_str(&generate_summary_section(items));
    output.push_str(&generate_units_section(&results.units, items, &outcomes));
    output.push_str(&generate_plan_section(results.action_plan.as_deref()));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(results: &RunResults, outcomes: &OutcomeSummary) -> String {
    let mut section = String::new();
    let status = &results.status;

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **URL:** {}\n", results.input.target_url));
    section.push_str(&format!("- **Locale:** {}\n", results.input.locale));
    section.push_str(&format!("- **Run:** `{}`\n", status.run_id));
    section.push_str(&format!("- **Status:** {}\n", status.status.as_str()));
    if let Some(ref error) = status.error {
        section.push_str(&format!("- **Error:** {}\n", error));
    }
    if let Some(started) = status.started_at {
        section.push_str(&format!(
            "- **Analysis Date:** {}\n",
            started.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    if let (Some(started), Some(finished)) = (status.started_at, status.finished_at) {
        let millis = (finished - started).num_milliseconds().max(0);
        section.push_str(&format!(
            "- **Analysis Duration:** {:.1}s\n",
            millis as f64 / 1000.0
        ));
    }
    if outcomes.tokens_used > 0 {
        section.push_str(&format!(
            "- **Model Tokens:** {} (~${:.4})\n",
            outcomes.tokens_used, outcomes.cost_usd
        ));
    }
    section.push('\n');

    section
}

/// Generate the summary section.
fn generate_summary_section(items: &[ActionItem]) -> String {
    let mut section = String::new();
    let summary = PlanSummary::from_items(items);

    section.push_str("## Summary\n\n");

    section.push_str("### Action Priority Breakdown\n\n");
    section.push_str(&format!(
        "| {} Critical | {} High | {} Medium | {} Low | **Total** |\n",
        Priority::Critical.emoji(),
        Priority::High.emoji(),
        Priority::Medium.emoji(),
        Priority::Low.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** |\n\n",
        summary.critical, summary.high, summary.medium, summary.low, summary.total
    ));

    if !summary.by_category.is_empty() {
        section.push_str("### Actions by Category\n\n");
        section.push_str("| Category | Count |\n");
        section.push_str("|:---|:---:|\n");

        let mut categories: Vec<_> = summary.by_category.iter().collect();
        categories.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

        for (category, count) in categories {
            section.push_str(&format!("| {} | {} |\n", category, count));
        }
        section.push('\n');
    }

    let wins = quick_wins(items, QUICK_WIN_COUNT);
    if !wins.is_empty() {
        section.push_str("### Quick Wins\n\n");
        for item in wins {
            section.push_str(&format!(
                "- **{}** (impact {}, effort {})\n",
                item.title, item.impact, item.effort
            ));
        }
        section.push('\n');
    }

    section
}

/// Headline number of a unit's payload, if it has one.
fn headline(payload: &Value) -> Option<String> {
    if let Some(score) = payload
        .get("score")
        .or_else(|| payload.get("consistency_score"))
        .and_then(Value::as_f64)
    {
        return Some(format!("{:.0}/100", score));
    }
    payload
        .get("position")
        .and_then(Value::as_u64)
        .map(|position| format!("#{}", position))
}

/// Generate the per-unit outcome table.
fn generate_units_section(
    units: &[UnitRecord],
    items: &[ActionItem],
    outcomes: &OutcomeSummary,
) -> String {
    let mut section = String::new();

    section.push_str("## Analysis Units\n\n");
    section.push_str(&format!(
        "*{} succeeded, {} failed, {} skipped*\n\n",
        outcomes.ok, outcomes.failed, outcomes.skipped
    ));

    if units.is_empty() {
        section.push_str("No unit settled.\n\n");
        return section;
    }

    let by_source = group_by_source(items);
    section.push_str("| Unit | Outcome | Result | Time | Actions | Detail |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|:---|\n");
    for record in units {
        let actions = by_source.get(record.unit_id.as_str()).map_or(0, Vec::len);
        let (result, time) = match &record.settlement {
            Settlement::Ok(output) => (
                headline(&output.payload).unwrap_or_else(|| "-".to_string()),
                format!("{:.2}s", output.metrics.execution_seconds),
            ),
            _ => ("-".to_string(), "-".to_string()),
        };
        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} | {} |\n",
            record.unit_id,
            record.settlement.label(),
            result,
            time,
            actions,
            record.settlement.detail().unwrap_or_default()
        ));
    }
    section.push('\n');

    section
}

/// Generate the action plan, grouped by category in plan order.
fn generate_plan_section(plan: Option<&[ActionItem]>) -> String {
    let mut section = String::new();

    section.push_str("## Action Plan\n\n");

    let items = match plan {
        None => {
            section.push_str("The run did not complete; no action plan was produced.\n\n");
            return section;
        }
        Some([]) => {
            section.push_str("No actions recommended. The page looks healthy! 🎉\n\n");
            return section;
        }
        Some(items) => items,
    };

    for (i, item) in items.iter().enumerate() {
        section.push_str(&generate_action_block(i + 1, item));
    }

    section.push_str("### By Category\n\n");
    for (category, group) in group_by_category(items) {
        let titles: Vec<&str> = group.iter().map(|item| item.title.as_str()).collect();
        section.push_str(&format!("- **{}:** {}\n", category, titles.join("; ")));
    }
    section.push('\n');

    section
}

/// Generate a single action block.
fn generate_action_block(rank: usize, item: &ActionItem) -> String {
    let mut block = String::new();

    let priority_badge = match item.priority {
        Priority::Critical => "🔴 **CRITICAL**",
        Priority::High => "🟠 **HIGH**",
        Priority::Medium => "🟡 **MEDIUM**",
        Priority::Low => "🟢 **LOW**",
    };

    block.push_str(&format!(
        "### {}. {} {} - {}\n\n",
        rank, priority_badge, item.category, item.title
    ));
    block.push_str(&format!(
        "**Impact:** {}/5 | **Effort:** {}/5 | **Source:** `{}`\n\n",
        item.impact, item.effort, item.source_unit
    ));
    if !item.description.is_empty() {
        block.push_str(&format!("{}\n\n", item.description));
    }
    block.push_str("---\n\n");

    block
}

/// Generate the report footer.
fn generate_footer() -> String {
    format!(
        "---\n\n*Report generated by SiteScout v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Generate a JSON report.
pub fn generate_json_report(results: &RunResults) -> Result<String> {
    serde_json::to_string_pretty(results).map_err(Into::into)
}
