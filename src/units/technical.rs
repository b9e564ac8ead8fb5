//! Technical SEO audit of the fetched page.

use crate::analysis::rules::{number_at, str_at};
use crate::analysis::ActionRule;
use crate::error::UnitFailure;
use crate::models::{ActionTemplate, Priority, Snapshot, UnitResult};
use crate::state::StateView;
use crate::units::{issue, AnalysisUnit, Stopwatch};
use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

pub const ID: &str = "technical";

const TITLE_LEN: (usize, usize) = (30, 60);
const DESCRIPTION_LEN: (usize, usize) = (120, 160);
const MIN_ALT_RATIO: f64 = 0.8;
const SLOW_LOAD_SECONDS: f64 = 3.0;

/// Checks title, meta tags, headings, images, links, schema and speed.
#[derive(Default)]
pub struct TechnicalUnit;

impl TechnicalUnit {
    pub fn new() -> Self {
        Self
    }
}

struct Audit {
    issues: Vec<Value>,
    /// (dimension score 0-100, weight)
    dimensions: Vec<(f64, f64)>,
}

impl Audit {
    fn flag(&mut self, kind: &str, severity: &str, title: &str, description: String) {
        self.issues.push(issue(kind, severity, title, description));
    }
}

fn score(dimensions: &[(f64, f64)]) -> f64 {
    let total: f64 = dimensions.iter().map(|(_, w)| w).sum();
    if total == 0.0 {
        return 0.0;
    }
    let weighted: f64 = dimensions.iter().map(|(s, w)| s * w).sum();
    (weighted / total).round()
}

fn audit(snapshot: &Snapshot) -> Audit {
    let mut a = Audit {
        issues: Vec::new(),
        dimensions: Vec::new(),
    };

    // Performance
    let mut perf = 100.0;
    if snapshot.load_time_seconds > 1.0 {
        perf -= ((snapshot.load_time_seconds - 1.0) * 10.0).min(50.0);
    }
    if snapshot.status_code != 200 {
        perf -= 30.0;
    }
    a.dimensions.push((f64::max(perf, 0.0), 0.25));

    // Meta tags
    let mut meta = 100.0;
    match snapshot.title.as_deref().map(|t| t.chars().count()) {
        None => {
            meta -= 50.0;
            a.flag(
                "missing_title",
                "critical",
                "Add a title tag",
                "The page has no <title>; it is the strongest on-page ranking signal.".to_string(),
            );
        }
        Some(len) if len < TITLE_LEN.0 || len > TITLE_LEN.1 => {
            meta -= 15.0;
            a.flag(
                "title_length",
                "medium",
                "Adjust title length",
                format!(
                    "Title is {} characters; {}-{} displays best in results.",
                    len, TITLE_LEN.0, TITLE_LEN.1
                ),
            );
        }
        Some(_) => {}
    }
    match snapshot.meta_description.as_deref().map(|d| d.chars().count()) {
        None => meta -= 30.0,
        Some(len) if len < DESCRIPTION_LEN.0 || len > DESCRIPTION_LEN.1 => {
            meta -= 10.0;
            a.flag(
                "description_length",
                "low",
                "Adjust meta description length",
                format!(
                    "Meta description is {} characters; aim for {}-{}.",
                    len, DESCRIPTION_LEN.0, DESCRIPTION_LEN.1
                ),
            );
        }
        Some(_) => {}
    }
    a.dimensions.push((f64::max(meta, 0.0), 0.25));

    // Headings
    let h1_count = snapshot.headings_at(1).len();
    let headings = match h1_count {
        1 => 100.0,
        0 => {
            a.flag(
                "missing_h1",
                "high",
                "Add a single H1 heading",
                "No H1 found; search engines use it to understand the page topic.".to_string(),
            );
            40.0
        }
        n => {
            a.flag(
                "multiple_h1",
                "medium",
                "Use a single H1 heading",
                format!("Found {} H1 headings; keep one and demote the rest.", n),
            );
            70.0
        }
    };
    a.dimensions.push((headings, 0.15));

    // Images
    let images = if snapshot.images.is_empty() {
        100.0
    } else {
        let with_alt = snapshot.images.iter().filter(|i| !i.alt.is_empty()).count();
        let ratio = with_alt as f64 / snapshot.images.len() as f64;
        if ratio < MIN_ALT_RATIO {
            a.flag(
                "missing_alt",
                "medium",
                "Add alt text to images",
                format!(
                    "{} of {} images lack alt text.",
                    snapshot.images.len() - with_alt,
                    snapshot.images.len()
                ),
            );
        }
        ratio * 100.0
    };
    a.dimensions.push((images, 0.15));

    // Links
    let host = Url::parse(&snapshot.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));
    let internal = snapshot
        .links
        .iter()
        .filter(|l| {
            Url::parse(&l.href)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                == host
        })
        .count();
    let links = if internal == 0 {
        a.flag(
            "no_internal_links",
            "medium",
            "Add internal links",
            "The page links to no other page on the same site.".to_string(),
        );
        40.0
    } else {
        100.0
    };
    a.dimensions.push((links, 0.1));

    // Structured data
    let schema = if snapshot.structured_data.is_empty() {
        a.flag(
            "missing_schema",
            "low",
            "Add structured data",
            "No JSON-LD blocks found; schema.org markup enables rich results.".to_string(),
        );
        0.0
    } else {
        100.0
    };
    a.dimensions.push((schema, 0.1));

    a
}

#[async_trait]
impl AnalysisUnit for TechnicalUnit {
    fn id(&self) -> &str {
        ID
    }

    fn validate(&self, state: &StateView) -> bool {
        state.snapshot().is_some()
    }

    async fn analyze(&self, state: &StateView) -> UnitResult {
        let watch = Stopwatch::start(0.0);
        let snapshot = state
            .snapshot()
            .ok_or_else(|| UnitFailure::execution("no snapshot available"))?;

        let a = audit(snapshot);
        let critical_issues: Vec<Value> = a
            .issues
            .iter()
            .filter(|i| matches!(i["severity"].as_str(), Some("critical") | Some("high")))
            .cloned()
            .collect();

        watch.finish(json!({
            "score": score(&a.dimensions),
            "status_code": snapshot.status_code,
            "load_time": snapshot.load_time_seconds,
            "https": snapshot.url.starts_with("https://"),
            "h1_count": snapshot.headings_at(1).len(),
            "image_count": snapshot.images.len(),
            "link_count": snapshot.links.len(),
            "structured_data_blocks": snapshot.structured_data.len(),
            "critical_issues": critical_issues,
            "issues": a.issues,
        }))
    }

    fn rules(&self) -> Vec<ActionRule> {
        vec![
            ActionRule::when(
                "slow_page",
                |p| number_at(p, "/load_time").is_some_and(|t| t > SLOW_LOAD_SECONDS),
                |p| {
                    ActionTemplate::new("technical", "Improve page load speed", Priority::High, 5, 4)
                        .describe(format!(
                            "The page took {:.1}s to load; bring it under {:.0}s by compressing images and caching assets.",
                            number_at(p, "/load_time").unwrap_or(0.0),
                            SLOW_LOAD_SECONDS
                        ))
                },
            ),
            ActionRule::for_each("critical_issues", "/critical_issues", 3, |i| {
                let critical = str_at(i, "/severity") == Some("critical");
                ActionTemplate::new(
                    "technical",
                    str_at(i, "/title").unwrap_or("Fix technical issue"),
                    if critical { Priority::High } else { Priority::Medium },
                    if critical { 5 } else { 4 },
                    3,
                )
                .describe(str_at(i, "/description").unwrap_or_default())
            }),
        ]
    }
}
