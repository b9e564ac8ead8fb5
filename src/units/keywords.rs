//! Keyword frequency, declared-keyword coverage and density checks.

use crate::analysis::rules::len_at;
use crate::analysis::ActionRule;
use crate::error::UnitFailure;
use crate::models::{ActionTemplate, Priority, Snapshot, UnitResult};
use crate::state::StateView;
use crate::units::{AnalysisUnit, Stopwatch};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

pub const ID: &str = "keywords";

const TOP_KEYWORDS: usize = 10;
/// Density (percent of all words) above which a keyword counts as stuffed.
const OVER_OPTIMIZED_DENSITY: f64 = 4.0;
const MIN_STUFFED_COUNT: usize = 5;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "in", "is",
    "it", "its", "of", "on", "or", "our", "that", "the", "this", "to", "was", "we", "with", "you",
    "your", "every", "least", "ahead", "us",
];

#[derive(Default)]
pub struct KeywordUnit;

impl KeywordUnit {
    pub fn new() -> Self {
        Self
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| w.chars().count() > 2 && !w.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

struct KeywordStats {
    total_words: usize,
    /// (keyword, count) ordered by count descending, then first appearance.
    ranked: Vec<(String, usize)>,
}

fn keyword_stats(snapshot: &Snapshot) -> KeywordStats {
    let stop: HashSet<&str> = STOPWORDS.iter().copied().collect();
    let words = tokenize(&snapshot.text);
    let total_words = words.len();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();
    for w in words.iter().filter(|w| !stop.contains(w.as_str())) {
        let count = counts.entry(w.as_str()).or_insert(0);
        if *count == 0 {
            first_seen.push(w.as_str());
        }
        *count += 1;
    }

    let mut ranked: Vec<(String, usize)> = first_seen
        .into_iter()
        .map(|w| (w.to_string(), counts[w]))
        .collect();
    // stable: ties keep first-appearance order
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    KeywordStats { total_words, ranked }
}

fn density(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (count as f64 * 1000.0 / total as f64).round() / 10.0
    }
}

fn declared_keywords(snapshot: &Snapshot) -> Vec<String> {
    snapshot
        .meta_keywords
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

#[async_trait]
impl AnalysisUnit for KeywordUnit {
    fn id(&self) -> &str {
        ID
    }

    fn validate(&self, state: &StateView) -> bool {
        state.snapshot().is_some_and(|s| !s.text.is_empty())
    }

    async fn analyze(&self, state: &StateView) -> UnitResult {
        let watch = Stopwatch::start(0.0);
        let snapshot = state
            .snapshot()
            .ok_or_else(|| UnitFailure::execution("no snapshot available"))?;

        let stats = keyword_stats(snapshot);
        let body = snapshot.text.to_lowercase();

        let top: Vec<Value> = stats
            .ranked
            .iter()
            .take(TOP_KEYWORDS)
            .map(|(k, c)| json!({"keyword": k, "count": c, "density": density(*c, stats.total_words)}))
            .collect();

        let over_optimized: Vec<&str> = stats
            .ranked
            .iter()
            .filter(|(_, c)| *c >= MIN_STUFFED_COUNT && density(*c, stats.total_words) > OVER_OPTIMIZED_DENSITY)
            .map(|(k, _)| k.as_str())
            .collect();

        let declared = declared_keywords(snapshot);
        let keyword_gaps: Vec<&str> = declared
            .iter()
            .filter(|k| !body.contains(k.as_str()))
            .map(String::as_str)
            .collect();

        let title = snapshot.title.as_deref().unwrap_or_default().to_lowercase();
        let primary = stats.ranked.first().map(|(k, _)| k.as_str());
        let primary_in_title = primary.is_some_and(|k| title.contains(k));

        // coverage of declared keywords, focus of the primary keyword, stuffing penalty
        let coverage = if declared.is_empty() {
            50.0
        } else {
            (declared.len() - keyword_gaps.len()) as f64 / declared.len() as f64 * 100.0
        };
        let focus = if primary_in_title { 100.0 } else { 40.0 };
        let stuffing = if over_optimized.is_empty() { 100.0 } else { 30.0 };
        let score = (coverage * 0.4 + focus * 0.3 + stuffing * 0.3).round();

        watch.finish(json!({
            "score": score,
            "total_words": stats.total_words,
            "primary_keyword": primary,
            "primary_in_title": primary_in_title,
            "top_keywords": top,
            "declared_keywords": declared,
            "keyword_gaps": keyword_gaps,
            "over_optimized": over_optimized,
        }))
    }

    fn rules(&self) -> Vec<ActionRule> {
        vec![
            ActionRule::when(
                "keyword_gaps",
                |p| len_at(p, "/keyword_gaps") > 0,
                |p| {
                    ActionTemplate::new("keyword", "Close keyword gaps", Priority::Medium, 4, 3)
                        .describe(format!(
                            "{} declared keyword(s) never appear in the page text; add content that covers them.",
                            len_at(p, "/keyword_gaps")
                        ))
                },
            ),
            ActionRule::when(
                "over_optimized",
                |p| len_at(p, "/over_optimized") > 0,
                |_| {
                    ActionTemplate::new("keyword", "Reduce keyword stuffing", Priority::Medium, 3, 2)
                        .describe("Some keywords exceed a healthy density; vary the wording to avoid over-optimization.")
                },
            ),
        ]
    }
}
