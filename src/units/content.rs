//! Content quality analysis, optionally enriched by the language model.

use crate::analysis::rules::number_at;
use crate::analysis::ActionRule;
use crate::error::UnitFailure;
use crate::models::{ActionTemplate, Priority, Snapshot, UnitResult};
use crate::services::llm::extract_json_object;
use crate::services::{CompletionOptions, InferenceClient};
use crate::state::StateView;
use crate::units::{AnalysisUnit, Stopwatch};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

pub const ID: &str = "content";

const THIN_CONTENT_WORDS: usize = 300;
const PROMPT_TEXT_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You are an SEO content reviewer. \
Reply with a single JSON object: {\"topics\": [string], \"summary\": string, \"quality\": integer 0-100}. \
No other text.";

pub struct ContentUnit {
    inference: Option<Arc<dyn InferenceClient>>,
    options: CompletionOptions,
    cost_per_1k_tokens: f64,
}

impl ContentUnit {
    pub fn new(
        inference: Option<Arc<dyn InferenceClient>>,
        options: CompletionOptions,
        cost_per_1k_tokens: f64,
    ) -> Self {
        Self {
            inference,
            options: options.with_system(SYSTEM_PROMPT),
            cost_per_1k_tokens,
        }
    }
}

struct TextStats {
    word_count: usize,
    sentence_count: usize,
    avg_sentence_words: f64,
}

fn text_stats(text: &str) -> TextStats {
    let word_count = text.split_whitespace().count();
    let sentence_count = text
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count();
    let avg_sentence_words = if sentence_count == 0 {
        0.0
    } else {
        word_count as f64 / sentence_count as f64
    };
    TextStats {
        word_count,
        sentence_count,
        avg_sentence_words,
    }
}

/// Weighted score over length, structure, readability and meta coverage.
fn score(stats: &TextStats, snapshot: &Snapshot) -> f64 {
    let length = (stats.word_count as f64 / THIN_CONTENT_WORDS as f64).min(1.0) * 100.0;
    let structure = match snapshot.headings_at(2).len() {
        0 => 30.0,
        1 => 70.0,
        _ => 100.0,
    };
    let readability = match stats.avg_sentence_words {
        w if w == 0.0 => 0.0,
        w if w <= 20.0 => 100.0,
        w if w <= 30.0 => 70.0,
        _ => 40.0,
    };
    let meta = if snapshot.meta_description.is_some() {
        100.0
    } else {
        0.0
    };
    (length * 0.4 + structure * 0.2 + readability * 0.2 + meta * 0.2).round()
}

fn prompt(snapshot: &Snapshot, locale: &str) -> String {
    let text: String = snapshot.combined_text().chars().take(PROMPT_TEXT_CHARS).collect();
    format!(
        "Locale: {}\nURL: {}\n\nPage content:\n{}\n\nIdentify the main topics and rate the content quality.",
        locale, snapshot.url, text
    )
}

#[async_trait]
impl AnalysisUnit for ContentUnit {
    fn id(&self) -> &str {
        ID
    }

    fn validate(&self, state: &StateView) -> bool {
        state.snapshot().is_some()
    }

    async fn analyze(&self, state: &StateView) -> UnitResult {
        let mut watch = Stopwatch::start(self.cost_per_1k_tokens);
        let snapshot = state
            .snapshot()
            .ok_or_else(|| UnitFailure::execution("no snapshot available"))?;

        let stats = text_stats(&snapshot.text);
        let mut insights = Value::Null;
        let model = match &self.inference {
            None => "disabled",
            Some(client) => {
                match client
                    .complete(&prompt(snapshot, &state.input().locale), &self.options)
                    .await
                {
                    Ok(completion) => {
                        watch.add_tokens(completion.total_tokens());
                        insights = extract_json_object(&completion.text).unwrap_or(Value::Null);
                        if insights.is_null() {
                            "unparseable"
                        } else {
                            "used"
                        }
                    }
                    Err(e) => {
                        warn!(unit = ID, error = %e, "collaborator_degraded");
                        "unavailable"
                    }
                }
            }
        };

        watch.finish(json!({
            "score": score(&stats, snapshot),
            "word_count": stats.word_count,
            "sentence_count": stats.sentence_count,
            "avg_sentence_words": (stats.avg_sentence_words * 10.0).round() / 10.0,
            "has_meta_description": snapshot.meta_description.is_some(),
            "h2_count": snapshot.headings_at(2).len(),
            "topics": insights.get("topics").cloned().unwrap_or_else(|| json!([])),
            "summary": insights.get("summary").cloned().unwrap_or(Value::Null),
            "model": model,
        }))
    }

    fn rules(&self) -> Vec<ActionRule> {
        vec![
            ActionRule::when(
                "missing_meta_description",
                |p| p["has_meta_description"] == json!(false),
                |_| {
                    ActionTemplate::new("content", "Add a meta description", Priority::High, 4, 2)
                        .describe("The page has no meta description; write a 150-160 character summary.")
                },
            ),
            ActionRule::when(
                "thin_content",
                |p| {
                    number_at(p, "/word_count")
                        .is_some_and(|w| w < THIN_CONTENT_WORDS as f64)
                },
                |p| {
                    ActionTemplate::new("content", "Expand thin content", Priority::Medium, 3, 3)
                        .describe(format!(
                            "The page has {} words; pages under {} words rarely rank for competitive queries.",
                            number_at(p, "/word_count").unwrap_or(0.0),
                            THIN_CONTENT_WORDS
                        ))
                },
            ),
            ActionRule::when(
                "no_subheadings",
                |p| number_at(p, "/h2_count") == Some(0.0),
                |_| {
                    ActionTemplate::new("content", "Structure content with subheadings", Priority::Low, 2, 1)
                        .describe("No H2 headings found; break the text into scannable sections.")
                },
            ),
        ]
    }
}
