//! Search visibility for the page's primary keyword.

use crate::analysis::rules::{len_at, str_at};
use crate::analysis::ActionRule;
use crate::error::UnitFailure;
use crate::models::{ActionTemplate, Priority, UnitResult};
use crate::services::{SearchClient, SearchResults};
use crate::state::StateView;
use crate::units::{keywords, AnalysisUnit, Stopwatch};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;
use url::Url;

pub const ID: &str = "serp";

const MAX_COMPETITORS: usize = 5;
const LOCAL_INTENT: &[&str] = &["near me", "nearby", "open now", "closest", "delivery"];

pub struct SerpUnit {
    search: Option<Arc<dyn SearchClient>>,
}

impl SerpUnit {
    pub fn new(search: Option<Arc<dyn SearchClient>>) -> Self {
        Self { search }
    }
}

fn primary_keyword(state: &StateView) -> Option<&str> {
    state
        .payload(keywords::ID)
        .and_then(|p| str_at(p, "/primary_keyword"))
        .filter(|k| !k.is_empty())
}

fn site_host(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
}

/// Organic position of the target site, if it appears at all.
fn position_of(results: &SearchResults, target_url: &str) -> Option<u32> {
    let host = site_host(target_url)?;
    results
        .organic
        .iter()
        .find(|hit| site_host(&hit.link).as_deref() == Some(host.as_str()))
        .map(|hit| hit.position)
}

fn local_opportunities(results: &SearchResults, keyword: &str) -> Vec<String> {
    let mut found = Vec::new();
    if results.has_local_pack {
        found.push(format!("Local pack shown for \"{}\"", keyword));
    }
    found.extend(
        results
            .related_searches
            .iter()
            .filter(|q| {
                let q = q.to_lowercase();
                LOCAL_INTENT.iter().any(|term| q.contains(term))
            })
            .map(|q| format!("Related local query: \"{}\"", q)),
    );
    found
}

#[async_trait]
impl AnalysisUnit for SerpUnit {
    fn id(&self) -> &str {
        ID
    }

    fn validate(&self, state: &StateView) -> bool {
        primary_keyword(state).is_some()
    }

    async fn analyze(&self, state: &StateView) -> UnitResult {
        let watch = Stopwatch::start(0.0);
        let query = primary_keyword(state)
            .ok_or_else(|| UnitFailure::execution("no primary keyword available"))?
            .to_string();

        let results = match &self.search {
            None => None,
            Some(client) => match client.search(&query, state.input()).await {
                Ok(results) => Some(results),
                Err(e) => {
                    warn!(unit = ID, error = %e, "collaborator_degraded");
                    None
                }
            },
        };

        let Some(results) = results else {
            return watch.finish(json!({
                "query": query,
                "available": false,
                "position": Value::Null,
                "has_local_pack": false,
                "competitors": [],
                "related_searches": [],
                "local_search_opportunities": [],
            }));
        };

        let target = &state.input().target_url;
        let target_host = site_host(target);
        let competitors: Vec<Value> = results
            .organic
            .iter()
            .filter(|hit| site_host(&hit.link) != target_host)
            .take(MAX_COMPETITORS)
            .map(|hit| json!({"position": hit.position, "title": hit.title, "link": hit.link}))
            .collect();

        watch.finish(json!({
            "query": query,
            "available": true,
            "position": position_of(&results, target),
            "has_local_pack": results.has_local_pack,
            "competitors": competitors,
            "related_searches": results.related_searches,
            "local_search_opportunities": local_opportunities(&results, &query),
        }))
    }

    fn rules(&self) -> Vec<ActionRule> {
        vec![
            ActionRule::when(
                "local_search_opportunities",
                |p| len_at(p, "/local_search_opportunities") > 0,
                |p| {
                    ActionTemplate::new("geo", "Target local search opportunities", Priority::Medium, 4, 3)
                        .describe(format!(
                            "{} local search signal(s) found for \"{}\"; add location pages and a Google Business Profile.",
                            len_at(p, "/local_search_opportunities"),
                            str_at(p, "/query").unwrap_or_default()
                        ))
                },
            ),
            ActionRule::when(
                "not_ranking",
                |p| p["available"] == json!(true) && p["position"].is_null(),
                |p| {
                    ActionTemplate::new("keyword", "Earn a first-page ranking", Priority::Low, 3, 4)
                        .describe(format!(
                            "The site is not among the first-page results for \"{}\".",
                            str_at(p, "/query").unwrap_or_default()
                        ))
                },
            ),
        ]
    }
}
