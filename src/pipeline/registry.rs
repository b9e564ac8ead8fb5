//! The default analysis graph.
//!
//! ```text
//! fetch ─┬─ technical
//!        ├─ content
//!        ├─ keywords ── serp
//!        └─ entities
//! ```

use crate::config::PipelineConfig;
use crate::error::GraphError;
use crate::graph::TaskGraph;
use crate::units::{
    content, entities, fetch, keywords, serp, technical, AnalysisUnit, Collaborators,
    ContentUnit, EntityUnit, FetchUnit, KeywordUnit, SerpUnit, TechnicalUnit,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type Declared = (&'static str, Arc<dyn AnalysisUnit>, &'static [&'static str]);

fn declare(
    id: &'static str,
    unit: impl AnalysisUnit + 'static,
    deps: &'static [&'static str],
) -> Declared {
    let unit: Arc<dyn AnalysisUnit> = Arc::new(unit);
    (id, unit, deps)
}

/// Every known unit with its dependencies, in declaration order.
fn declared_units(c: &Collaborators) -> Vec<Declared> {
    vec![
        declare(
            fetch::ID,
            FetchUnit::new(Arc::clone(&c.fetcher), c.cache.clone()),
            &[],
        ),
        declare(technical::ID, TechnicalUnit::new(), &[fetch::ID]),
        declare(
            content::ID,
            ContentUnit::new(c.inference.clone(), c.completion.clone(), c.cost_per_1k_tokens),
            &[fetch::ID],
        ),
        declare(keywords::ID, KeywordUnit::new(), &[fetch::ID]),
        declare(entities::ID, EntityUnit::new(c.places.clone()), &[fetch::ID]),
        declare(serp::ID, SerpUnit::new(c.search.clone()), &[keywords::ID]),
    ]
}

/// Ids of every unit [`default_graph`] can contain.
pub const UNIT_IDS: &[&str] = &[
    fetch::ID,
    technical::ID,
    content::ID,
    keywords::ID,
    entities::ID,
    serp::ID,
];

/// Build the analysis graph, honoring disabled units, weights and timeouts.
///
/// A disabled unit takes everything that depends on it out of the graph as
/// well; disabling `fetch` leaves no root and fails with
/// [`GraphError::MissingRoot`].
pub fn default_graph(
    collaborators: &Collaborators,
    settings: &PipelineConfig,
) -> Result<TaskGraph, GraphError> {
    let mut excluded: HashSet<&str> = settings.disabled.iter().map(String::as_str).collect();
    let mut builder = TaskGraph::builder();

    // dependencies are declared before their dependents, so one pass suffices
    for (id, unit, deps) in declared_units(collaborators) {
        if excluded.contains(id) || deps.iter().any(|d| excluded.contains(d)) {
            debug!(unit = id, "unit_left_out");
            excluded.insert(id);
            continue;
        }
        builder = if deps.is_empty() {
            builder.root(unit)
        } else {
            builder.unit(unit, deps)
        };
    }

    for (id, weight) in &settings.weights {
        if !excluded.contains(id.as_str()) {
            builder = builder.weight(id, *weight);
        }
    }
    for (id, seconds) in &settings.timeouts {
        if !excluded.contains(id.as_str()) {
            builder = builder.timeout(id, Duration::from_secs(*seconds));
        }
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::testing::FakeFetcher;

    fn collaborators() -> Collaborators {
        Collaborators::with_fetcher(Arc::new(FakeFetcher::unreachable()))
    }

    fn ids(graph: &TaskGraph) -> Vec<&str> {
        graph.nodes().iter().map(|n| n.id()).collect()
    }

    #[test]
    fn test_full_graph() {
        let graph = default_graph(&collaborators(), &PipelineConfig::default()).unwrap();
        assert_eq!(ids(&graph), UNIT_IDS.to_vec());
        assert_eq!(graph.root_id(), "fetch");
        assert_eq!(
            graph.execution_layers(),
            vec![
                vec!["fetch"],
                vec!["technical", "content", "keywords", "entities"],
                vec!["serp"],
            ]
        );
    }

    #[test]
    fn test_disabling_removes_dependents() {
        let settings = PipelineConfig {
            disabled: vec!["keywords".to_string()],
            ..Default::default()
        };
        let graph = default_graph(&collaborators(), &settings).unwrap();
        assert_eq!(ids(&graph), vec!["fetch", "technical", "content", "entities"]);
    }

    #[test]
    fn test_disabling_fetch_leaves_no_root() {
        let settings = PipelineConfig {
            disabled: vec!["fetch".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            default_graph(&collaborators(), &settings),
            Err(GraphError::MissingRoot)
        ));
    }

    #[test]
    fn test_weights_and_timeouts() {
        let mut settings = PipelineConfig::default();
        settings.weights.insert("fetch".to_string(), 4);
        settings.weights.insert("serp".to_string(), 2);
        settings.timeouts.insert("content".to_string(), 90);
        settings.disabled.push("serp".to_string());

        let graph = default_graph(&collaborators(), &settings).unwrap();
        assert_eq!(graph.node("fetch").unwrap().weight(), 4);
        assert_eq!(graph.total_weight(), 8);
        assert_eq!(
            graph.node("content").unwrap().timeout(),
            Some(Duration::from_secs(90))
        );
    }

    #[test]
    fn test_unknown_weight_is_rejected() {
        let mut settings = PipelineConfig::default();
        settings.weights.insert("typo".to_string(), 2);
        assert!(matches!(
            default_graph(&collaborators(), &settings),
            Err(GraphError::UnknownNode(_))
        ));
    }
}
