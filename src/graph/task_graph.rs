//! Static dependency graph of analysis units.
//!
//! The graph is declared once with [`TaskGraphBuilder`] and validated at
//! `build()`: unknown dependencies, cycles, a missing or duplicated root and
//! units that cannot reach the root are all rejected before any run starts.

use crate::error::GraphError;
use crate::units::AnalysisUnit;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How a node enters the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The mandatory fetch stage. Exactly one per graph.
    Root,
    /// Runs after all of its dependencies have settled.
    Dependent,
    /// Has no dependencies and is exempt from the root requirement.
    Independent,
}

/// A declared unit with its scheduling attributes.
#[derive(Clone)]
pub struct GraphNode {
    unit: Arc<dyn AnalysisUnit>,
    id: String,
    deps: Vec<String>,
    kind: NodeKind,
    weight: u32,
    timeout: Option<Duration>,
}

impl GraphNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn unit(&self) -> &Arc<dyn AnalysisUnit> {
        &self.unit
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    /// Share of progress credited when this node settles.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Per-unit timeout override.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("deps", &self.deps)
            .field("kind", &self.kind)
            .field("weight", &self.weight)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Validated, immutable DAG of units in declaration order.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    root: String,
    total_weight: u64,
}

impl TaskGraph {
    pub fn builder() -> TaskGraphBuilder {
        TaskGraphBuilder::default()
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn root_id(&self) -> &str {
        &self.root
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Nodes not yet scheduled whose dependencies have all settled, in
    /// declaration order.
    pub fn ready_frontier(
        &self,
        settled: &HashSet<String>,
        scheduled: &HashSet<String>,
    ) -> Vec<&GraphNode> {
        self.nodes
            .iter()
            .filter(|n| !scheduled.contains(&n.id))
            .filter(|n| n.deps.iter().all(|d| settled.contains(d)))
            .collect()
    }

    /// Percentage of total weight covered by the given settled nodes.
    pub fn progress_for(&self, settled: &HashSet<String>) -> f64 {
        let done: u64 = self
            .nodes
            .iter()
            .filter(|n| settled.contains(&n.id))
            .map(|n| u64::from(n.weight))
            .sum();
        if done >= self.total_weight {
            100.0
        } else {
            done as f64 * 100.0 / self.total_weight as f64
        }
    }

    /// Groups of unit ids that can run together, by longest dependency depth.
    pub fn execution_layers(&self) -> Vec<Vec<&str>> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut layers: Vec<Vec<&str>> = Vec::new();

        for id in self.topological_order() {
            let node = &self.nodes[self.index[id]];
            let d = node
                .deps
                .iter()
                .filter_map(|dep| depth.get(dep.as_str()))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id, d);
        }

        // Second pass keeps declaration order inside each layer.
        for node in &self.nodes {
            let d = depth[node.id.as_str()];
            if layers.len() <= d {
                layers.resize_with(d + 1, Vec::new);
            }
            layers[d].push(node.id.as_str());
        }
        layers
    }

    fn topological_order(&self) -> Vec<&str> {
        let ids: Vec<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        let deps: Vec<Vec<&str>> = self
            .nodes
            .iter()
            .map(|n| n.deps.iter().map(String::as_str).collect())
            .collect();
        kahn(&ids, &deps).0
    }
}

/// Kahn's algorithm. Returns the sorted ids and the ids left on a cycle.
fn kahn<'a>(ids: &[&'a str], deps: &[Vec<&'a str>]) -> (Vec<&'a str>, Vec<&'a str>) {
    let mut in_degree: HashMap<&str, usize> = ids.iter().map(|&id| (id, 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for (id, node_deps) in ids.iter().zip(deps) {
        for dep in node_deps {
            *in_degree.entry(*id).or_default() += 1;
            dependents.entry(*dep).or_default().push(*id);
        }
    }

    let mut queue: VecDeque<&str> = ids
        .iter()
        .copied()
        .filter(|id| in_degree[id] == 0)
        .collect();
    let mut sorted = Vec::with_capacity(ids.len());

    while let Some(id) = queue.pop_front() {
        sorted.push(id);
        if let Some(children) = dependents.get(id) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }
    }

    let placed: HashSet<&str> = sorted.iter().copied().collect();
    let remaining = ids
        .iter()
        .copied()
        .filter(|id| !placed.contains(id))
        .collect();
    (sorted, remaining)
}

struct Declaration {
    unit: Arc<dyn AnalysisUnit>,
    deps: Vec<String>,
    kind: NodeKind,
}

/// Collects unit declarations; nothing is checked until [`build`](Self::build).
#[derive(Default)]
pub struct TaskGraphBuilder {
    declarations: Vec<Declaration>,
    weights: Vec<(String, u32)>,
    timeouts: Vec<(String, Duration)>,
}

impl TaskGraphBuilder {
    /// Declare the fetch stage every dependent unit ultimately requires.
    pub fn root(mut self, unit: Arc<dyn AnalysisUnit>) -> Self {
        self.declarations.push(Declaration {
            unit,
            deps: Vec::new(),
            kind: NodeKind::Root,
        });
        self
    }

    /// Declare a unit that requires the listed units.
    pub fn unit(mut self, unit: Arc<dyn AnalysisUnit>, deps: &[&str]) -> Self {
        self.declarations.push(Declaration {
            unit,
            deps: deps.iter().map(|d| d.to_string()).collect(),
            kind: NodeKind::Dependent,
        });
        self
    }

    /// Declare a unit with no dependencies that does not need the root.
    pub fn independent(mut self, unit: Arc<dyn AnalysisUnit>) -> Self {
        self.declarations.push(Declaration {
            unit,
            deps: Vec::new(),
            kind: NodeKind::Independent,
        });
        self
    }

    /// Override the progress weight of a unit (default 1).
    pub fn weight(mut self, id: &str, weight: u32) -> Self {
        self.weights.push((id.to_string(), weight));
        self
    }

    /// Override the timeout of a unit.
    pub fn timeout(mut self, id: &str, timeout: Duration) -> Self {
        self.timeouts.push((id.to_string(), timeout));
        self
    }

    pub fn build(self) -> Result<TaskGraph, GraphError> {
        let mut index = HashMap::new();
        for (i, decl) in self.declarations.iter().enumerate() {
            let id = decl.unit.id().to_string();
            if index.insert(id.clone(), i).is_some() {
                return Err(GraphError::DuplicateNode(id));
            }
        }

        let mut roots = self
            .declarations
            .iter()
            .filter(|d| d.kind == NodeKind::Root)
            .map(|d| d.unit.id().to_string());
        let root = roots.next().ok_or(GraphError::MissingRoot)?;
        if let Some(second) = roots.next() {
            return Err(GraphError::MultipleRoots {
                first: root,
                second,
            });
        }

        for decl in &self.declarations {
            let id = decl.unit.id();
            if decl.kind == NodeKind::Dependent && decl.deps.is_empty() {
                return Err(GraphError::Orphan(id.to_string()));
            }
            for dep in &decl.deps {
                if !index.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        node: id.to_string(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut weights: HashMap<String, u32> = HashMap::new();
        for (id, weight) in self.weights {
            if !index.contains_key(&id) {
                return Err(GraphError::UnknownNode(id));
            }
            if weight == 0 {
                return Err(GraphError::ZeroWeight(id));
            }
            weights.insert(id, weight);
        }
        let mut timeouts: HashMap<String, Duration> = HashMap::new();
        for (id, timeout) in self.timeouts {
            if !index.contains_key(&id) {
                return Err(GraphError::UnknownNode(id));
            }
            timeouts.insert(id, timeout);
        }

        let ids: Vec<&str> = self.declarations.iter().map(|d| d.unit.id()).collect();
        let deps: Vec<Vec<&str>> = self
            .declarations
            .iter()
            .map(|d| d.deps.iter().map(String::as_str).collect())
            .collect();
        let (order, cyclic) = kahn(&ids, &deps);
        if !cyclic.is_empty() {
            return Err(GraphError::Cycle {
                nodes: cyclic.into_iter().map(str::to_string).collect(),
            });
        }

        // Every dependent must reach the root through at least one dependency.
        let mut rooted: HashSet<&str> = HashSet::new();
        for id in order {
            let decl = &self.declarations[index[id]];
            match decl.kind {
                NodeKind::Root => {
                    rooted.insert(id);
                }
                NodeKind::Independent => {}
                NodeKind::Dependent => {
                    if decl.deps.iter().any(|d| rooted.contains(d.as_str())) {
                        rooted.insert(id);
                    } else {
                        return Err(GraphError::Unrooted {
                            node: id.to_string(),
                            root: root.clone(),
                        });
                    }
                }
            }
        }

        let nodes: Vec<GraphNode> = self
            .declarations
            .into_iter()
            .map(|decl| {
                let id = decl.unit.id().to_string();
                GraphNode {
                    weight: weights.get(&id).copied().unwrap_or(1),
                    timeout: timeouts.get(&id).copied(),
                    unit: decl.unit,
                    deps: decl.deps,
                    kind: decl.kind,
                    id,
                }
            })
            .collect();
        let total_weight = nodes.iter().map(|n| u64::from(n.weight)).sum();

        Ok(TaskGraph {
            nodes,
            index,
            root,
            total_weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::testing::ScriptedUnit;
    use serde_json::json;

    fn unit(id: &str) -> Arc<dyn AnalysisUnit> {
        Arc::new(ScriptedUnit::ok(id, json!({})))
    }

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn diamond() -> TaskGraph {
        TaskGraph::builder()
            .root(unit("fetch"))
            .unit(unit("a"), &["fetch"])
            .unit(unit("b"), &["fetch"])
            .unit(unit("c"), &["a", "b"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_cycle_rejected_at_build() {
        let err = TaskGraph::builder()
            .root(unit("fetch"))
            .unit(unit("a"), &["fetch", "c"])
            .unit(unit("b"), &["a"])
            .unit(unit("c"), &["b"])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                nodes: vec!["a".to_string(), "b".to_string(), "c".to_string()]
            }
        );
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = TaskGraph::builder()
            .root(unit("fetch"))
            .unit(unit("a"), &["fetch", "a"])
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = TaskGraph::builder()
            .root(unit("fetch"))
            .unit(unit("a"), &["missing"])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownDependency {
                node: "a".to_string(),
                dependency: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_root_rules() {
        let missing = TaskGraph::builder().independent(unit("a")).build();
        assert_eq!(missing.unwrap_err(), GraphError::MissingRoot);

        let twice = TaskGraph::builder()
            .root(unit("fetch"))
            .root(unit("crawl"))
            .build();
        assert!(matches!(twice, Err(GraphError::MultipleRoots { .. })));

        let dup = TaskGraph::builder()
            .root(unit("fetch"))
            .unit(unit("fetch"), &["fetch"])
            .build();
        assert_eq!(dup.unwrap_err(), GraphError::DuplicateNode("fetch".to_string()));
    }

    #[test]
    fn test_orphan_and_unrooted_rejected() {
        let orphan = TaskGraph::builder()
            .root(unit("fetch"))
            .unit(unit("a"), &[])
            .build();
        assert_eq!(orphan.unwrap_err(), GraphError::Orphan("a".to_string()));

        let unrooted = TaskGraph::builder()
            .root(unit("fetch"))
            .independent(unit("side"))
            .unit(unit("a"), &["side"])
            .build();
        assert_eq!(
            unrooted.unwrap_err(),
            GraphError::Unrooted {
                node: "a".to_string(),
                root: "fetch".to_string()
            }
        );
    }

    #[test]
    fn test_weight_validation() {
        let zero = TaskGraph::builder()
            .root(unit("fetch"))
            .weight("fetch", 0)
            .build();
        assert_eq!(zero.unwrap_err(), GraphError::ZeroWeight("fetch".to_string()));

        let unknown = TaskGraph::builder()
            .root(unit("fetch"))
            .weight("nope", 2)
            .build();
        assert_eq!(unknown.unwrap_err(), GraphError::UnknownNode("nope".to_string()));
    }

    #[test]
    fn test_ready_frontier_follows_dependencies() {
        let graph = diamond();
        let ids = |nodes: Vec<&GraphNode>| -> Vec<String> {
            nodes.iter().map(|n| n.id().to_string()).collect()
        };

        assert_eq!(ids(graph.ready_frontier(&set(&[]), &set(&[]))), vec!["fetch"]);
        assert!(graph.ready_frontier(&set(&[]), &set(&["fetch"])).is_empty());
        assert_eq!(
            ids(graph.ready_frontier(&set(&["fetch"]), &set(&["fetch"]))),
            vec!["a", "b"]
        );
        // c waits for both branches
        assert!(graph
            .ready_frontier(&set(&["fetch", "a"]), &set(&["fetch", "a", "b"]))
            .is_empty());
        assert_eq!(
            ids(graph.ready_frontier(&set(&["fetch", "a", "b"]), &set(&["fetch", "a", "b"]))),
            vec!["c"]
        );
    }

    #[test]
    fn test_progress_weights_sum_to_exactly_100() {
        let graph = TaskGraph::builder()
            .root(unit("fetch"))
            .unit(unit("a"), &["fetch"])
            .unit(unit("b"), &["fetch"])
            .weight("fetch", 3)
            .build()
            .unwrap();
        assert_eq!(graph.total_weight(), 5);
        assert_eq!(graph.progress_for(&set(&["fetch"])), 60.0);
        assert_eq!(graph.progress_for(&set(&["fetch", "a", "b"])), 100.0);

        let thirds = TaskGraph::builder()
            .root(unit("fetch"))
            .unit(unit("a"), &["fetch"])
            .unit(unit("b"), &["fetch"])
            .build()
            .unwrap();
        assert_eq!(thirds.progress_for(&set(&["fetch", "a", "b"])), 100.0);
    }

    #[test]
    fn test_execution_layers() {
        let graph = diamond();
        assert_eq!(
            graph.execution_layers(),
            vec![vec!["fetch"], vec!["a", "b"], vec!["c"]]
        );
    }

    #[test]
    fn test_timeout_override() {
        let graph = TaskGraph::builder()
            .root(unit("fetch"))
            .timeout("fetch", Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(
            graph.node("fetch").and_then(GraphNode::timeout),
            Some(Duration::from_secs(5))
        );
        assert_eq!(graph.root_id(), "fetch");
        assert!(graph.node("other").is_none());
    }
}
