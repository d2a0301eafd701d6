//! The result of a resolution pass.
//!
//! A [`DependencyGraph`] maps each artifact name to exactly one
//! [`ResolvedReference`] and keeps the provenance edges that led to it: who asked for
//! the artifact, with which selector, and at which resolved ref the asking artifact
//! was. The synthetic [`GraphNode::Root`] stands for the manifest's declarations.
//!
//! Nodes and edges are stored in a `petgraph` [`DiGraph`]; every query returns results
//! in insertion order so output is stable across runs.

use crate::manifest::ResolvedReference;
use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

/// A vertex of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GraphNode {
    /// The manifest's declarations
    Root,
    /// An artifact, by name
    Package(String),
}

impl GraphNode {
    /// The artifact name, `None` for the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Package(name) => Some(name),
        }
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Package(name) => f.write_str(name),
        }
    }
}

/// What an edge records about a request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EdgeInfo {
    requested: Option<String>,
    parent_ref: Option<String>,
}

/// A provenance edge `from → to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// The requesting node
    pub from: GraphNode,
    /// The requested artifact
    pub to: String,
    /// Selector as written by the requester (`None` = latest)
    pub requested: Option<String>,
    /// Resolved ref of the requester, `None` for the root
    pub parent_ref: Option<String>,
}

/// One request that took part in a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCandidate {
    /// Who asked
    pub parent: GraphNode,
    /// Selector they asked with
    pub requested: Option<String>,
    /// What the selector resolved to
    pub resolved: String,
}

/// A name that resolved to more than one ref in a single pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Artifact name
    pub name: String,
    /// Every distinct request for the name, in request order
    pub candidates: Vec<ConflictCandidate>,
    /// The ref that was kept
    pub winner: String,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name)?;
        for (i, candidate) in self.candidates.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}@{} (from {})", self.name, candidate.resolved, candidate.parent)?;
        }
        write!(f, "; using {}", self.winner)
    }
}

/// Resolved artifacts plus provenance.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<GraphNode, EdgeInfo>,
    node_map: HashMap<GraphNode, NodeIndex>,
    references: BTreeMap<String, ResolvedReference>,
    conflicts: Vec<Conflict>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    /// Creates a graph containing only the root.
    #[must_use]
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(GraphNode::Root);
        Self {
            graph,
            node_map: HashMap::from([(GraphNode::Root, root)]),
            references: BTreeMap::new(),
            conflicts: Vec::new(),
        }
    }

    fn ensure_node(&mut self, node: GraphNode) -> NodeIndex {
        if let Some(&index) = self.node_map.get(&node) {
            index
        } else {
            let index = self.graph.add_node(node.clone());
            self.node_map.insert(node, index);
            index
        }
    }

    /// Adds or replaces the resolved reference of a node.
    pub(crate) fn insert_reference(&mut self, reference: ResolvedReference) {
        self.ensure_node(GraphNode::Package(reference.name.clone()));
        self.references.insert(reference.name.clone(), reference);
    }

    /// Records that `from` requested `to`; identical requests are stored once.
    pub(crate) fn add_edge(
        &mut self,
        from: GraphNode,
        to: &str,
        requested: Option<String>,
        parent_ref: Option<String>,
    ) {
        let from_idx = self.ensure_node(from);
        let to_idx = self.ensure_node(GraphNode::Package(to.to_string()));
        let info = EdgeInfo {
            requested,
            parent_ref,
        };
        let duplicate = self
            .graph
            .edges_connecting(from_idx, to_idx)
            .any(|edge| *edge.weight() == info);
        if !duplicate {
            self.graph.add_edge(from_idx, to_idx, info);
        }
    }

    pub(crate) fn push_conflict(&mut self, conflict: Conflict) {
        self.conflicts.push(conflict);
    }

    /// The resolved reference of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResolvedReference> {
        self.references.get(name)
    }

    /// Whether `name` is part of the graph.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.references.contains_key(name)
    }

    /// All resolved references, ordered by name.
    pub fn references(&self) -> impl Iterator<Item = &ResolvedReference> {
        self.references.values()
    }

    /// Number of resolved artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.references.len()
    }

    /// Whether nothing was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Consumes the graph, returning the references keyed by name.
    #[must_use]
    pub fn into_references(self) -> BTreeMap<String, ResolvedReference> {
        self.references
    }

    /// Artifacts requested directly by the root, in declaration order.
    #[must_use]
    pub fn roots(&self) -> Vec<&ResolvedReference> {
        let mut seen = Vec::new();
        for edge in self.sorted_edges(self.node_map[&GraphNode::Root], Direction::Outgoing) {
            if let Some(name) = self.graph[edge.1].name()
                && !seen.contains(&name)
            {
                seen.push(name);
            }
        }
        seen.into_iter().filter_map(|name| self.references.get(name)).collect()
    }

    /// Every edge, in insertion order.
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        self.graph
            .edge_references()
            .filter_map(|edge| {
                let to = self.graph[edge.target()].name()?.to_string();
                Some(Edge {
                    from: self.graph[edge.source()].clone(),
                    to,
                    requested: edge.weight().requested.clone(),
                    parent_ref: edge.weight().parent_ref.clone(),
                })
            })
            .collect()
    }

    /// Nodes that requested `name`, in request order and without repetition.
    #[must_use]
    pub fn dependents(&self, name: &str) -> Vec<GraphNode> {
        let Some(&index) = self.node_map.get(&GraphNode::Package(name.to_string())) else {
            return Vec::new();
        };
        let mut dependents = Vec::new();
        for (_, source) in self.sorted_edges(index, Direction::Incoming) {
            let node = self.graph[source].clone();
            if !dependents.contains(&node) {
                dependents.push(node);
            }
        }
        dependents
    }

    /// Shortest provenance chain from the root to `name`, root excluded.
    ///
    /// Ties are broken by request order. `None` if `name` is not reachable.
    #[must_use]
    pub fn dependency_path(&self, name: &str) -> Option<Vec<String>> {
        let target = *self.node_map.get(&GraphNode::Package(name.to_string()))?;
        let root = self.node_map[&GraphNode::Root];

        let mut predecessor: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            if current == target {
                break;
            }
            for (_, next) in self.sorted_edges(current, Direction::Outgoing) {
                if next != root && !predecessor.contains_key(&next) {
                    predecessor.insert(next, current);
                    queue.push_back(next);
                }
            }
        }

        let mut path = Vec::new();
        let mut current = target;
        while current != root {
            path.push(self.graph[current].name()?.to_string());
            current = *predecessor.get(&current)?;
        }
        path.reverse();
        Some(path)
    }

    /// Names that resolved to several refs, with the chosen winner.
    #[must_use]
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// `(edge, neighbor)` pairs of `node` in `direction`, ordered by edge insertion.
    fn sorted_edges(&self, node: NodeIndex, direction: Direction) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(node, direction)
            .map(|edge| {
                let neighbor = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (edge.id(), neighbor)
            })
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        edges
    }
}
