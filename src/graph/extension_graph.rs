//! Extension graph implementation using petgraph.
//!
//! Nodes are declared packages and the names they plug into; an edge
//! `a -> b` means package `a` registers entry points in a group rooted at `b`.

use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

use crate::registry::PackageTable;

/// What a node of the extension graph stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A declared package, keyed by normalized name.
    Package,
    /// A name that is only ever extended (an entry-point group root).
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionNode {
    pub name: String,
    pub kind: NodeKind,
}

/// Directed graph of "package extends target" relationships.
///
/// # Example
///
/// ```rust
/// use bonded::graph::ExtensionGraph;
///
/// let mut graph = ExtensionGraph::new();
/// graph.add_package("pytest-cov");
/// graph.add_package("pytest");
/// graph.add_extension("pytest-cov", "pytest11");
///
/// assert_eq!(graph.targets("pytest-cov"), vec!["pytest11"]);
/// assert_eq!(graph.extenders("pytest11"), vec!["pytest-cov"]);
/// assert!(!graph.has_cycles());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExtensionGraph {
    graph: DiGraph<ExtensionNode, ()>,
    /// Maps names to their node indices for O(1) lookup
    node_indices: HashMap<String, NodeIndex>,
}

impl ExtensionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph of every declared package and its extension targets.
    pub fn from_packages(packages: &PackageTable) -> Self {
        let mut graph = Self::new();
        for package in packages.iter() {
            graph.add_package(&package.normalized_name);
        }
        for package in packages.iter() {
            for target in &package.extends {
                graph.add_extension(&package.normalized_name, target);
            }
        }
        graph
    }

    /// Adds a package node, upgrading an existing target node of the same name.
    pub fn add_package(&mut self, name: &str) -> NodeIndex {
        let idx = self.add_node(name, NodeKind::Package);
        self.graph[idx].kind = NodeKind::Package;
        idx
    }

    fn add_node(&mut self, name: &str, kind: NodeKind) -> NodeIndex {
        if let Some(&idx) = self.node_indices.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(ExtensionNode {
            name: name.to_string(),
            kind,
        });
        self.node_indices.insert(name.to_string(), idx);
        idx
    }

    /// Records that `package` extends `target`, creating the target node if
    /// needed. Duplicate edges are ignored.
    pub fn add_extension(&mut self, package: &str, target: &str) {
        let from = self.add_package(package);
        let to = self.add_node(target, NodeKind::Target);
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Names that `package` extends, sorted.
    pub fn targets(&self, package: &str) -> Vec<&str> {
        self.neighbors(package, Direction::Outgoing)
    }

    /// Packages that extend `target`, sorted.
    pub fn extenders(&self, target: &str) -> Vec<&str> {
        self.neighbors(target, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(&idx) = self.node_indices.get(name) else {
            return Vec::new();
        };
        let names: BTreeSet<&str> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].name.as_str())
            .collect();
        names.into_iter().collect()
    }

    pub fn node(&self, name: &str) -> Option<&ExtensionNode> {
        self.node_indices
            .get(name)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Every extension cycle, each as a sorted list of names.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut names: Vec<String> =
                    scc.iter().map(|&idx| self.graph[idx].name.clone()).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_indices.contains_key(name)
    }
}
