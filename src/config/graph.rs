//! Dependency graph between images and artifacts.
//!
//! An edge `a → b` means `a` needs `b` first: `b` is the base of `a`
//! (`fromImage`/`fromArtifact`) or a source `a` imports from.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use super::error::ConfigError;

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is on the current DFS path.
    Gray,
    /// Node and everything reachable from it are done.
    Black,
}

/// Directed graph over directive names.
///
/// Nodes keep insertion order, and edges of one node are visited in the order
/// they were added, so cycle reports are stable for a given config.
#[derive(Debug, Default)]
pub struct ImageGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl ImageGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node if it doesn't exist yet.
    pub fn add_image(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(name) {
            index
        } else {
            let index = self.graph.add_node(name.to_string());
            self.node_map.insert(name.to_string(), index);
            index
        }
    }

    /// `image` depends on `dependency`.
    pub fn add_dependency(&mut self, image: &str, dependency: &str) {
        let from = self.add_image(image);
        let to = self.add_image(dependency);
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Direct dependencies of `node` in the order they were added.
    fn ordered_neighbors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        // petgraph yields the most recent edge first.
        let mut neighbors: Vec<_> = self.graph.neighbors(node).collect();
        neighbors.reverse();
        neighbors
    }

    /// Fails with [`ConfigError::CircularDependency`] on the first cycle found,
    /// starting from nodes in declaration order.
    pub fn detect_cycles(&self) -> Result<(), ConfigError> {
        let mut colors: HashMap<NodeIndex, Color> =
            self.graph.node_indices().map(|node| (node, Color::White)).collect();
        let mut path: Vec<NodeIndex> = Vec::new();

        for node in self.graph.node_indices() {
            if colors.get(&node) != Some(&Color::White) {
                continue;
            }
            if let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path) {
                return Err(ConfigError::CircularDependency {
                    chain: cycle.into_iter().map(|idx| self.graph[idx].clone()).collect(),
                });
            }
        }

        Ok(())
    }

    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for neighbor in self.ordered_neighbors(node) {
            match colors.get(&neighbor) {
                Some(Color::Gray) => {
                    let start = path.iter().position(|n| *n == neighbor).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    /// All names with dependencies before their dependents.
    pub fn topological_order(&self) -> Result<Vec<String>, ConfigError> {
        self.detect_cycles()?;

        match toposort(&self.graph, None) {
            Ok(indices) => Ok(indices.into_iter().rev().map(|idx| self.graph[idx].clone()).collect()),
            Err(cycle) => {
                let name = self.graph[cycle.node_id()].clone();
                Err(ConfigError::CircularDependency {
                    chain: vec![name.clone(), name],
                })
            }
        }
    }

    /// Names `name` depends on directly.
    #[must_use]
    pub fn direct_dependencies(&self, name: &str) -> Vec<&str> {
        self.node_map
            .get(name)
            .map(|&idx| {
                self.ordered_neighbors(idx).into_iter().map(|n| self.graph[n].as_str()).collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}
