// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use petgraph::{
    Direction,
    prelude::DiGraph,
    visit::{Dfs, Topo, Walker},
};

pub use petgraph::prelude::EdgeIndex;

/// NodeIndex as employed throughout this workspace
pub type NodeIndex = petgraph::prelude::NodeIndex<u32>;

/// A directed graph over stable node values `N`, with an arbitrary edge
/// payload `E`.
///
/// Unlike a plain adjacency map, node identity is owned by the graph
/// itself: callers look nodes up by value and get back a [`NodeIndex`]
/// they can use for fast edge manipulation without re-hashing `N` on
/// every access.
#[derive(Debug, Clone)]
pub struct Dag<N, E = ()>(DiGraph<N, E, u32>);

impl<N, E> Default for Dag<N, E> {
    fn default() -> Self {
        Self(DiGraph::default())
    }
}

impl<N, E> AsRef<DiGraph<N, E, u32>> for Dag<N, E> {
    fn as_ref(&self) -> &DiGraph<N, E, u32> {
        &self.0
    }
}

impl<N, E> Dag<N, E>
where
    N: Clone + PartialEq,
{
    /// Construct a new Dag
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds node N to the graph and returns the index.
    ///
    /// If N already exists, it'll return the index of that node.
    pub fn add_node_or_get_index(&mut self, node: &N) -> NodeIndex {
        if let Some(index) = self.get_index(node) {
            index
        } else {
            self.0.add_node(node.clone())
        }
    }

    /// Returns true if the node exists
    pub fn node_exists(&self, node: &N) -> bool {
        self.get_index(node).is_some()
    }

    /// Remove node
    pub fn remove_node(&mut self, node: &N) -> Option<N> {
        if let Some(index) = self.get_index(node) {
            self.0.remove_node(index)
        } else {
            None
        }
    }

    /// Add an edge from `a` to `b` carrying `weight`, returning its index.
    ///
    /// Unlike the transaction-graph variant this does NOT refuse to
    /// create cycles: the dependency resolver builds a graph that may be
    /// cyclic and prunes it down to a DAG itself (spec §4.2 pass 3).
    pub fn add_edge(&mut self, a: NodeIndex, b: NodeIndex, weight: E) -> EdgeIndex {
        self.0.add_edge(a, b, weight)
    }

    pub fn remove_edge(&mut self, edge: EdgeIndex) -> Option<E> {
        self.0.remove_edge(edge)
    }

    pub fn edge_weight(&self, edge: EdgeIndex) -> Option<&E> {
        self.0.edge_weight(edge)
    }

    /// All outgoing `(edge index, target index, weight)` triples of `node`.
    pub fn edges_from(&self, node: NodeIndex) -> impl Iterator<Item = (EdgeIndex, NodeIndex, &E)> {
        self.0
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (e.id(), e.target(), e.weight()))
    }

    /// Every edge in the graph as `(edge index, source, target, weight)`.
    pub fn all_edges(&self) -> impl Iterator<Item = (EdgeIndex, NodeIndex, NodeIndex, &E)> {
        self.0.edge_indices().map(|e| {
            let (src, dst) = self.0.edge_endpoints(e).expect("edge index from this graph");
            (e, src, dst, self.0.edge_weight(e).expect("edge index from this graph"))
        })
    }

    pub fn in_degree(&self, node: NodeIndex) -> usize {
        self.0.edges_directed(node, Direction::Incoming).count()
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.0.node_indices()
    }

    pub fn node_weight(&self, node: NodeIndex) -> Option<&N> {
        self.0.node_weight(node)
    }

    pub fn node_count(&self) -> usize {
        self.0.node_count()
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = &'_ N> {
        self.0.node_weights()
    }

    /// Perform a depth-first search, given the start index
    pub fn dfs(&self, start: NodeIndex) -> impl Iterator<Item = &'_ N> {
        let dfs = Dfs::new(&self.0, start);

        dfs.iter(&self.0).map(|i| &self.0[i])
    }

    /// Perform a topological sort. Panic-free, but the node order is
    /// undefined if the graph still contains a cycle: callers with
    /// possibly-cyclic graphs should use a cycle-aware algorithm instead,
    /// as the dependency resolver does.
    pub fn topo(&self) -> impl Iterator<Item = &'_ N> {
        let topo = Topo::new(&self.0);

        topo.iter(&self.0).map(|i| &self.0[i])
    }

    /// Return the index for node of type N
    pub fn get_index(&self, node: &N) -> Option<NodeIndex> {
        self.0.node_indices().find(|i| self.0[*i] == *node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_find_nodes() {
        let mut graph: Dag<&str, u8> = Dag::new();

        let a = graph.add_node_or_get_index(&"a");
        let b = graph.add_node_or_get_index(&"b");
        assert_eq!(graph.add_node_or_get_index(&"a"), a);

        graph.add_edge(a, b, 1);

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.in_degree(b), 1);
        assert_eq!(graph.in_degree(a), 0);
    }

    #[test]
    fn remove_edge_by_index() {
        let mut graph: Dag<u32, u8> = Dag::new();
        let a = graph.add_node_or_get_index(&1);
        let b = graph.add_node_or_get_index(&2);
        let edge = graph.add_edge(a, b, 3);

        assert_eq!(graph.edge_weight(edge), Some(&3));
        graph.remove_edge(edge);
        assert_eq!(graph.in_degree(b), 0);
    }

    #[test]
    fn dfs_detects_reachability() {
        let mut graph: Dag<u32, ()> = Dag::new();
        let a = graph.add_node_or_get_index(&1);
        let b = graph.add_node_or_get_index(&2);
        let c = graph.add_node_or_get_index(&3);
        graph.add_edge(a, b, ());
        graph.add_edge(b, c, ());

        let reached: Vec<_> = graph.dfs(a).copied().collect();
        assert_eq!(reached, vec![1, 2, 3]);
    }
}
