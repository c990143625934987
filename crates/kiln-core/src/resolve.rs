// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The Dependency Resolver: three-pass construction of a deterministic
//! build order from a weighted, qualified dependency graph.
//!
//! Line-for-line mirrors `skw_depresolver.py`, restructured onto
//! [`dag::Dag`].

use std::collections::{BTreeMap, BinaryHeap, VecDeque};

use dag::{Dag, NodeIndex};

pub const ROOT: &str = "root";

/// `b` (before, default), `a` (after), `f` (first-pass fence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Qualifier {
    Before,
    After,
    First,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub weight: u8,
    pub qualifier: Qualifier,
}

fn weight_for(class: &str) -> Option<u8> {
    match class {
        "required" => Some(1),
        "recommended" => Some(2),
        "optional" => Some(3),
        "external" => Some(4),
        "runtime" => Some(3),
        _ => None,
    }
}

/// Dependency class keys carry their qualifier as a suffix
/// (`required_first`, `required_after`); a bare class name is `before`.
fn parse_class(class: &str) -> (Qualifier, &str) {
    if let Some(base) = class.strip_suffix("_first") {
        (Qualifier::First, base)
    } else if let Some(base) = class.strip_suffix("_after") {
        (Qualifier::After, base)
    } else {
        (Qualifier::Before, class)
    }
}

/// Three-pass resolver state: warnings accumulate per instance rather than
/// in process-global state.
pub struct Resolver {
    graph: Dag<String, Edge>,
    dep_classes: BTreeMap<String, Vec<String>>,
    pub warnings: Vec<String>,
}

impl Resolver {
    /// Build the initial graph: a `root` sentinel with `before` edges
    /// (weight 1) to every requested root id, plus one edge per
    /// `(record, dependency)` pair weighted by its class.
    pub fn new(
        node_names: &[String],
        dependencies: &BTreeMap<String, BTreeMap<String, Vec<String>>>,
        root_ids: &[String],
        dep_classes: BTreeMap<String, Vec<String>>,
        aliases: &BTreeMap<String, String>,
    ) -> Self {
        let mut graph: Dag<String, Edge> = Dag::new();
        let mut warnings = Vec::new();

        let root_index = graph.add_node_or_get_index(&ROOT.to_owned());
        let mut indices = BTreeMap::new();
        indices.insert(ROOT.to_owned(), root_index);
        for name in node_names {
            indices.insert(name.clone(), graph.add_node_or_get_index(name));
        }

        for (node, deps_by_class) in dependencies {
            let Some(&src) = indices.get(node) else { continue };
            for (class, deps) in deps_by_class {
                let (qualifier, base_class) = parse_class(class);
                let Some(weight) = weight_for(base_class) else {
                    warnings.push(format!("Unknown dependency class '{class}' in {node}; skipping."));
                    continue;
                };
                for dep in deps {
                    let resolved = match aliases.get(dep) {
                        Some(alias) if alias.is_empty() => continue,
                        Some(alias) => alias.as_str(),
                        None => dep.as_str(),
                    };
                    let Some(&dst) = indices.get(resolved) else {
                        warnings.push(format!("{node} depends on unknown package '{dep}'; skipping."));
                        continue;
                    };
                    graph.add_edge(src, dst, Edge { weight, qualifier });
                }
            }
        }

        for root_id in root_ids {
            if let Some(&dst) = indices.get(root_id) {
                graph.add_edge(root_index, dst, Edge { weight: 1, qualifier: Qualifier::Before });
            } else {
                warnings.push(format!("Requested root '{root_id}' not found; skipping."));
            }
        }

        Self { graph, dep_classes, warnings }
    }

    fn max_weight_for(&self, node: &str) -> u8 {
        if node == ROOT {
            return 1;
        }
        let allowed = self.dep_classes.get(node).or_else(|| self.dep_classes.get("default"));
        match allowed {
            Some(classes) if !classes.is_empty() => {
                classes.iter().filter_map(|c| weight_for(parse_class(c).1)).max().unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Resolve the total build order; node names are returned root-excluded.
    pub fn resolve(&mut self) -> Vec<String> {
        let root = self.graph.get_index(&ROOT.to_owned()).expect("root present");
        let has_dependencies = self
            .graph
            .node_indices()
            .filter(|&idx| idx != root)
            .any(|idx| self.graph.edges_from(idx).next().is_some());

        if !has_dependencies {
            return self
                .graph
                .edges_from(self.graph.get_index(&ROOT.to_owned()).expect("root present"))
                .map(|(_, dst, _)| self.graph.node_weight(dst).cloned().unwrap_or_default())
                .collect();
        }

        let reachable = self.pass1_reachable_subgraph();
        let transformed = self.pass2_transform(&reachable);
        self.pass3_topological_sort(transformed)
    }

    fn pass1_reachable_subgraph(&self) -> Vec<NodeIndex> {
        let root = self.graph.get_index(&ROOT.to_owned()).expect("root present");
        let mut queue = VecDeque::from([root]);
        let mut reachable = vec![root];

        while let Some(node) = queue.pop_front() {
            let name = self.graph.node_weight(node).cloned().unwrap_or_default();
            let max_weight = self.max_weight_for(&name);

            for (_, dst, edge) in self.graph.edges_from(node) {
                if edge.weight <= max_weight && !reachable.contains(&dst) {
                    reachable.push(dst);
                    queue.push_back(dst);
                }
            }
        }

        reachable
    }

    /// Adjacency list keyed by node name, restricted to the reachable set,
    /// mirroring `_pass1_generate_subgraph`'s returned `subgraph` dict.
    fn adjacency(&self, reachable: &[NodeIndex]) -> BTreeMap<String, Vec<(String, u8, Qualifier)>> {
        let mut out = BTreeMap::new();
        for &idx in reachable {
            let name = self.graph.node_weight(idx).cloned().unwrap_or_default();
            let edges: Vec<_> = self
                .graph
                .edges_from(idx)
                .filter(|(_, dst, _)| reachable.contains(dst))
                .map(|(_, dst, edge)| (self.graph.node_weight(dst).cloned().unwrap_or_default(), edge.weight, edge.qualifier))
                .collect();
            out.insert(name, edges);
        }
        out
    }

    /// Pass 2: `before` edges pass through unchanged, `after` edges
    /// reverse into `before` edges (`X -a-> Y` becomes `Y -b-> X`, a plain
    /// reversal rather than a legacy `groupxx`-node indirection), and
    /// `first` edges spawn a fence node forcing every other dependency of
    /// the node to observe it.
    fn pass2_transform(&self, reachable: &[NodeIndex]) -> BTreeMap<String, Vec<(String, u8, Qualifier)>> {
        let mut out = self.adjacency(reachable);

        let mut after_edges = Vec::new();
        let mut first_map: BTreeMap<String, Vec<(String, u8)>> = BTreeMap::new();

        for (node, edges) in out.iter_mut() {
            let mut keep = Vec::new();
            for (dep, weight, qualifier) in edges.drain(..) {
                match qualifier {
                    Qualifier::After => after_edges.push((node.clone(), dep, weight)),
                    Qualifier::First => first_map.entry(node.clone()).or_default().push((dep, weight)),
                    Qualifier::Before => keep.push((dep, weight, Qualifier::Before)),
                }
            }
            *edges = keep;
        }

        for (x, y, weight) in after_edges {
            out.entry(y).or_default().push((x, weight, Qualifier::Before));
        }

        for (x, deps) in first_map {
            let fence = format!("{x}-pass1");
            out.entry(x.clone()).or_default().push((fence.clone(), 1, Qualifier::Before));

            let mut fence_targets = Vec::new();
            let mut seen: Vec<String> = Vec::new();
            for (y, weight) in deps {
                fence_targets.push((y.clone(), weight, Qualifier::Before));
                seen.push(y);
            }
            out.insert(fence.clone(), fence_targets);

            let current = out.get(&x).cloned().unwrap_or_default();
            for (dep, _, _) in current {
                if !seen.contains(&dep) && dep != fence {
                    out.entry(dep).or_default().push((fence.clone(), 1, Qualifier::Before));
                }
            }
        }

        for edges in out.values_mut() {
            let mut best: BTreeMap<String, u8> = BTreeMap::new();
            for (dst, weight, _) in edges.drain(..) {
                best.entry(dst).and_modify(|w| *w = (*w).min(weight)).or_insert(weight);
            }
            *edges = best.into_iter().map(|(dst, weight)| (dst, weight, Qualifier::Before)).collect();
            edges.sort_by(|a, b| (a.0.clone(), a.1).cmp(&(b.0.clone(), b.1)));
        }

        out
    }

    /// Pass 3: min-heap topological sort keyed by incoming
    /// edge weight, with deterministic weakest-edge cycle pruning.
    fn pass3_topological_sort(&mut self, mut graph: BTreeMap<String, Vec<(String, u8, Qualifier)>>) -> Vec<String> {
        loop {
            let mut indegree: BTreeMap<String, u32> = graph.keys().cloned().map(|k| (k, 0)).collect();
            for edges in graph.values() {
                for (dst, _, _) in edges {
                    *indegree.entry(dst.clone()).or_insert(0) += 1;
                }
            }

            let mut heap: BinaryHeap<std::cmp::Reverse<(u8, String)>> = BinaryHeap::new();
            for (node, degree) in &indegree {
                if *degree == 0 {
                    heap.push(std::cmp::Reverse((0, node.clone())));
                }
            }

            let mut order = Vec::new();
            let mut visited: Vec<String> = Vec::new();

            while let Some(std::cmp::Reverse((_, node))) = heap.pop() {
                if node != ROOT {
                    order.push(node.clone());
                }
                visited.push(node.clone());

                let mut outgoing = graph.get(&node).cloned().unwrap_or_default();
                outgoing.sort_by_key(|(_, w, _)| *w);
                for (dst, weight, _) in outgoing {
                    if let Some(degree) = indegree.get_mut(&dst) {
                        *degree -= 1;
                        if *degree == 0 {
                            heap.push(std::cmp::Reverse((weight, dst)));
                        }
                    }
                }
            }

            if visited.len() == graph.len() {
                order.reverse();
                return order;
            }

            let mut weakest: Option<(String, String, u8)> = None;
            for (src, edges) in &graph {
                for (dst, weight, _) in edges {
                    if weakest.as_ref().is_none_or(|(_, _, w)| weight > w) {
                        weakest = Some((src.clone(), dst.clone(), *weight));
                    }
                }
            }

            match weakest {
                Some((src, dst, _)) => {
                    if let Some(edges) = graph.get_mut(&src) {
                        edges.retain(|(d, _, _)| d != &dst);
                    }
                    self.warnings.push(format!("Pruned edge {src} -> {dst} to break cycle."));
                }
                None => return order,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(pairs: &[(&str, &str, &str)]) -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
        let mut out: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
        for (node, class, dep) in pairs {
            out.entry(node.to_string()).or_default().entry(class.to_string()).or_default().push(dep.to_string());
        }
        out
    }

    #[test]
    fn simple_chain_scenario_b() {
        let nodes = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        let dependencies = deps(&[("b", "required", "a"), ("c", "required", "b")]);
        let mut dep_classes = BTreeMap::new();
        dep_classes.insert("default".to_owned(), vec!["required".to_owned()]);

        let mut resolver =
            Resolver::new(&nodes, &dependencies, &["c".to_owned()], dep_classes, &BTreeMap::new());
        assert_eq!(resolver.resolve(), vec!["a", "b", "c"]);
    }

    #[test]
    fn cycle_break_scenario_c() {
        let nodes = vec!["x".to_owned(), "y".to_owned()];
        let dependencies = deps(&[("x", "optional", "y"), ("y", "required", "x")]);
        let mut dep_classes = BTreeMap::new();
        dep_classes.insert("default".to_owned(), vec!["required".to_owned(), "optional".to_owned()]);

        let mut resolver =
            Resolver::new(&nodes, &dependencies, &["x".to_owned(), "y".to_owned()], dep_classes, &BTreeMap::new());
        let order = resolver.resolve();
        assert_eq!(order, vec!["y", "x"]);
        assert!(resolver.warnings.iter().any(|w| w.contains("Pruned edge x -> y")));
    }

    #[test]
    fn first_edge_fence_from_dependency_class_suffix() {
        let nodes = vec!["binutils".to_owned(), "glibc".to_owned(), "gcc".to_owned()];
        let mut dependencies: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
        dependencies
            .entry("glibc".to_owned())
            .or_default()
            .insert("required_first".to_owned(), vec!["binutils".to_owned()]);
        dependencies.entry("gcc".to_owned()).or_default().insert("required".to_owned(), vec!["glibc".to_owned()]);

        let mut dep_classes = BTreeMap::new();
        dep_classes.insert("default".to_owned(), vec!["required".to_owned(), "required_first".to_owned()]);

        let mut resolver =
            Resolver::new(&nodes, &dependencies, &["gcc".to_owned()], dep_classes, &BTreeMap::new());
        let order = resolver.resolve();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("binutils") < pos("glibc"));
        assert!(pos("glibc") < pos("gcc"));
        assert!(order.contains(&"glibc-pass1".to_owned()));
    }

    #[test]
    fn first_edge_fence_scenario_d() {
        let nodes = vec!["binutils".to_owned(), "glibc".to_owned(), "gcc".to_owned()];
        let mut dependencies: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
        dependencies.entry("glibc".to_owned()).or_default().insert("required_first".to_owned(), vec!["binutils".to_owned()]);
        dependencies.entry("gcc".to_owned()).or_default().insert("required".to_owned(), vec!["glibc".to_owned()]);

        // required_first isn't a WEIGHT_MAP class; the resolver treats the
        // qualifier separately from the class map, so tests route it via
        // the dependencies map directly exercised by pass2's first_map path
        // (constructed below rather than through the weight-keyed class).
        let mut dep_classes = BTreeMap::new();
        dep_classes.insert("default".to_owned(), vec!["required".to_owned()]);

        let mut resolver = Resolver::new(
            &nodes,
            &BTreeMap::new(),
            &["gcc".to_owned()],
            dep_classes,
            &BTreeMap::new(),
        );

        // Build edges directly since `required_first` needs a `First`
        // qualifier, not a weight class, to reach pass2's fence logic.
        let gcc = resolver.graph.get_index(&"gcc".to_owned()).unwrap();
        let glibc = resolver.graph.get_index(&"glibc".to_owned()).unwrap();
        let binutils = resolver.graph.get_index(&"binutils".to_owned()).unwrap();
        resolver.graph.add_edge(gcc, glibc, Edge { weight: 1, qualifier: Qualifier::Before });
        resolver.graph.add_edge(glibc, binutils, Edge { weight: 1, qualifier: Qualifier::First });
        let root = resolver.graph.get_index(&ROOT.to_owned()).unwrap();
        resolver.graph.add_edge(root, gcc, Edge { weight: 1, qualifier: Qualifier::Before });

        let order = resolver.resolve();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("binutils") < pos("glibc"));
        assert!(pos("glibc") < pos("gcc"));
        assert!(order.contains(&"glibc-pass1".to_owned()));
    }
}
