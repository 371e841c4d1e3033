//! Structure - adjacency derived from a DAG's edges
//!
//! Performance notes:
//! - Arc<str> shared with the edge arena (no string copies)
//! - SmallVec for destination lists (most nodes fan out to 0-4 nodes)
//! - IndexMap keeps first-appearance order of sources
//!
//! Destination order for a source follows edge declaration order. That order
//! is the fan-out invocation order, so it is never sorted.

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::ast::Edge;
use crate::error::{Result, TyphoonError};

/// Stack-allocated destinations: most nodes have 0-4 out-edges
pub type DestVec = SmallVec<[Arc<str>; 4]>;

/// Mapping `source node → [destination nodes]`, built in one pass over edges
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Structure {
    adjacency: IndexMap<Arc<str>, DestVec>,
}

impl Structure {
    pub fn from_edges(edges: &IndexMap<Arc<str>, Edge>) -> Self {
        let mut adjacency: IndexMap<Arc<str>, DestVec> = IndexMap::new();
        for edge in edges.values() {
            adjacency
                .entry(Arc::clone(&edge.source))
                .or_default()
                .push(Arc::clone(&edge.destination));
        }
        Self { adjacency }
    }

    /// Source → destinations, in first-appearance order
    pub fn as_map(&self) -> &IndexMap<Arc<str>, DestVec> {
        &self.adjacency
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Destinations of `node` in edge declaration order
    #[inline]
    pub fn successors(&self, node: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.adjacency.get(node).map_or(EMPTY, SmallVec::as_slice)
    }

    /// Every destination, flattened, in declaration order (duplicates kept)
    pub fn destinations(&self) -> impl Iterator<Item = &Arc<str>> {
        self.adjacency.values().flat_map(|dests| dests.iter())
    }

    /// Nodes with out-edges but no in-edges
    pub fn sources(&self) -> Vec<Arc<str>> {
        let destinations: FxHashSet<&str> = self.destinations().map(|d| d.as_ref()).collect();
        self.adjacency
            .keys()
            .filter(|k| !destinations.contains(k.as_ref()))
            .cloned()
            .collect()
    }

    /// Nodes with in-edges but no out-edges, in order of first appearance
    pub fn sinks(&self) -> Vec<Arc<str>> {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        self.destinations()
            .filter(|d| !self.adjacency.contains_key(d.as_ref()))
            .filter(|&d| seen.insert(d.as_ref()))
            .cloned()
            .collect()
    }

    /// Detect cycles using DFS with three-color marking.
    ///
    /// Returns `Err(TyphoonError::CycleDetected)` with the cycle path if found.
    /// A cycle is detected when the DFS reaches a node still on its stack.
    pub fn detect_cycles(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn dfs<'a>(
            node: &'a str,
            adjacency: &'a IndexMap<Arc<str>, DestVec>,
            colors: &mut FxHashMap<&'a str, Color>,
            stack: &mut Vec<&'a str>,
        ) -> std::result::Result<(), String> {
            colors.insert(node, Color::Gray);
            stack.push(node);

            if let Some(neighbors) = adjacency.get(node) {
                for neighbor in neighbors {
                    let neighbor = neighbor.as_ref();
                    match colors.get(neighbor).copied().unwrap_or(Color::White) {
                        Color::Gray => {
                            let start = stack.iter().position(|n| *n == neighbor).unwrap_or(0);
                            return Err(format!("{} → {}", stack[start..].join(" → "), neighbor));
                        }
                        Color::White => dfs(neighbor, adjacency, colors, stack)?,
                        Color::Black => {}
                    }
                }
            }

            stack.pop();
            colors.insert(node, Color::Black);
            Ok(())
        }

        let mut colors: FxHashMap<&str, Color> = FxHashMap::default();
        let mut stack: Vec<&str> = Vec::new();
        for node in self.adjacency.keys() {
            if colors.get(node.as_ref()).is_none() {
                dfs(node.as_ref(), &self.adjacency, &mut colors, &mut stack)
                    .map_err(|cycle| TyphoonError::CycleDetected { cycle })?;
            }
        }
        Ok(())
    }
}

/// Lazy, restartable sequence of `(edge name, edge)` pairs leaving one source.
///
/// Cloning restarts from the current position; calling `edges_for` again
/// restarts from the first edge.
#[derive(Debug, Clone)]
pub struct EdgesFor<'a> {
    inner: indexmap::map::Iter<'a, Arc<str>, Edge>,
    source: &'a str,
}

impl<'a> Iterator for EdgesFor<'a> {
    type Item = (&'a str, &'a Edge);

    fn next(&mut self) -> Option<Self::Item> {
        let source = self.source;
        self.inner
            .by_ref()
            .find(|(_, edge)| &*edge.source == source)
            .map(|(name, edge)| (name.as_ref(), edge))
    }
}

/// Edges leaving `source`, in declaration order
pub fn edges_for<'a>(edges: &'a IndexMap<Arc<str>, Edge>, source: &'a str) -> EdgesFor<'a> {
    EdgesFor {
        inner: edges.iter(),
        source,
    }
}

/// The edge connecting `source` to `destination`, if any.
///
/// When several edges connect the same pair the lookup is ambiguous and fails
/// instead of silently returning the first one.
pub fn edge<'a>(
    edges: &'a IndexMap<Arc<str>, Edge>,
    source: &str,
    destination: &str,
) -> Result<Option<&'a Edge>> {
    let matches: SmallVec<[&Edge; 2]> = edges
        .values()
        .filter(|e| &*e.source == source && &*e.destination == destination)
        .collect();
    match matches.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(*single)),
        many => Err(TyphoonError::AmbiguousEdge {
            source_node: source.to_string(),
            destination: destination.to_string(),
            edges: many
                .iter()
                .map(|e| e.name.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Dag;

    fn dag(edges: &[(&str, &str, &str)]) -> Dag {
        let mut yaml = String::from("name: test\nnodes:\n");
        let mut nodes: Vec<&str> = Vec::new();
        for (_, s, d) in edges {
            for n in [*s, *d] {
                if !nodes.contains(&n) {
                    nodes.push(n);
                }
            }
        }
        for n in &nodes {
            yaml.push_str(&format!("  {n}:\n    function: typhoon.flow.echo\n"));
        }
        yaml.push_str("edges:\n");
        for (name, s, d) in edges {
            yaml.push_str(&format!(
                "  {name}:\n    source: {s}\n    destination: {d}\n"
            ));
        }
        Dag::from_yaml(&yaml).unwrap()
    }

    fn names(v: &[Arc<str>]) -> Vec<&str> {
        v.iter().map(|s| s.as_ref()).collect()
    }

    #[test]
    fn destinations_follow_declaration_order() {
        let dag = dag(&[("e1", "a", "c"), ("e2", "a", "b"), ("e3", "b", "d")]);
        let structure = dag.structure();
        assert_eq!(names(structure.successors("a")), vec!["c", "b"]);
        assert_eq!(names(structure.successors("d")), Vec::<&str>::new());
        let flat: Vec<&str> = structure.destinations().map(|d| d.as_ref()).collect();
        assert_eq!(flat, vec!["c", "b", "d"]);
    }

    #[test]
    fn sources_and_sinks() {
        let dag = dag(&[("e1", "a", "b"), ("e2", "b", "c"), ("e3", "x", "c")]);
        let structure = dag.structure();
        assert_eq!(names(&structure.sources()), vec!["a", "x"]);
        assert_eq!(names(&structure.sinks()), vec!["c"]);
    }

    #[test]
    fn edges_for_is_restartable() {
        let dag = dag(&[("e1", "a", "b"), ("e2", "x", "b"), ("e3", "a", "c"), ("e4", "a", "d")]);
        let expected = vec!["e1", "e3", "e4"];
        for _ in 0..3 {
            let got: Vec<&str> = dag.edges_for("a").map(|(name, _)| name).collect();
            assert_eq!(got, expected);
        }

        let mut iter = dag.edges_for("a");
        assert_eq!(iter.next().map(|(n, _)| n), Some("e1"));
        let resumed: Vec<&str> = iter.clone().map(|(n, _)| n).collect();
        assert_eq!(resumed, vec!["e3", "e4"]);
        assert_eq!(dag.edges_for("nobody").count(), 0);
    }

    #[test]
    fn edge_lookup() {
        let dag = dag(&[("e1", "a", "b"), ("e2", "a", "c"), ("e3", "a", "c")]);
        assert_eq!(&*dag.edge("a", "b").unwrap().unwrap().name, "e1");
        assert!(dag.edge("b", "a").unwrap().is_none());

        let err = dag.edge("a", "c").unwrap_err();
        assert_eq!(err.code(), "TYPHOON-051");
        assert!(err.to_string().contains("e2, e3"));
    }

    #[test]
    fn detect_cycle_simple() {
        let dag = dag(&[("e1", "a", "b"), ("e2", "b", "c"), ("e3", "c", "a")]);
        let err = dag.structure().detect_cycles().unwrap_err();
        assert_eq!(err.code(), "TYPHOON-022");
        assert!(err.to_string().contains("a → b → c → a"));
    }

    #[test]
    fn self_loop_is_cycle() {
        let dag = dag(&[("e1", "a", "a")]);
        assert!(dag.structure().detect_cycles().is_err());
    }

    #[test]
    fn diamond_has_no_cycle() {
        let dag = dag(&[("e1", "a", "b"), ("e2", "a", "c"), ("e3", "b", "d"), ("e4", "c", "d")]);
        let structure = dag.structure();
        assert!(structure.detect_cycles().is_ok());
        assert_eq!(names(&structure.sinks()), vec!["d"]);
    }
}
