//! DAG Validation - compile-time graph integrity
//!
//! Validates:
//! - every edge endpoint names a declared node
//! - at least one node has no incoming edge (an execution entry point)
//!
//! Error codes:
//! - TYPHOON-020: edge references unknown node
//! - TYPHOON-021: no source node
//! - TYPHOON-022: cycle (only checked by `validate_acyclic`)

use rustc_hash::FxHashSet;

use crate::ast::Dag;
use crate::error::{Result, TyphoonError};

/// Check edge endpoints and the presence of an entry point
pub fn validate_integrity(dag: &Dag) -> Result<()> {
    for edge in dag.edges.values() {
        for (role, node) in [("source", &edge.source), ("destination", &edge.destination)] {
            if !dag.nodes.contains_key(node.as_ref()) {
                return Err(TyphoonError::UnknownNode {
                    edge: edge.name.to_string(),
                    role: role.to_string(),
                    node: node.to_string(),
                });
            }
        }
    }

    let has_incoming: FxHashSet<&str> = dag
        .edges
        .values()
        .map(|e| e.destination.as_ref())
        .collect();
    if dag.nodes.keys().all(|n| has_incoming.contains(n.as_ref())) {
        return Err(TyphoonError::NoSourceNode {
            dag: dag.name.to_string(),
        });
    }

    Ok(())
}

/// Integrity plus acyclicity, required for direct interpretation
pub fn validate_acyclic(dag: &Dag) -> Result<()> {
    validate_integrity(dag)?;
    dag.structure().detect_cycles()
}

/// Nodes with no incoming edge, in declaration order.
///
/// Unlike `Structure::sources` this includes isolated nodes, which still run
/// as entry points.
pub fn entry_nodes(dag: &Dag) -> Vec<&str> {
    let has_incoming: FxHashSet<&str> = dag
        .edges
        .values()
        .map(|e| e.destination.as_ref())
        .collect();
    dag.nodes
        .keys()
        .map(|n| n.as_ref())
        .filter(|n| !has_incoming.contains(n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_destination_is_reported_with_location() {
        let dag = Dag::from_yaml(
            r#"
name: dangling
nodes:
  a:
    function: typhoon.flow.emit
edges:
  to_ghost:
    source: a
    destination: ghost
"#,
        )
        .unwrap();
        let err = validate_integrity(&dag).unwrap_err();
        assert_eq!(err.code(), "TYPHOON-020");
        let msg = err.to_string();
        assert!(msg.contains("to_ghost"));
        assert!(msg.contains("destination"));
        assert!(msg.contains("ghost"));
    }

    #[test]
    fn graph_without_entry_point_is_rejected() {
        let dag = Dag::from_yaml(
            r#"
name: ring
nodes:
  a:
    function: typhoon.flow.echo
  b:
    function: typhoon.flow.echo
edges:
  ab:
    source: a
    destination: b
  ba:
    source: b
    destination: a
"#,
        )
        .unwrap();
        let err = validate_integrity(&dag).unwrap_err();
        assert_eq!(err.code(), "TYPHOON-021");
    }

    #[test]
    fn cycle_behind_a_source_passes_integrity_but_not_acyclic() {
        let dag = Dag::from_yaml(
            r#"
name: loop_behind_source
nodes:
  start:
    function: typhoon.flow.emit
  a:
    function: typhoon.flow.echo
  b:
    function: typhoon.flow.echo
edges:
  e0:
    source: start
    destination: a
  e1:
    source: a
    destination: b
  e2:
    source: b
    destination: a
"#,
        )
        .unwrap();
        assert!(validate_integrity(&dag).is_ok());
        assert_eq!(validate_acyclic(&dag).unwrap_err().code(), "TYPHOON-022");
    }

    #[test]
    fn isolated_nodes_are_entry_points() {
        let dag = Dag::from_yaml(
            r#"
name: isolated
nodes:
  lonely:
    function: typhoon.flow.emit
  a:
    function: typhoon.flow.emit
  b:
    function: typhoon.flow.echo
edges:
  ab:
    source: a
    destination: b
"#,
        )
        .unwrap();
        assert!(validate_integrity(&dag).is_ok());
        assert_eq!(entry_nodes(&dag), vec!["lonely", "a"]);
        let sources = dag.structure().sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(&*sources[0], "a");
    }
}
