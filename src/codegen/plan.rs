//! Compile-time checks and step preparation
//!
//! Everything that can be known about a DAG before generating text:
//! - graph integrity (cycles are allowed in artifacts)
//! - each transformation step rewritten and parsed
//! - forward `$N` references (warned, they fail at run time)
//! - optionally, every function resolvable

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::imports::{expression_calls, Imports};
use crate::ast::{Dag, Edge};
use crate::dag::validate_integrity;
use crate::error::{Result, TyphoonError};
use crate::registry::FunctionResolver;
use crate::transform::{parse, placeholders, rewrite, Placeholder};

/// A transformation step ready to be emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStep {
    /// The step as written in the definition
    pub original: String,
    /// Placeholders replaced by their bindings
    pub rewritten: String,
    /// Dotted calls routed through the function resolver
    pub calls: Vec<String>,
}

/// A DAG checked and prepared for emission
#[derive(Debug)]
pub struct DagPlan<'a> {
    pub dag: &'a Dag,
    pub steps: FxHashMap<Arc<str>, Vec<CompiledStep>>,
    pub imports: Imports,
}

impl<'a> DagPlan<'a> {
    /// Check `dag` and prepare its steps; with a resolver, every function must resolve
    pub fn build(dag: &'a Dag, resolver: Option<&dyn FunctionResolver>) -> Result<Self> {
        validate_integrity(dag)?;

        let mut steps = FxHashMap::default();
        for edge in dag.edges.values() {
            steps.insert(edge.name.clone(), compile_edge(edge)?);
        }

        if let Some(resolver) = resolver {
            check_functions(dag, &steps, resolver)?;
        }

        let imports = Imports::collect(
            dag,
            steps
                .values()
                .flat_map(|s| s.iter())
                .flat_map(|s| s.calls.iter().map(String::as_str)),
        );
        debug!(dag = %dag.name, edges = steps.len(), modules = imports.modules.len(), "dag planned");
        Ok(Self {
            dag,
            steps,
            imports,
        })
    }

    /// Steps of `edge`, empty for an unknown edge
    pub fn steps_of(&self, edge: &str) -> &[CompiledStep] {
        self.steps.get(edge).map_or(&[], Vec::as_slice)
    }
}

fn step_location(edge: &Edge, index: usize) -> String {
    format!("edge '{}' step {}", edge.name, index + 1)
}

fn compile_edge(edge: &Edge) -> Result<Vec<CompiledStep>> {
    edge.transformations
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let invalid_placeholder = |e: crate::transform::RewriteError| {
                TyphoonError::InvalidPlaceholder {
                    location: step_location(edge, index),
                    token: e.token,
                }
            };

            for placeholder in placeholders(step).map_err(invalid_placeholder)? {
                if let Placeholder::Step(n) = placeholder {
                    if n > index {
                        warn!(
                            edge = %edge.name,
                            step = index + 1,
                            reference = n,
                            "step references a result that is not computed yet"
                        );
                    }
                }
            }

            let rewritten = rewrite(step).map_err(invalid_placeholder)?;
            let expr = parse(&rewritten).map_err(|e| TyphoonError::InvalidTransformation {
                location: step_location(edge, index),
                reason: e.to_string(),
            })?;

            Ok(CompiledStep {
                original: step.clone(),
                calls: expression_calls(&expr),
                rewritten,
            })
        })
        .collect()
}

fn check_functions(
    dag: &Dag,
    steps: &FxHashMap<Arc<str>, Vec<CompiledStep>>,
    resolver: &dyn FunctionResolver,
) -> Result<()> {
    let unresolved = |location: String, identifier: &str| TyphoonError::UnresolvedFunction {
        location,
        identifier: identifier.to_string(),
    };

    for node in dag.nodes.values() {
        if resolver.resolve_node(node.function.as_str()).is_none() {
            return Err(unresolved(
                format!("node '{}'", node.name),
                node.function.as_str(),
            ));
        }
    }
    for edge in dag.edges.values() {
        if let Some(adapter) = &edge.adapter {
            if resolver.resolve_transform(adapter.as_str()).is_none() {
                return Err(unresolved(
                    format!("edge '{}' adapter", edge.name),
                    adapter.as_str(),
                ));
            }
        }
        let compiled = steps.get(&edge.name).map_or(&[][..], Vec::as_slice);
        for (index, step) in compiled.iter().enumerate() {
            if let Some(call) = step
                .calls
                .iter()
                .find(|call| resolver.resolve_transform(call).is_none())
            {
                return Err(unresolved(step_location(edge, index), call));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FunctionRegistry;

    fn dag(steps: &str) -> Dag {
        Dag::from_yaml(&format!(
            r#"
name: plan
nodes:
  a:
    function: typhoon.flow.emit
  b:
    function: typhoon.flow.echo
edges:
  ab:
    source: a
    destination: b
    transformations: {steps}
"#
        ))
        .unwrap()
    }

    #[test]
    fn steps_are_rewritten() {
        let dag = dag("['$SOURCE.lower()', '$1 + $DAG_CONFIG.suffix']");
        let plan = DagPlan::build(&dag, None).unwrap();
        let steps = plan.steps_of("ab");
        assert_eq!(steps[0].rewritten, "source_data.lower()");
        assert_eq!(steps[1].rewritten, "results[0] + dag_config['suffix']");
        assert!(plan.steps_of("missing").is_empty());
    }

    #[test]
    fn bad_placeholder_is_located() {
        let dag = dag("['$SOURCE', '$0 + 1']");
        let err = DagPlan::build(&dag, None).unwrap_err();
        match err {
            TyphoonError::InvalidPlaceholder { location, token } => {
                assert_eq!(location, "edge 'ab' step 2");
                assert_eq!(token, "$0");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unparsable_step_is_located() {
        let dag = dag("['$SOURCE +']");
        let err = DagPlan::build(&dag, None).unwrap_err();
        assert_eq!(err.code(), "TYPHOON-015");
        assert!(err.to_string().contains("edge 'ab' step 1"));
    }

    #[test]
    fn forward_reference_still_compiles() {
        let dag = dag("['$2', '$SOURCE']");
        assert!(DagPlan::build(&dag, None).is_ok());
    }

    #[test]
    fn resolver_check_reports_step_calls() {
        let registry = FunctionRegistry::new();
        let ok = dag("['typhoon.data.to_json($SOURCE)']");
        assert!(DagPlan::build(&ok, Some(&registry)).is_ok());

        let missing = dag("['mylib.text.slug($SOURCE)']");
        let err = DagPlan::build(&missing, Some(&registry)).unwrap_err();
        assert_eq!(err.code(), "TYPHOON-030");
        assert!(err.to_string().contains("mylib.text.slug"));
    }
}
