//! Module collection for the artifact's import block
//!
//! Three sources of function references:
//! - node functions (`FunctionKind::Functions`)
//! - edge adapters (`FunctionKind::Transformations`)
//! - dotted calls inside transformation steps (`FunctionKind::Transformations`)
//!
//! Reserved `typhoon.*` references never become imports of their own; they
//! switch on the namespace alias of their kind instead.

use std::collections::BTreeSet;

use crate::ast::{Dag, FunctionKind, FunctionRef};
use crate::transform::{
    Expr, BATCH_NUM_BINDING, DAG_CONFIG_BINDING, DAG_CONTEXT_BINDING, RESULTS_BINDING,
    SOURCE_BINDING,
};
use crate::util::RESERVED_NAMESPACE;

/// What the artifact has to import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Imports {
    /// Some node uses a `typhoon.*` function
    pub reserved_functions: bool,
    /// Some adapter or step uses a `typhoon.*` transformation
    pub reserved_transformations: bool,
    /// Some step calls `typhoon.*` by its unaliased name
    pub expression_alias: bool,
    /// User modules, sorted
    pub modules: BTreeSet<String>,
}

impl Imports {
    /// Collect from node functions, adapters and the dotted calls of each step
    pub fn collect<'a>(dag: &Dag, step_calls: impl IntoIterator<Item = &'a str>) -> Self {
        let mut imports = Self::default();
        for node in dag.nodes.values() {
            imports.add_ref(&node.function, FunctionKind::Functions);
        }
        for adapter in dag.edges.values().filter_map(|e| e.adapter.as_ref()) {
            imports.add_ref(adapter, FunctionKind::Transformations);
        }
        for call in step_calls {
            match call.split_once('.') {
                Some((RESERVED_NAMESPACE, _)) => {
                    imports.reserved_transformations = true;
                    imports.expression_alias = true;
                }
                Some(_) => {
                    if let Some((module, _)) = call.rsplit_once('.') {
                        imports.modules.insert(module.to_string());
                    }
                }
                None => {}
            }
        }
        imports
    }

    fn add_ref(&mut self, function: &FunctionRef, kind: FunctionKind) {
        match function.external_module() {
            Some(module) => {
                self.modules.insert(module.to_string());
            }
            None => match kind {
                FunctionKind::Functions => self.reserved_functions = true,
                FunctionKind::Transformations => self.reserved_transformations = true,
            },
        }
    }
}

/// Distinct non-reserved modules of node and adapter functions, sorted
pub fn function_modules(dag: &Dag) -> BTreeSet<String> {
    Imports::collect(dag, []).modules
}

/// Dotted call paths on unbound roots (`mylib.text.slug(...)`), in source order.
///
/// Mirrors how the interpreter decides between a method call on a value and a
/// call through the function resolver.
pub fn expression_calls(expr: &Expr) -> Vec<String> {
    let mut calls = Vec::new();
    let mut bound = vec![
        SOURCE_BINDING,
        RESULTS_BINDING,
        DAG_CONFIG_BINDING,
        DAG_CONTEXT_BINDING,
        BATCH_NUM_BINDING,
    ];
    walk(expr, &mut bound, &mut calls);
    calls
}

fn walk<'e>(expr: &'e Expr, bound: &mut Vec<&'e str>, calls: &mut Vec<String>) {
    match expr {
        Expr::Literal(_) | Expr::Name(_) => {}
        Expr::List(items) => {
            for item in items {
                walk(item, bound, calls);
            }
        }
        Expr::Dict(entries) => {
            for (key, value) in entries {
                walk(key, bound, calls);
                walk(value, bound, calls);
            }
        }
        Expr::Attribute { value, .. } => walk(value, bound, calls),
        Expr::Call { func, args, kwargs } => {
            if let Expr::Attribute { value, .. } = func.as_ref() {
                let unbound = value.root_name().filter(|root| !bound.contains(root));
                if let (Some(_), Some(path)) = (unbound, func.dotted_path()) {
                    calls.push(path);
                }
            }
            walk(func, bound, calls);
            for arg in args {
                walk(arg, bound, calls);
            }
            for (_, arg) in kwargs {
                walk(arg, bound, calls);
            }
        }
        Expr::Index { value, index } => {
            walk(value, bound, calls);
            walk(index, bound, calls);
        }
        Expr::Slice {
            value,
            lower,
            upper,
            step,
        } => {
            walk(value, bound, calls);
            for part in [lower, upper, step].into_iter().flatten() {
                walk(part, bound, calls);
            }
        }
        Expr::Unary { operand, .. } => walk(operand, bound, calls),
        Expr::Binary { left, right, .. } | Expr::Bool { left, right, .. } => {
            walk(left, bound, calls);
            walk(right, bound, calls);
        }
        Expr::Compare { left, ops } => {
            walk(left, bound, calls);
            for (_, operand) in ops {
                walk(operand, bound, calls);
            }
        }
        Expr::IfElse {
            condition,
            then,
            otherwise,
        } => {
            walk(condition, bound, calls);
            walk(then, bound, calls);
            walk(otherwise, bound, calls);
        }
        Expr::ListComp {
            element,
            var,
            iter,
            condition,
        } => {
            walk(iter, bound, calls);
            bound.push(var);
            walk(element, bound, calls);
            if let Some(condition) = condition {
                walk(condition, bound, calls);
            }
            bound.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::parse;

    const DAG: &str = r#"
name: modules
nodes:
  a:
    function: typhoon.flow.emit
  b:
    function: mylib.io.load
  c:
    function: mylib.io.save
edges:
  ab:
    source: a
    destination: b
    adapter: typhoon.data.to_json
  bc:
    source: b
    destination: c
    adapter: other.adapters.rows
"#;

    #[test]
    fn reserved_modules_are_excluded() {
        let dag = Dag::from_yaml(DAG).unwrap();
        let modules: Vec<_> = function_modules(&dag).into_iter().collect();
        assert_eq!(modules, vec!["mylib.io", "other.adapters"]);

        let imports = Imports::collect(&dag, []);
        assert!(imports.reserved_functions);
        assert!(imports.reserved_transformations);
        assert!(!imports.expression_alias);
    }

    #[test]
    fn step_calls_add_modules() {
        let dag = Dag::from_yaml(DAG).unwrap();
        let imports = Imports::collect(&dag, ["text.case.snake", "typhoon.data.flatten"]);
        assert!(imports.modules.contains("text.case"));
        assert!(imports.expression_alias);
    }

    #[test]
    fn calls_skip_bound_roots_and_comprehension_vars() {
        let expr = parse("[x.upper() for x in source_data.split(',')] + mylib.fmt.rows(results[0])")
            .unwrap();
        assert_eq!(expression_calls(&expr), vec!["mylib.fmt.rows"]);

        let nested = parse("typhoon.data.to_json(dag_config.get('k', other.mod.f()))").unwrap();
        assert_eq!(
            expression_calls(&nested),
            vec!["typhoon.data.to_json", "other.mod.f"]
        );
    }
}
