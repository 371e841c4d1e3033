//! Python artifact emitter
//!
//! Layout of a generated module:
//!
//! ```text
//! # header (dag name, schedule)
//! imports: core, reserved aliases in use, user modules (sorted)
//! environment constants
//! dag_config = {...}
//! def <node>_node(source_data, batch_num, dag_context)   per node
//! def <edge>_edge(source_data, batch_num, dag_context)   per edge
//! def handler(event, context=None)
//! ```
//!
//! Emission only walks declaration-ordered maps and sorted sets, so the same
//! plan and target always produce the same bytes.

use super::plan::{CompiledStep, DagPlan};
use super::target::TargetEnv;
use crate::ast::{Edge, FunctionKind, Node};
use crate::dag::entry_nodes;
use crate::util::{quote_str, render, render_param, ERROR_KEY, RESERVED_NAMESPACE};

const INDENT: &str = "    ";
const CORE_ALIAS: &str = "typhoon_core";

/// Renders one planned DAG as a Python module
pub struct Emitter<'a> {
    plan: &'a DagPlan<'a>,
    target: &'a TargetEnv,
    /// Output buffer
    output: String,
}

impl<'a> Emitter<'a> {
    pub fn new(plan: &'a DagPlan<'a>, target: &'a TargetEnv) -> Self {
        Self {
            plan,
            target,
            output: String::new(),
        }
    }

    /// Emit the whole artifact
    pub fn emit(mut self) -> String {
        self.emit_header();
        self.emit_imports();
        self.emit_constants();

        let dag = self.plan.dag;
        for node in dag.nodes.values() {
            self.emit_node(node);
        }
        for edge in dag.edges.values() {
            self.emit_edge(edge);
        }
        self.emit_handler();

        // Ensure exactly one trailing newline
        self.output.truncate(self.output.trim_end().len());
        self.output.push('\n');
        self.output
    }

    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.output.push_str(INDENT);
        }
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn blank(&mut self) {
        self.output.push('\n');
    }

    /// Two blank lines before each top-level definition
    fn section(&mut self) {
        self.blank();
        self.blank();
    }

    fn emit_header(&mut self) {
        let dag = self.plan.dag;
        let schedule = dag.schedule_interval.as_deref().unwrap_or("none");
        self.line(0, &format!("# Typhoon DAG: {}", dag.name));
        self.line(0, &format!("# Schedule interval: {}", schedule));
        self.line(0, "# Generated file, edit the DAG definition instead.");
    }

    fn emit_imports(&mut self) {
        self.line(
            0,
            &format!("import {}.core as {}", RESERVED_NAMESPACE, CORE_ALIAS),
        );
        let imports = &self.plan.imports;
        let modules: Vec<String> = imports.modules.iter().map(|m| format!("import {}", m)).collect();
        let aliases: Vec<FunctionKind> = [
            (imports.reserved_functions, FunctionKind::Functions),
            (imports.reserved_transformations, FunctionKind::Transformations),
        ]
        .into_iter()
        .filter_map(|(used, kind)| used.then_some(kind))
        .collect();
        for kind in aliases {
            self.line(
                0,
                &format!(
                    "import {ns}.contrib.{kind} as {ns}_{kind}",
                    ns = RESERVED_NAMESPACE,
                    kind = kind.as_str()
                ),
            );
        }

        if !modules.is_empty() {
            self.blank();
            for module in &modules {
                self.line(0, module);
            }
        }
    }

    fn emit_constants(&mut self) {
        self.blank();
        let target = self.target;
        self.line(0, &format!("ENVIRONMENT = {}", quote_str(&target.environment)));
        self.line(
            0,
            &format!(
                "CONNECTIONS_TABLE_NAME = {}",
                quote_str(&target.connections_table_name)
            ),
        );
        self.line(
            0,
            &format!(
                "VARIABLES_TABLE_NAME = {}",
                quote_str(&target.variables_table_name)
            ),
        );
        self.line(
            0,
            &format!("LAMBDA_FUNCTION_TIMEOUT = {}", target.lambda_function_timeout),
        );

        self.blank();
        let config = serde_json::Value::Object((*self.plan.dag.config).clone());
        self.line(0, &format!("dag_config = {}", render(&config)));

        if self.plan.imports.expression_alias {
            // Steps call `typhoon.*` transformations by their unaliased name
            self.line(
                0,
                &format!(
                    "{ns} = {ns}_{kind}",
                    ns = RESERVED_NAMESPACE,
                    kind = FunctionKind::Transformations.as_str()
                ),
            );
        }
    }

    fn emit_node(&mut self, node: &Node) {
        self.section();
        self.line(
            0,
            &format!("def {}_node(source_data, batch_num, dag_context):", node.name),
        );
        let params = serde_json::Value::Object(node.config.clone());
        self.line(1, &format!("params = {}", render_param(&params)));
        self.line(
            1,
            &format!(
                "batches = {}(source_data, **params)",
                node.function.namespaced(FunctionKind::Functions)
            ),
        );

        let dag = self.plan.dag;
        let edges: Vec<&str> = dag.edges_for(&node.name).map(|(n, _)| n).collect();
        if edges.is_empty() {
            self.line(1, "for _ in batches:");
            self.line(2, "pass");
            return;
        }
        self.line(1, "for batch_num, batch in enumerate(batches, start=1):");
        for edge in edges {
            self.line(2, &format!("{}_edge(batch, batch_num, dag_context)", edge));
        }
    }

    fn emit_edge(&mut self, edge: &Edge) {
        self.section();
        self.line(
            0,
            &format!("def {}_edge(source_data, batch_num, dag_context):", edge.name),
        );
        let edge_name = quote_str(&edge.name);

        if let Some(adapter) = &edge.adapter {
            self.line(1, "try:");
            self.line(
                2,
                &format!(
                    "source_data = {}(source_data)",
                    adapter.namespaced(FunctionKind::Transformations)
                ),
            );
            self.line(1, "except Exception as e:");
            self.line(
                2,
                &format!(
                    "{}.log_error({}, {})",
                    CORE_ALIAS,
                    edge_name,
                    error_record("AdapterError: ")
                ),
            );
            self.line(2, "return");
        }

        let plan = self.plan;
        let steps: &[CompiledStep] = plan.steps_of(&edge.name);
        if steps.is_empty() {
            self.line(1, "result = source_data");
        } else {
            self.line(1, "results = []");
            for step in steps {
                // Python ends a comment at any line break, not only '\n'
                let comment = step.original.replace(|c: char| c.is_control(), " ");
                self.line(1, &format!("# {}", comment));
                self.line(1, "try:");
                self.line(2, &format!("results.append({})", step.rewritten));
                self.line(1, "except Exception as e:");
                self.line(2, &format!("results.append({})", error_record("")));
            }
            self.line(1, "result = results[-1]");
        }

        self.line(1, &format!("if {}.is_error_record(result):", CORE_ALIAS));
        self.line(2, &format!("{}.log_error({}, result)", CORE_ALIAS, edge_name));
        self.line(2, "return");

        let destination = format!("{}_node", edge.destination);
        let is_async = plan
            .dag
            .node(&edge.destination)
            .is_some_and(|n| n.asynchronous);
        if is_async {
            self.line(
                1,
                &format!(
                    "{}.dispatch_async({}, result, batch_num, dag_context)",
                    CORE_ALIAS, destination
                ),
            );
        } else {
            self.line(1, &format!("{}(result, batch_num, dag_context)", destination));
        }
    }

    fn emit_handler(&mut self) {
        self.section();
        self.line(0, "def handler(event, context=None):");
        let dag = self.plan.dag;
        self.line(
            1,
            &format!(
                "dag_context = {}.make_dag_context({}, event)",
                CORE_ALIAS,
                quote_str(&dag.name)
            ),
        );
        for node in entry_nodes(dag) {
            self.line(1, &format!("{}_node(None, 0, dag_context)", node));
        }
    }
}

/// Python literal recording the caught exception `e`
fn error_record(prefix: &str) -> String {
    format!(
        "{{{}: f'{}{{type(e).__name__}}: {{e}}'}}",
        quote_str(ERROR_KEY),
        prefix
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Dag;
    use pretty_assertions::assert_eq;

    #[test]
    fn error_record_literal() {
        assert_eq!(
            error_record(""),
            "{'__error__': f'{type(e).__name__}: {e}'}"
        );
        assert_eq!(
            error_record("AdapterError: "),
            "{'__error__': f'AdapterError: {type(e).__name__}: {e}'}"
        );
    }

    #[test]
    fn emits_full_module() {
        let dag = Dag::from_yaml(
            r#"
name: greet
schedule_interval: rate(1 hour)
config:
  suffix: '!'
nodes:
  a:
    function: typhoon.flow.emit
    config:
      value: Hi
      target: $DAG_CONFIG.suffix
  b:
    function: mylib.io.save
    asynchronous: true
edges:
  ab:
    source: a
    destination: b
    adapter: typhoon.data.identity
    transformations:
      - $SOURCE.lower()
      - $1 + $DAG_CONFIG.suffix
"#,
        )
        .unwrap();
        let plan = DagPlan::build(&dag, None).unwrap();
        let target = TargetEnv::new("test");
        let code = Emitter::new(&plan, &target).emit();

        let expected = r#"# Typhoon DAG: greet
# Schedule interval: rate(1 hour)
# Generated file, edit the DAG definition instead.
import typhoon.core as typhoon_core
import typhoon.contrib.functions as typhoon_functions
import typhoon.contrib.transformations as typhoon_transformations

import mylib.io

ENVIRONMENT = 'test'
CONNECTIONS_TABLE_NAME = 'typhoon_connections'
VARIABLES_TABLE_NAME = 'typhoon_variables'
LAMBDA_FUNCTION_TIMEOUT = 50

dag_config = {'suffix': '!'}


def a_node(source_data, batch_num, dag_context):
    params = {'value': 'Hi', 'target': dag_config['suffix']}
    batches = typhoon_functions.flow.emit(source_data, **params)
    for batch_num, batch in enumerate(batches, start=1):
        ab_edge(batch, batch_num, dag_context)


def b_node(source_data, batch_num, dag_context):
    params = {}
    batches = mylib.io.save(source_data, **params)
    for _ in batches:
        pass


def ab_edge(source_data, batch_num, dag_context):
    try:
        source_data = typhoon_transformations.data.identity(source_data)
    except Exception as e:
        typhoon_core.log_error('ab', {'__error__': f'AdapterError: {type(e).__name__}: {e}'})
        return
    results = []
    # $SOURCE.lower()
    try:
        results.append(source_data.lower())
    except Exception as e:
        results.append({'__error__': f'{type(e).__name__}: {e}'})
    # $1 + $DAG_CONFIG.suffix
    try:
        results.append(results[0] + dag_config['suffix'])
    except Exception as e:
        results.append({'__error__': f'{type(e).__name__}: {e}'})
    result = results[-1]
    if typhoon_core.is_error_record(result):
        typhoon_core.log_error('ab', result)
        return
    typhoon_core.dispatch_async(b_node, result, batch_num, dag_context)


def handler(event, context=None):
    dag_context = typhoon_core.make_dag_context('greet', event)
    a_node(None, 0, dag_context)
"#;
        assert_eq!(code, expected);
    }

    #[test]
    fn step_alias_and_passthrough_edges() {
        let dag = Dag::from_yaml(
            r#"
name: alias
nodes:
  a:
    function: mylib.src.read
  b:
    function: mylib.src.write
edges:
  plain:
    source: a
    destination: b
  json:
    source: a
    destination: b
    transformations:
      - typhoon.data.to_json($SOURCE)
"#,
        )
        .unwrap();
        let plan = DagPlan::build(&dag, None).unwrap();
        let code = Emitter::new(&plan, &TargetEnv::default()).emit();

        assert!(code.contains("# Schedule interval: none\n"));
        assert!(!code.contains("typhoon_functions"));
        assert!(code.contains("import typhoon.contrib.transformations as typhoon_transformations\n"));
        assert!(code.contains("typhoon = typhoon_transformations\n"));
        assert!(code.contains("    result = source_data\n"));
        assert!(code.contains("        plain_edge(batch, batch_num, dag_context)\n        json_edge(batch, batch_num, dag_context)\n"));
        assert!(code.contains("    b_node(result, batch_num, dag_context)\n"));
        assert!(code.ends_with("a_node(None, 0, dag_context)\n"));
    }

    #[test]
    fn step_comments_stay_on_one_line() {
        let dag = Dag::from_yaml(
            r#"
name: breaks
nodes:
  a:
    function: mylib.src.read
  b:
    function: mylib.src.write
edges:
  e:
    source: a
    destination: b
    transformations:
      - "$SOURCE +\r1"
      - "$1 *\r\n2"
"#,
        )
        .unwrap();
        let plan = DagPlan::build(&dag, None).unwrap();
        let code = Emitter::new(&plan, &TargetEnv::default()).emit();

        assert!(code.contains("    # $SOURCE + 1\n    try:\n"));
        assert!(code.contains("    # $1 *  2\n    try:\n"));
        for line in code.split('\n').filter(|l| l.trim_start().starts_with('#')) {
            assert!(!line.contains('\r'), "comment line broken by CR: {line:?}");
        }
    }
}
