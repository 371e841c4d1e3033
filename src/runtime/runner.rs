//! DAG Runner - direct interpretation of a DAG with tokio
//!
//! Execution model:
//! - every entry node (no incoming edge) is called with no input
//! - each batch a node returns fans out over its outgoing edges, in parallel
//! - per edge: adapter, then the transformation chain, then the destination
//! - asynchronous destinations are spawned and joined before `run` returns
//!
//! A failing node or edge stops only its own downstream path.

use std::sync::Arc;
use std::time::Instant;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::ast::Dag;
use crate::dag::{entry_nodes, validate_acyclic};
use crate::error::{Result, TyphoonError};
use crate::event::{EventKind, EventLog};
use crate::registry::{FunctionResolver, NodeFunction, Transform};
use crate::transform::{
    evaluate_chain, CompiledSteps, ErrorKind, EvalContext, StepError, StepOutcome,
};
use crate::util::{render, ConfigRef};

use super::context::DagContext;

/// One evaluation of one edge
#[derive(Debug, Clone)]
pub struct EdgeRun {
    pub edge: Arc<str>,
    pub source: Arc<str>,
    pub destination: Arc<str>,
    pub batch_num: u64,
    /// Final result of the chain (or the adapter failure)
    pub result: StepOutcome,
    /// Failed steps by 1-based position; 0 is the adapter
    pub failed_steps: Vec<(usize, StepError)>,
}

impl EdgeRun {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Final value, error record included
    pub fn final_value(&self) -> Value {
        match &self.result {
            Ok(value) => value.clone(),
            Err(e) => e.to_record(),
        }
    }
}

/// A node function that failed or could not be called
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    pub node: Arc<str>,
    pub batch_num: u64,
    pub error: String,
}

/// Outcome of one execution
#[derive(Debug)]
pub struct RunReport {
    pub dag: Arc<str>,
    /// Edge runs in completion order
    pub edges: Vec<EdgeRun>,
    pub node_failures: Vec<NodeFailure>,
    pub events: EventLog,
}

impl RunReport {
    pub fn runs_of<'a>(&'a self, edge: &'a str) -> impl Iterator<Item = &'a EdgeRun> {
        self.edges.iter().filter(move |run| run.edge.as_ref() == edge)
    }

    /// Final value of the first batch through `edge`
    pub fn final_value(&self, edge: &str) -> Option<Value> {
        self.runs_of(edge)
            .min_by_key(|run| run.batch_num)
            .map(EdgeRun::final_value)
    }

    pub fn is_success(&self) -> bool {
        self.node_failures.is_empty() && self.edges.iter().all(EdgeRun::is_success)
    }

    pub fn failed_edges(&self) -> impl Iterator<Item = &EdgeRun> {
        self.edges.iter().filter(|run| !run.is_success())
    }

    /// Strict view: the first failure as an error
    pub fn first_failure(&self) -> Option<TyphoonError> {
        if let Some(failure) = self.node_failures.first() {
            return Some(TyphoonError::NodeFailed {
                node: failure.node.to_string(),
                reason: failure.error.clone(),
            });
        }
        self.failed_edges().next().and_then(|run| {
            let (step, error) = run.failed_steps.last()?;
            Some(TyphoonError::TransformationStep {
                edge: run.edge.to_string(),
                step: *step,
                kind: error.kind.to_string(),
                message: error.message.clone(),
            })
        })
    }
}

/// Functions resolved once per runner
struct Resolved {
    dag: Arc<Dag>,
    nodes: FxHashMap<Arc<str>, Arc<dyn NodeFunction>>,
    adapters: FxHashMap<Arc<str>, Arc<dyn Transform>>,
    resolver: Arc<dyn FunctionResolver>,
    steps: CompiledSteps,
}

/// State of one `run` call, shared by every task it spawns
struct Execution {
    resolved: Arc<Resolved>,
    dag_config: Value,
    dag_context: Value,
    event_log: EventLog,
    edges: Mutex<Vec<EdgeRun>>,
    node_failures: Mutex<Vec<NodeFailure>>,
    spawned: Mutex<Vec<JoinHandle<()>>>,
}

/// DAG runner with event log
pub struct Runner {
    resolved: Arc<Resolved>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("dag", &self.resolved.dag.name)
            .field("nodes", &self.resolved.nodes.len())
            .field("adapters", &self.resolved.adapters.len())
            .field("steps", &self.resolved.steps.len())
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Validate the graph and resolve every node and adapter function
    pub fn new(dag: Arc<Dag>, resolver: Arc<dyn FunctionResolver>) -> Result<Self> {
        validate_acyclic(&dag)?;

        let mut nodes = FxHashMap::default();
        for node in dag.nodes.values() {
            let function = resolver.resolve_node(node.function.as_str()).ok_or_else(|| {
                TyphoonError::UnresolvedFunction {
                    location: format!("node '{}'", node.name),
                    identifier: node.function.to_string(),
                }
            })?;
            nodes.insert(Arc::clone(&node.name), function);
        }

        let mut adapters = FxHashMap::default();
        for edge in dag.edges.values() {
            let Some(adapter) = &edge.adapter else {
                continue;
            };
            let function = resolver.resolve_transform(adapter.as_str()).ok_or_else(|| {
                TyphoonError::UnresolvedFunction {
                    location: format!("edge '{}' adapter", edge.name),
                    identifier: adapter.to_string(),
                }
            })?;
            adapters.insert(Arc::clone(&edge.name), function);
        }

        let steps = CompiledSteps::from_chains(
            dag.edges.values().map(|edge| edge.transformations.as_slice()),
        );
        debug!(steps = steps.len(), "Compiled transformation steps");

        Ok(Self {
            resolved: Arc::new(Resolved {
                dag,
                nodes,
                adapters,
                resolver,
                steps,
            }),
        })
    }

    pub fn dag(&self) -> &Dag {
        &self.resolved.dag
    }

    /// Every distinct transformation step of the DAG, compiled once
    pub fn compiled_steps(&self) -> &CompiledSteps {
        &self.resolved.steps
    }

    /// Execute the DAG once
    #[instrument(skip(self, context), fields(dag = %self.resolved.dag.name))]
    pub async fn run(&self, context: DagContext) -> RunReport {
        let dag = Arc::clone(&self.resolved.dag);
        let event_log = EventLog::new();
        let sources: Vec<Arc<str>> = entry_nodes(&dag).into_iter().map(Arc::from).collect();

        event_log.emit(EventKind::DagStarted {
            dag: Arc::clone(&dag.name),
            execution_date: context.ts(),
            source_nodes: sources.clone(),
        });
        info!(sources = sources.len(), execution_date = %context.ts(), "Starting DAG execution");

        let execution = Arc::new(Execution {
            resolved: Arc::clone(&self.resolved),
            dag_config: Value::Object(dag.config.as_ref().clone()),
            dag_context: context.to_value(),
            event_log: event_log.clone(),
            edges: Mutex::new(Vec::new()),
            node_failures: Mutex::new(Vec::new()),
            spawned: Mutex::new(Vec::new()),
        });

        for source in sources {
            run_node(Arc::clone(&execution), source, None, 0).await;
        }
        join_spawned(&execution).await;

        let edges = std::mem::take(&mut *execution.edges.lock());
        let node_failures = std::mem::take(&mut *execution.node_failures.lock());
        let failed_edges = edges.iter().filter(|run| !run.is_success()).count();

        event_log.emit(EventKind::DagCompleted {
            dag: Arc::clone(&dag.name),
            edges_run: edges.len(),
            failed_edges,
            failed_nodes: node_failures.len(),
            total_duration_ms: event_log.elapsed_ms(),
        });
        info!(
            edges_run = edges.len(),
            failed_edges,
            failed_nodes = node_failures.len(),
            "DAG execution finished"
        );

        RunReport {
            dag: Arc::clone(&dag.name),
            edges,
            node_failures,
            events: event_log,
        }
    }
}

/// Spawned tasks may spawn more; drain until none are left
async fn join_spawned(execution: &Execution) {
    loop {
        let handles = std::mem::take(&mut *execution.spawned.lock());
        if handles.is_empty() {
            break;
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "asynchronous node task did not complete");
            }
        }
    }
}

impl Execution {
    fn node_failed(&self, node: &Arc<str>, batch_num: u64, error: String) {
        warn!(node = %node, error = %error, "node failed");
        self.event_log.emit(EventKind::NodeFailed {
            node: Arc::clone(node),
            error: error.clone(),
        });
        self.node_failures.lock().push(NodeFailure {
            node: Arc::clone(node),
            batch_num,
            error,
        });
    }
}

/// Substitute whole-string `$DAG_CONFIG` references in node parameters
pub fn resolve_params(
    params: &Map<String, Value>,
    dag_config: &Value,
) -> std::result::Result<Map<String, Value>, String> {
    params
        .iter()
        .map(|(key, value)| Ok((key.clone(), resolve_param(value, dag_config)?)))
        .collect()
}

fn resolve_param(value: &Value, dag_config: &Value) -> std::result::Result<Value, String> {
    match value {
        Value::String(s) => match ConfigRef::parse(s) {
            Some(ConfigRef::Whole) => Ok(dag_config.clone()),
            Some(ConfigRef::Key(key)) => dag_config
                .get(key)
                .cloned()
                .ok_or_else(|| format!("KeyError: dag config has no key {}", render(&Value::from(key)))),
            None => Ok(value.clone()),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_param(item, dag_config))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => resolve_params(map, dag_config).map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn run_node(
    execution: Arc<Execution>,
    node: Arc<str>,
    input: Option<Value>,
    batch_num: u64,
) -> BoxFuture<'static, ()> {
    async move {
        let resolved = Arc::clone(&execution.resolved);
        let (Some(definition), Some(function)) =
            (resolved.dag.node(&node), resolved.nodes.get(&node))
        else {
            execution.node_failed(&node, batch_num, "node is not defined".into());
            return;
        };

        let params = match resolve_params(&definition.config, &execution.dag_config) {
            Ok(params) => params,
            Err(e) => {
                execution.node_failed(&node, batch_num, e);
                return;
            }
        };

        execution.event_log.emit(EventKind::NodeStarted {
            node: Arc::clone(&node),
            batch_num,
        });
        debug!(node = %node, batch_num, "calling node function");

        let start = Instant::now();
        let batches = match function.call(input, &params).await {
            Ok(batches) => batches,
            Err(e) => {
                execution.node_failed(&node, batch_num, e.to_string());
                return;
            }
        };
        execution.event_log.emit(EventKind::NodeCompleted {
            node: Arc::clone(&node),
            batches: batches.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        });

        let edges: Vec<Arc<str>> = resolved
            .dag
            .edges_for(&node)
            .map(|(_, edge)| Arc::clone(&edge.name))
            .collect();
        for (index, batch) in batches.into_iter().enumerate() {
            let batch_num = index as u64 + 1;
            let runs = edges
                .iter()
                .map(|edge| run_edge(Arc::clone(&execution), Arc::clone(edge), batch.clone(), batch_num));
            join_all(runs).await;
        }
    }
    .boxed()
}

fn run_edge(
    execution: Arc<Execution>,
    edge_name: Arc<str>,
    input: Value,
    batch_num: u64,
) -> BoxFuture<'static, ()> {
    async move {
        let resolved = Arc::clone(&execution.resolved);
        let Some(edge) = resolved.dag.edges.get(&edge_name) else {
            return;
        };

        let (result, failed_steps, steps) = match resolved.adapters.get(&edge_name) {
            Some(adapter) => match adapter.call(std::slice::from_ref(&input)) {
                Ok(adapted) => evaluate(&execution, &edge.transformations, adapted, batch_num),
                Err(e) => {
                    let error = StepError::new(ErrorKind::AdapterError, e.to_string());
                    (Err(error.clone()), vec![(0, error)], 0)
                }
            },
            None => evaluate(&execution, &edge.transformations, input, batch_num),
        };

        for (step, error) in &failed_steps {
            execution.event_log.emit(EventKind::StepFailed {
                edge: Arc::clone(&edge_name),
                batch_num,
                step: *step,
                error_kind: error.kind,
                message: error.message.clone(),
            });
        }

        let run = EdgeRun {
            edge: Arc::clone(&edge_name),
            source: Arc::clone(&edge.source),
            destination: Arc::clone(&edge.destination),
            batch_num,
            result,
            failed_steps,
        };
        execution.event_log.emit(EventKind::EdgeEvaluated {
            edge: Arc::clone(&edge_name),
            batch_num,
            steps,
            output: Arc::new(run.final_value()),
            success: run.is_success(),
        });

        let next = match &run.result {
            Ok(value) => Some(value.clone()),
            Err(e) => {
                debug!(edge = %edge_name, error = %e, "edge result is an error, destination skipped");
                None
            }
        };
        execution.edges.lock().push(run);

        let Some(value) = next else {
            return;
        };
        let destination = Arc::clone(&edge.destination);
        let asynchronous = resolved
            .dag
            .node(&destination)
            .is_some_and(|node| node.asynchronous);

        if asynchronous {
            execution.event_log.emit(EventKind::AsyncDispatched {
                node: Arc::clone(&destination),
                edge: Arc::clone(&edge_name),
            });
            let handle = tokio::spawn(run_node(
                Arc::clone(&execution),
                destination,
                Some(value),
                batch_num,
            ));
            execution.spawned.lock().push(handle);
        } else {
            run_node(Arc::clone(&execution), destination, Some(value), batch_num).await;
        }
    }
    .boxed()
}

fn evaluate(
    execution: &Execution,
    chain: &[String],
    input: Value,
    batch_num: u64,
) -> (StepOutcome, Vec<(usize, StepError)>, usize) {
    let ctx = EvalContext::new(&execution.dag_config)
        .with_dag_context(&execution.dag_context)
        .with_batch_num(batch_num)
        .with_resolver(execution.resolved.resolver.as_ref())
        .with_compiled(&execution.resolved.steps);
    let outcome = evaluate_chain(chain, input, &ctx);
    let failed: Vec<(usize, StepError)> = outcome
        .failures()
        .map(|(step, error)| (step, error.clone()))
        .collect();
    let steps = outcome.steps.len();
    (outcome.into_final(), failed, steps)
}
