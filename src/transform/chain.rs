//! Transformation chain evaluation
//!
//! A chain is evaluated step by step in declared order. Every step produces a
//! [`StepOutcome`]; a failed step is recorded and the chain moves on, with
//! later steps seeing the failure as an error record through `$N`.
//!
//! ```text
//! Pending ──advance──▶ Running { step: 0 } ──advance──▶ ... ──advance──▶ Done
//! ```

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::error::{ErrorKind, StepError};
use super::eval::{Interpreter, Scope};
use super::parser::{parse, Expr};
use super::rewrite::rewrite;
use crate::registry::FunctionResolver;
use crate::util::render;

pub type StepOutcome = Result<Value, StepError>;

static NONE: Value = Value::Null;

/// Rewrite and parse one chain entry
pub fn compile_step(step: &str) -> Result<Arc<Expr>, StepError> {
    let rewritten =
        rewrite(step).map_err(|e| StepError::new(ErrorKind::PlaceholderError, e.to_string()))?;
    Ok(Arc::new(parse(&rewritten)?))
}

/// Chain entries compiled ahead of time, keyed by their source text.
///
/// Owned by whoever owns the chains (a runner compiles every edge of its DAG
/// once), so the table never outgrows the steps it was built from. Steps
/// missing from the table are compiled on the spot and not retained.
#[derive(Debug, Default)]
pub struct CompiledSteps {
    steps: FxHashMap<String, Result<Arc<Expr>, StepError>>,
}

impl CompiledSteps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chains<'s>(chains: impl IntoIterator<Item = &'s [String]>) -> Self {
        let mut compiled = Self::new();
        for chain in chains {
            for step in chain {
                compiled.insert(step);
            }
        }
        compiled
    }

    pub fn insert(&mut self, step: &str) {
        if !self.steps.contains_key(step) {
            self.steps.insert(step.to_string(), compile_step(step));
        }
    }

    /// Compiled form of `step`, compiling it now when it was never inserted
    pub fn get(&self, step: &str) -> Result<Arc<Expr>, StepError> {
        match self.steps.get(step) {
            Some(compiled) => compiled.clone(),
            None => compile_step(step),
        }
    }

    pub fn contains(&self, step: &str) -> bool {
        self.steps.contains_key(step)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Read-only context shared by every chain of an execution
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub dag_config: &'a Value,
    pub dag_context: &'a Value,
    pub batch_num: u64,
    pub resolver: Option<&'a dyn FunctionResolver>,
    pub compiled: Option<&'a CompiledSteps>,
}

impl<'a> EvalContext<'a> {
    pub fn new(dag_config: &'a Value) -> Self {
        Self {
            dag_config,
            dag_context: &NONE,
            batch_num: 1,
            resolver: None,
            compiled: None,
        }
    }

    pub fn with_dag_context(mut self, dag_context: &'a Value) -> Self {
        self.dag_context = dag_context;
        self
    }

    pub fn with_batch_num(mut self, batch_num: u64) -> Self {
        self.batch_num = batch_num;
        self
    }

    pub fn with_resolver(mut self, resolver: &'a dyn FunctionResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_compiled(mut self, compiled: &'a CompiledSteps) -> Self {
        self.compiled = Some(compiled);
        self
    }
}

/// Position of a [`ChainEvaluation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Pending,
    /// `step` is the 0-based index of the next step to evaluate
    Running { step: usize },
    Done,
}

/// Step-wise evaluation of one chain against one input
pub struct ChainEvaluation<'c> {
    chain: &'c [String],
    input: Value,
    /// What `$N` sees: values, with failures as error records
    visible: Vec<Value>,
    steps: Vec<StepOutcome>,
    state: ChainState,
}

impl<'c> ChainEvaluation<'c> {
    pub fn new(chain: &'c [String], input: Value) -> Self {
        Self {
            chain,
            input,
            visible: Vec::with_capacity(chain.len()),
            steps: Vec::with_capacity(chain.len()),
            state: ChainState::Pending,
        }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Evaluate the next step; a no-op once `Done`
    pub fn advance(&mut self, ctx: &EvalContext<'_>) -> ChainState {
        if self.state == ChainState::Done {
            return self.state;
        }
        let index = self.steps.len();
        if let Some(step) = self.chain.get(index) {
            let outcome = self.evaluate_step(step, ctx);
            if let Err(e) = &outcome {
                debug!(step = index + 1, error = %e, "transformation step failed");
            }
            self.visible.push(match &outcome {
                Ok(value) => value.clone(),
                Err(e) => e.to_record(),
            });
            self.steps.push(outcome);
        }
        self.state = if self.steps.len() < self.chain.len() {
            ChainState::Running {
                step: self.steps.len(),
            }
        } else {
            ChainState::Done
        };
        self.state
    }

    fn evaluate_step(&self, step: &str, ctx: &EvalContext<'_>) -> StepOutcome {
        let expr = match ctx.compiled {
            Some(compiled) => compiled.get(step)?,
            None => compile_step(step)?,
        };
        let scope = Scope {
            source: &self.input,
            results: &self.visible,
            dag_config: ctx.dag_config,
            dag_context: ctx.dag_context,
            batch_num: ctx.batch_num,
        };
        let mut interpreter = Interpreter::new(scope);
        if let Some(resolver) = ctx.resolver {
            interpreter = interpreter.with_resolver(resolver);
        }
        interpreter.evaluate(&expr)
    }

    /// Run to completion
    pub fn run(mut self, ctx: &EvalContext<'_>) -> ChainOutcome {
        while self.advance(ctx) != ChainState::Done {}
        ChainOutcome {
            input: self.input,
            steps: self.steps,
        }
    }
}

/// Every step outcome of a finished chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub input: Value,
    pub steps: Vec<StepOutcome>,
}

impl ChainOutcome {
    /// Last step's outcome; the input for an empty chain
    pub fn final_outcome(&self) -> Result<&Value, &StepError> {
        match self.steps.last() {
            None => Ok(&self.input),
            Some(outcome) => outcome.as_ref(),
        }
    }

    /// Last step's value, or its error record
    pub fn final_value(&self) -> Value {
        match self.final_outcome() {
            Ok(value) => value.clone(),
            Err(e) => e.to_record(),
        }
    }

    pub fn into_final(mut self) -> StepOutcome {
        self.steps.pop().unwrap_or(Ok(self.input))
    }

    pub fn is_success(&self) -> bool {
        self.final_outcome().is_ok()
    }

    /// Failed steps with their 1-based position
    pub fn failures(&self) -> impl Iterator<Item = (usize, &StepError)> {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(i, outcome)| outcome.as_ref().err().map(|e| (i + 1, e)))
    }
}

/// Evaluate `chain` against `input`
pub fn evaluate_chain(chain: &[String], input: Value, ctx: &EvalContext<'_>) -> ChainOutcome {
    ChainEvaluation::new(chain, input).run(ctx)
}

/// Final value of a chain, error record included
pub fn run_transformations(source: Value, dag_config: &Value, chain: &[String]) -> Value {
    evaluate_chain(chain, source, &EvalContext::new(dag_config)).final_value()
}

/// Outcome of one chain as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TransformationResult {
    Success {
        value: Value,
        rendered: String,
    },
    Failure {
        config_item: String,
        error_kind: ErrorKind,
        message: String,
    },
}

impl TransformationResult {
    pub fn from_outcome(config_item: &str, outcome: &ChainOutcome) -> Self {
        match outcome.final_outcome() {
            Ok(value) => TransformationResult::Success {
                value: value.clone(),
                rendered: render(value),
            },
            Err(e) => TransformationResult::Failure {
                config_item: config_item.to_string(),
                error_kind: e.kind,
                message: e.message.clone(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransformationResult::Success { .. })
    }
}
