//! Transform Module - the transformation expression language
//!
//! - `rewrite`: `$` placeholders to evaluable references
//! - `lexer` / `parser`: sandboxed Python-subset grammar
//! - `eval` / `builtins` / `value`: interpreter with Python semantics over JSON values
//! - `chain`: per-edge chain evaluation with per-step error containment
//! - `tester`: interactive preview of parameter chains

mod builtins;
mod chain;
mod error;
mod eval;
mod lexer;
mod parser;
mod rewrite;
mod tester;
mod value;

pub use chain::{
    compile_step, evaluate_chain, run_transformations, ChainEvaluation, ChainOutcome, ChainState,
    CompiledSteps, EvalContext, StepOutcome, TransformationResult,
};
pub use error::{as_error_record, is_error_record, ErrorKind, StepError};
pub use eval::{Interpreter, Scope};
pub use parser::{parse, BinOp, BoolOp, CmpOp, Expr, UnaryOp};
pub use rewrite::{
    placeholders, rewrite, Placeholder, RewriteError, BATCH_NUM_BINDING, DAG_CONFIG_BINDING,
    DAG_CONTEXT_BINDING, RESULTS_BINDING, SOURCE_BINDING,
};
pub use tester::{ContextRequest, ParamRequest, TransformationRequest};
pub use value::{py_str, truthy, type_name};
