//! Runtime Module - DAG execution by direct interpretation
//!
//! - `context`: `DagContext`, the `$DAG_CONTEXT` mapping
//! - `runner`: `Runner` with tokio fan-out and asynchronous dispatch
//!
//! This module is the "how" of execution. For static structure, see `ast`
//! and `dag`.

mod context;
mod runner;

pub use context::DagContext;
pub use runner::{resolve_params, EdgeRun, NodeFailure, RunReport, Runner};
