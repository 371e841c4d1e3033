//! Typhoon - ETL DAG compiler and transformation runtime
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  ast/       YAML → Rust types (Dag, Node, Edge, FunctionRef) │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  dag/        Structure resolver (sources, sinks, cycles)     │
//! │  transform/  Placeholder rewriter and expression runtime     │
//! │  codegen/    Python artifact emitter and bulk compiler       │
//! │  runtime/    Direct interpretation with tokio fan-out        │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  registry/  Function resolution (reserved + user functions)  │
//! │  event/     Event sourcing (EventLog, EventKind)             │
//! │  util/      Literal rendering, names, constants              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`ast`] | YAML parsing → `Dag`, definition loading |
//! | [`dag`] | Adjacency structure, edge lookups, integrity checks |
//! | [`transform`] | `$` placeholders, sandboxed expressions, chains |
//! | [`codegen`] | Deterministic artifact generation, `ArtifactSink`s |
//! | [`runtime`] | `Runner`, `DagContext`, `RunReport` |
//! | [`registry`] | `FunctionResolver`, `FunctionRegistry` |
//! | [`event`] | Event sourcing for audit trail |
//! | [`config`] | `typhoonconfig.toml` and target environments |
//! | [`error`] | Error types with fix suggestions |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL - YAML → Rust types
// ═══════════════════════════════════════════════════════════════
pub mod ast;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER - Compilation and execution
// ═══════════════════════════════════════════════════════════════
pub mod codegen;
pub mod dag;
pub mod runtime;
pub mod transform;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER - Functions, events, utilities
// ═══════════════════════════════════════════════════════════════
pub mod event;
pub mod registry;
pub mod util;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING - Error handling, configuration
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

// Error types
pub use error::{ErrorCategory, Result, TyphoonError};

// Config types
pub use config::{EnvironmentConfig, TyphoonConfig};

// AST types (Domain Model)
pub use ast::{
    load_dag, load_dags, Dag, DagDefinition, DirectorySource, Edge, FunctionKind, FunctionRef,
    InMemorySource, LoadReport, Node,
};

// DAG types
pub use dag::{entry_nodes, validate_acyclic, validate_integrity, Structure};

// Transformation types
pub use transform::{
    evaluate_chain, rewrite, run_transformations, ChainOutcome, EvalContext, StepError,
    StepOutcome, TransformationRequest, TransformationResult,
};

// Codegen types
pub use codegen::{ArtifactSink, BuildReport, Compiler, FsArtifactSink, MemorySink, TargetEnv};

// Runtime types
pub use runtime::{DagContext, RunReport, Runner};

// Registry types
pub use registry::{FunctionRegistry, FunctionResolver};

// Event types
pub use event::{Event, EventKind, EventLog};
