//! AST Module - Graph Model parsed from YAML DAG definitions
//!
//! Contains parsed Rust types from YAML DAG definitions:
//! - `function`: FunctionRef, FunctionKind (dotted function identifiers)
//! - `dag`: Dag, Node, Edge and their raw YAML definitions
//! - `loader`: DefinitionSource implementations and bulk loading
//!
//! These types represent the "what" - static structure parsed from YAML.
//! Nodes and edges live in name-indexed arenas; adjacency is derived data
//! computed by the `dag` module, so no entity holds a back-reference.

mod dag;
mod function;
mod loader;

// Re-export all public types
pub use dag::{Dag, DagDefinition, Edge, EdgeDefinition, Entries, Node, NodeDefinition};
pub use function::{FunctionKind, FunctionRef};
pub use loader::{
    load_dag, load_dags, Definition, DefinitionSource, DirectorySource, InMemorySource, LoadReport,
    LoadedDag,
};
