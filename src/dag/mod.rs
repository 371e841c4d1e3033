//! DAG Module - structure resolution and graph integrity
//!
//! Contains the derived graph views and compile-time checks:
//! - `structure`: adjacency (`Structure`), `edges_for`, `edge`
//! - `validate`: endpoint existence, entry points, acyclicity
//!
//! Everything here is pure: adjacency is recomputed from the edge arena on
//! demand and never stored on the DAG.

mod structure;
mod validate;

pub use structure::{edge, edges_for, DestVec, EdgesFor, Structure};
pub use validate::{entry_nodes, validate_acyclic, validate_integrity};
