//! Utilities shared by the compiler and the runtime
//!
//! - `constants`: reserved namespace, error-record key, defaults
//! - `literal`: Python-style literal rendering
//! - `names`: identifier validation for DAG, node and edge names

pub mod constants;
pub mod literal;
mod names;

pub use constants::*;
pub use literal::{quote_str, render, render_param, ConfigRef};
pub use names::{is_identifier, validate_name};
