// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Typhoon Error Types with Error Codes
//!
//! Error code ranges:
//! - TYPHOON-000-009: Definition parsing errors
//! - TYPHOON-010-019: Schema errors (malformed DAG/node/edge definitions)
//! - TYPHOON-020-029: Graph integrity errors
//! - TYPHOON-030-039: Function resolution errors
//! - TYPHOON-040-049: Transformation step errors (strict reporting only)
//! - TYPHOON-050-059: Ambiguous reference errors
//! - TYPHOON-060-069: Configuration errors
//! - TYPHOON-090-099: IO/serialization errors

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TyphoonError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Coarse error taxonomy used for propagation decisions.
///
/// Compile-time categories abort the affected DAG only; `TransformationStep`
/// never escapes a chain unless a caller asks for strict reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Schema,
    GraphIntegrity,
    UnresolvedFunction,
    TransformationStep,
    AmbiguousReference,
    Config,
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Schema => "SchemaError",
            ErrorCategory::GraphIntegrity => "GraphIntegrityError",
            ErrorCategory::UnresolvedFunction => "UnresolvedFunctionError",
            ErrorCategory::TransformationStep => "TransformationStepError",
            ErrorCategory::AmbiguousReference => "AmbiguousReferenceError",
            ErrorCategory::Config => "ConfigError",
            ErrorCategory::Io => "IoError",
        };
        f.write_str(name)
    }
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
pub enum TyphoonError {
    // ═══════════════════════════════════════════
    // DEFINITION PARSING (000-009)
    // ═══════════════════════════════════════════
    #[error("[TYPHOON-001] Failed to parse DAG definition '{source_id}': {details}")]
    #[diagnostic(
        code(typhoon::parse_error),
        help("Check YAML syntax: indentation and quoting")
    )]
    ParseError { source_id: String, details: String },

    // ═══════════════════════════════════════════
    // SCHEMA ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[TYPHOON-010] Invalid definition at {location}: {reason}")]
    #[diagnostic(code(typhoon::schema_error))]
    SchemaError { location: String, reason: String },

    #[error("[TYPHOON-011] Invalid function identifier '{identifier}' at {location}")]
    #[diagnostic(
        code(typhoon::invalid_function),
        help("Use a dotted path such as 'package.module.function'")
    )]
    InvalidFunctionRef { location: String, identifier: String },

    #[error("[TYPHOON-012] Duplicate {kind} name '{name}'")]
    DuplicateName { kind: String, name: String },

    #[error("[TYPHOON-013] Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: String,
        name: String,
        reason: String,
    },

    #[error("[TYPHOON-014] Malformed placeholder '{token}' at {location}")]
    #[diagnostic(
        code(typhoon::invalid_placeholder),
        help("Valid placeholders: $1.., $SOURCE, $DAG_CONFIG[.key], $DAG_CONTEXT[.key], $BATCH_NUM")
    )]
    InvalidPlaceholder { location: String, token: String },

    #[error("[TYPHOON-015] Invalid transformation at {location}: {reason}")]
    InvalidTransformation { location: String, reason: String },

    // ═══════════════════════════════════════════
    // GRAPH INTEGRITY (020-029)
    // ═══════════════════════════════════════════
    #[error("[TYPHOON-020] Edge '{edge}' {role} references unknown node '{node}'")]
    #[diagnostic(
        code(typhoon::unknown_node),
        help("Declare the node under 'nodes:' or fix the edge endpoint")
    )]
    UnknownNode {
        edge: String,
        role: String,
        node: String,
    },

    #[error("[TYPHOON-021] DAG '{dag}' has no source node (every node has an incoming edge)")]
    NoSourceNode { dag: String },

    #[error("[TYPHOON-022] Cycle detected in DAG: {cycle}")]
    CycleDetected { cycle: String },

    // ═══════════════════════════════════════════
    // FUNCTION RESOLUTION (030-039)
    // ═══════════════════════════════════════════
    #[error("[TYPHOON-030] Cannot resolve function '{identifier}' used by {location}")]
    #[diagnostic(
        code(typhoon::unresolved_function),
        help("Register the function with the FunctionRegistry before compiling or running")
    )]
    UnresolvedFunction { location: String, identifier: String },

    #[error("[TYPHOON-031] Node '{node}' failed: {reason}")]
    NodeFailed { node: String, reason: String },

    // ═══════════════════════════════════════════
    // TRANSFORMATION STEPS (040-049)
    // ═══════════════════════════════════════════
    #[error("[TYPHOON-040] Edge '{edge}' step {step} failed: {kind}: {message}")]
    TransformationStep {
        edge: String,
        step: usize,
        kind: String,
        message: String,
    },

    // ═══════════════════════════════════════════
    // AMBIGUOUS REFERENCES (050-059)
    // ═══════════════════════════════════════════
    #[error("[TYPHOON-050] Found {count} DAGs named '{name}' ({sources})")]
    #[diagnostic(
        code(typhoon::duplicate_dag),
        help("DAG names must be unique within the dags directory")
    )]
    DuplicateDag {
        name: String,
        count: usize,
        sources: String,
    },

    #[error("[TYPHOON-051] Edges {edges} all connect '{source_node}' to '{destination}'")]
    AmbiguousEdge {
        source_node: String,
        destination: String,
        edges: String,
    },

    #[error("[TYPHOON-052] DAG '{name}' not found")]
    DagNotFound { name: String },

    // ═══════════════════════════════════════════
    // CONFIG ERRORS (060-069)
    // ═══════════════════════════════════════════
    #[error("[TYPHOON-060] Config error: {reason}")]
    ConfigError { reason: String },

    #[error("[TYPHOON-061] Environment '{environment}' is not configured")]
    UnknownEnvironment { environment: String },

    // ═══════════════════════════════════════════
    // IO / SERIALIZATION (090-099)
    // ═══════════════════════════════════════════
    #[error("[TYPHOON-090] IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("[TYPHOON-091] JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("[TYPHOON-092] YAML parse error: {0}")]
    #[diagnostic(
        code(typhoon::yaml_parse),
        help("Check YAML syntax: indentation must be consistent, strings with special chars need quoting")
    )]
    YamlParse(#[from] serde_yaml::Error),
}

impl TyphoonError {
    /// Get the error code (e.g., "TYPHOON-001")
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "TYPHOON-001",
            Self::SchemaError { .. } => "TYPHOON-010",
            Self::InvalidFunctionRef { .. } => "TYPHOON-011",
            Self::DuplicateName { .. } => "TYPHOON-012",
            Self::InvalidName { .. } => "TYPHOON-013",
            Self::InvalidPlaceholder { .. } => "TYPHOON-014",
            Self::InvalidTransformation { .. } => "TYPHOON-015",
            Self::UnknownNode { .. } => "TYPHOON-020",
            Self::NoSourceNode { .. } => "TYPHOON-021",
            Self::CycleDetected { .. } => "TYPHOON-022",
            Self::UnresolvedFunction { .. } => "TYPHOON-030",
            Self::NodeFailed { .. } => "TYPHOON-031",
            Self::TransformationStep { .. } => "TYPHOON-040",
            Self::DuplicateDag { .. } => "TYPHOON-050",
            Self::AmbiguousEdge { .. } => "TYPHOON-051",
            Self::DagNotFound { .. } => "TYPHOON-052",
            Self::ConfigError { .. } => "TYPHOON-060",
            Self::UnknownEnvironment { .. } => "TYPHOON-061",
            Self::IoError(_) => "TYPHOON-090",
            Self::JsonError(_) => "TYPHOON-091",
            Self::YamlParse(_) => "TYPHOON-092",
        }
    }

    /// Taxonomy bucket of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ParseError { .. }
            | Self::SchemaError { .. }
            | Self::InvalidFunctionRef { .. }
            | Self::DuplicateName { .. }
            | Self::InvalidName { .. }
            | Self::InvalidPlaceholder { .. }
            | Self::InvalidTransformation { .. }
            | Self::YamlParse(_) => ErrorCategory::Schema,
            Self::UnknownNode { .. } | Self::NoSourceNode { .. } | Self::CycleDetected { .. } => {
                ErrorCategory::GraphIntegrity
            }
            Self::UnresolvedFunction { .. } | Self::NodeFailed { .. } => {
                ErrorCategory::UnresolvedFunction
            }
            Self::TransformationStep { .. } => ErrorCategory::TransformationStep,
            Self::DuplicateDag { .. } | Self::AmbiguousEdge { .. } | Self::DagNotFound { .. } => {
                ErrorCategory::AmbiguousReference
            }
            Self::ConfigError { .. } | Self::UnknownEnvironment { .. } => ErrorCategory::Config,
            Self::IoError(_) | Self::JsonError(_) => ErrorCategory::Io,
        }
    }

    /// Compile-time errors abort a single DAG, never a bulk build
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Schema | ErrorCategory::GraphIntegrity
        ) || matches!(self, Self::UnresolvedFunction { .. })
    }
}

impl FixSuggestion for TyphoonError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            TyphoonError::ParseError { .. } => Some("Check YAML syntax: indentation and quoting"),
            TyphoonError::SchemaError { .. } => {
                Some("Every node needs 'function'; every edge needs 'source' and 'destination'")
            }
            TyphoonError::InvalidFunctionRef { .. } => {
                Some("Use a dotted path such as 'package.module.function'")
            }
            TyphoonError::DuplicateName { .. } => Some("Node and edge names must be unique"),
            TyphoonError::InvalidName { .. } => {
                Some("Names may only contain letters, digits and '_' and cannot start with a digit")
            }
            TyphoonError::InvalidPlaceholder { .. } => Some(
                "Valid placeholders: $1.., $SOURCE, $DAG_CONFIG[.key], $DAG_CONTEXT[.key], $BATCH_NUM",
            ),
            TyphoonError::InvalidTransformation { .. } => {
                Some("Check the expression syntax of the transformation step")
            }
            TyphoonError::UnknownNode { .. } => {
                Some("Declare the node under 'nodes:' or fix the edge endpoint")
            }
            TyphoonError::NoSourceNode { .. } => {
                Some("At least one node must have no incoming edges to start execution")
            }
            TyphoonError::CycleDetected { .. } => {
                Some("Remove the cycle - direct execution needs an acyclic graph")
            }
            TyphoonError::UnresolvedFunction { .. } => {
                Some("Register the function with the FunctionRegistry before compiling or running")
            }
            TyphoonError::NodeFailed { .. } => Some("Check the node function's inputs and logs"),
            TyphoonError::TransformationStep { .. } => {
                Some("Test the chain with 'typhoon transform' to see each step's result")
            }
            TyphoonError::DuplicateDag { .. } => {
                Some("DAG names must be unique within the dags directory")
            }
            TyphoonError::AmbiguousEdge { .. } => {
                Some("Address the edge by name when several edges connect the same nodes")
            }
            TyphoonError::DagNotFound { .. } => Some("Check the DAG name and the dags directory"),
            TyphoonError::ConfigError { .. } => Some("Check typhoonconfig.toml syntax"),
            TyphoonError::UnknownEnvironment { .. } => {
                Some("Add an [environments.<name>] table to typhoonconfig.toml")
            }
            TyphoonError::IoError(_) => Some("Check file path and permissions"),
            TyphoonError::JsonError(_) => Some("Check JSON syntax"),
            TyphoonError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_code_and_display() {
        let err = TyphoonError::ParseError {
            source_id: "dags/a.yml".to_string(),
            details: "unexpected token at line 5".to_string(),
        };
        assert_eq!(err.code(), "TYPHOON-001");
        let msg = err.to_string();
        assert!(msg.contains("[TYPHOON-001]"));
        assert!(msg.contains("dags/a.yml"));
        assert_eq!(err.category(), ErrorCategory::Schema);
    }

    #[test]
    fn test_unknown_node_is_graph_integrity() {
        let err = TyphoonError::UnknownNode {
            edge: "e1".to_string(),
            role: "destination".to_string(),
            node: "ghost".to_string(),
        };
        assert_eq!(err.code(), "TYPHOON-020");
        assert_eq!(err.category(), ErrorCategory::GraphIntegrity);
        assert!(err.is_compile_time());
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_step_error_is_not_compile_time() {
        let err = TyphoonError::TransformationStep {
            edge: "e1".to_string(),
            step: 2,
            kind: "KeyError".to_string(),
            message: "'region'".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::TransformationStep);
        assert!(!err.is_compile_time());
        assert!(err.to_string().contains("step 2"));
    }

    #[test]
    fn test_ambiguous_edge_category() {
        let err = TyphoonError::AmbiguousEdge {
            source_node: "a".to_string(),
            destination: "b".to_string(),
            edges: "e1, e2".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::AmbiguousReference);
        assert_eq!(err.category().to_string(), "AmbiguousReferenceError");
    }

    #[test]
    fn test_every_error_has_fix_suggestion() {
        let err = TyphoonError::NoSourceNode {
            dag: "loop".to_string(),
        };
        let suggestion = <TyphoonError as FixSuggestion>::fix_suggestion(&err);
        assert!(suggestion.is_some());
        assert!(suggestion.unwrap().contains("incoming edges"));
    }

    #[test]
    fn test_io_error_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TyphoonError = io.into();
        assert_eq!(err.code(), "TYPHOON-090");
        assert_eq!(err.category(), ErrorCategory::Io);
    }
}
