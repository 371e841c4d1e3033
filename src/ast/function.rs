//! Function identifiers
//!
//! Nodes and adapters name their callable with a dotted path
//! (`package.module.function`). The path is opaque to the graph model:
//! resolution happens through a `FunctionResolver` at compile or run time.

use std::fmt;
use std::sync::Arc;

use crate::error::TyphoonError;
use crate::util::{is_identifier, RESERVED_NAMESPACE};

/// Role a function plays, which decides its namespace in generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Node functions (produce batches)
    Functions,
    /// Adapters and in-expression transformation calls
    Transformations,
}

impl FunctionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionKind::Functions => "functions",
            FunctionKind::Transformations => "transformations",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated dotted function identifier (at least `module.function`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionRef(Arc<str>);

impl FunctionRef {
    /// Parse and validate an identifier; `location` names the node/edge using it
    pub fn parse(location: &str, identifier: &str) -> Result<Self, TyphoonError> {
        let segments: Vec<&str> = identifier.split('.').collect();
        if segments.len() < 2 || !segments.iter().all(|s| is_identifier(s)) {
            return Err(TyphoonError::InvalidFunctionRef {
                location: location.to_string(),
                identifier: identifier.to_string(),
            });
        }
        Ok(Self(Arc::from(identifier)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owning namespace: everything before the last segment
    pub fn module(&self) -> &str {
        self.0.rsplit_once('.').map_or("", |(module, _)| module)
    }

    /// Final segment
    pub fn name(&self) -> &str {
        self.0.rsplit_once('.').map_or(&*self.0, |(_, name)| name)
    }

    /// Whether the function lives in the system's reserved namespace
    pub fn is_reserved(&self) -> bool {
        self.0.split('.').next() == Some(RESERVED_NAMESPACE)
    }

    /// Module to declare as an external dependency, `None` for reserved functions
    pub fn external_module(&self) -> Option<&str> {
        (!self.is_reserved()).then(|| self.module())
    }

    /// Path used in generated code.
    ///
    /// `typhoon.flow.emit` as a node function becomes `typhoon_functions.flow.emit`;
    /// user paths pass through unchanged.
    pub fn namespaced(&self, kind: FunctionKind) -> String {
        match self.0.strip_prefix(RESERVED_NAMESPACE) {
            Some(rest) if rest.starts_with('.') => {
                format!("{}_{}{}", RESERVED_NAMESPACE, kind.as_str(), rest)
            }
            _ => self.0.to_string(),
        }
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_paths() {
        let f = FunctionRef::parse("node 'a'", "mylib.io.read_file").unwrap();
        assert_eq!(f.module(), "mylib.io");
        assert_eq!(f.name(), "read_file");
        assert!(!f.is_reserved());
        assert_eq!(f.external_module(), Some("mylib.io"));
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", "single", "a..b", ".a.b", "a.b.", "a.2b", "a.b-c", "a b.c"] {
            let err = FunctionRef::parse("node 'a'", bad).unwrap_err();
            assert_eq!(err.code(), "TYPHOON-011", "expected rejection for {bad:?}");
        }
    }

    #[test]
    fn reserved_namespace_is_rewritten() {
        let f = FunctionRef::parse("node 'a'", "typhoon.flow.emit").unwrap();
        assert!(f.is_reserved());
        assert_eq!(f.external_module(), None);
        assert_eq!(
            f.namespaced(FunctionKind::Functions),
            "typhoon_functions.flow.emit"
        );
        assert_eq!(
            f.namespaced(FunctionKind::Transformations),
            "typhoon_transformations.flow.emit"
        );
    }

    #[test]
    fn lookalike_prefix_is_not_reserved() {
        let f = FunctionRef::parse("node 'a'", "typhoonish.flow.emit").unwrap();
        assert!(!f.is_reserved());
        assert_eq!(
            f.namespaced(FunctionKind::Functions),
            "typhoonish.flow.emit"
        );
    }
}
