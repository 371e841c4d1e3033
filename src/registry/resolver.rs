//! Function resolution
//!
//! Compiler and runtime never look functions up in ambient state: they get a
//! `FunctionResolver` injected. `FunctionRegistry` is the in-process
//! implementation, split into the reserved `typhoon.*` namespace (built-ins,
//! pre-registered) and the user namespace (registered at runtime).

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::ast::FunctionRef;
use crate::error::{Result, TyphoonError};
use crate::util::RESERVED_NAMESPACE;

use super::builtin;
use super::function::{CallError, FnNode, FnTransform, NodeFunction, Transform};

/// Capability to turn dotted identifiers into callables
pub trait FunctionResolver: Send + Sync {
    fn resolve_node(&self, path: &str) -> Option<Arc<dyn NodeFunction>>;

    fn resolve_transform(&self, path: &str) -> Option<Arc<dyn Transform>>;
}

/// Namespace of a function identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// `typhoon.*`: built into the system
    Reserved,
    User,
}

impl Namespace {
    pub fn of(path: &str) -> Self {
        match path.split_once('.') {
            Some((root, _)) if root == RESERVED_NAMESPACE => Namespace::Reserved,
            _ => Namespace::User,
        }
    }
}

/// In-process registry of node and transformation functions
pub struct FunctionRegistry {
    nodes: DashMap<String, Arc<dyn NodeFunction>>,
    transforms: DashMap<String, Arc<dyn Transform>>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes: Vec<String> = self.nodes.iter().map(|e| e.key().clone()).collect();
        let mut transforms: Vec<String> =
            self.transforms.iter().map(|e| e.key().clone()).collect();
        nodes.sort();
        transforms.sort();
        f.debug_struct("FunctionRegistry")
            .field("nodes", &nodes)
            .field("transforms", &transforms)
            .finish()
    }
}

impl FunctionRegistry {
    /// Registry with the reserved namespace pre-registered
    pub fn new() -> Self {
        let registry = Self::empty();
        builtin::install(&registry);
        registry
    }

    /// Registry without any function, not even the reserved ones
    pub fn empty() -> Self {
        Self {
            nodes: DashMap::new(),
            transforms: DashMap::new(),
        }
    }

    fn check_user_path(path: &str) -> Result<()> {
        FunctionRef::parse("function registry", path)?;
        if Namespace::of(path) == Namespace::Reserved {
            return Err(TyphoonError::ConfigError {
                reason: format!(
                    "cannot register '{}': the '{}' namespace is reserved",
                    path, RESERVED_NAMESPACE
                ),
            });
        }
        Ok(())
    }

    pub(super) fn insert_node(&self, path: &str, function: Arc<dyn NodeFunction>) {
        debug!(function = path, "Registered node function");
        self.nodes.insert(path.to_string(), function);
    }

    pub(super) fn insert_transform(&self, path: &str, function: Arc<dyn Transform>) {
        debug!(function = path, "Registered transformation");
        self.transforms.insert(path.to_string(), function);
    }

    /// Register a user node function; re-registering replaces it
    pub fn register_node(&self, path: &str, function: impl NodeFunction + 'static) -> Result<()> {
        Self::check_user_path(path)?;
        self.insert_node(path, Arc::new(function));
        Ok(())
    }

    /// Register a closure as a user node function
    pub fn register_node_fn<F>(&self, path: &str, function: F) -> Result<()>
    where
        F: Fn(Option<Value>, &Map<String, Value>) -> std::result::Result<Vec<Value>, CallError>
            + Send
            + Sync
            + 'static,
    {
        self.register_node(path, FnNode(function))
    }

    /// Register a user transformation function; re-registering replaces it
    pub fn register_transform(&self, path: &str, function: impl Transform + 'static) -> Result<()> {
        Self::check_user_path(path)?;
        self.insert_transform(path, Arc::new(function));
        Ok(())
    }

    /// Register a closure as a user transformation function
    pub fn register_transform_fn<F>(&self, path: &str, function: F) -> Result<()>
    where
        F: Fn(&[Value]) -> std::result::Result<Value, CallError> + Send + Sync + 'static,
    {
        self.register_transform(path, FnTransform(function))
    }

    pub fn has_node(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn has_transform(&self, path: &str) -> bool {
        self.transforms.contains_key(path)
    }
}

impl FunctionResolver for FunctionRegistry {
    fn resolve_node(&self, path: &str) -> Option<Arc<dyn NodeFunction>> {
        self.nodes.get(path).map(|entry| Arc::clone(entry.value()))
    }

    fn resolve_transform(&self, path: &str) -> Option<Arc<dyn Transform>> {
        self.transforms.get(path).map(|entry| Arc::clone(entry.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn namespace_by_prefix() {
        assert_eq!(Namespace::of("typhoon.flow.emit"), Namespace::Reserved);
        assert_eq!(Namespace::of("typhoonish.flow.emit"), Namespace::User);
        assert_eq!(Namespace::of("mylib.io.read"), Namespace::User);
    }

    #[test]
    fn reserved_functions_are_preinstalled() {
        let registry = FunctionRegistry::new();
        assert!(registry.has_node("typhoon.flow.emit"));
        assert!(registry.has_transform("typhoon.data.to_json"));
        assert!(!FunctionRegistry::empty().has_node("typhoon.flow.emit"));
    }

    #[test]
    fn user_closures_resolve() {
        let registry = FunctionRegistry::new();
        registry
            .register_transform_fn("mylib.text.shout", |args| {
                let s = args.first().and_then(Value::as_str).unwrap_or_default();
                Ok(json!(format!("{}!", s.to_uppercase())))
            })
            .unwrap();
        let shout = registry.resolve_transform("mylib.text.shout").unwrap();
        assert_eq!(shout.call(&[json!("hey")]).unwrap(), json!("HEY!"));
        assert!(registry.resolve_transform("mylib.text.missing").is_none());
    }

    #[test]
    fn reserved_namespace_rejects_user_registration() {
        let registry = FunctionRegistry::new();
        let err = registry
            .register_transform_fn("typhoon.data.mine", |_| Ok(Value::Null))
            .unwrap_err();
        assert_eq!(err.code(), "TYPHOON-060");
        let err = registry
            .register_node_fn("nodots", |_, _| Ok(vec![]))
            .unwrap_err();
        assert_eq!(err.code(), "TYPHOON-011");
    }
}
