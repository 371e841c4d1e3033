//! DAG Types - the Graph Model
//!
//! Contains the core YAML-parsed types:
//! - `DagDefinition`: raw definition as written in YAML
//! - `Dag`: validated DAG with name-indexed node and edge arenas
//! - `Node`: named callable unit
//! - `Edge`: directed connection carrying an adapter and a transformation chain
//!
//! ```yaml
//! name: example
//! active: true
//! config:
//!   region: eu-west-1
//! nodes:
//!   list_files:
//!     function: typhoon.flow.emit
//!     config:
//!       items: [a.csv, b.csv]
//!   load:
//!     function: mylib.io.load
//!     asynchronous: true
//! edges:
//!   files_to_load:
//!     source: list_files
//!     destination: load
//!     transformations:
//!       - $SOURCE.upper()
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::dag::{EdgesFor, Structure};
use crate::error::{Result, TyphoonError};
use crate::util::validate_name;

use super::function::FunctionRef;

// ═══════════════════════════════════════════════════════════════
// RAW DEFINITIONS (YAML)
// ═══════════════════════════════════════════════════════════════

/// Name-keyed entries in declaration order.
///
/// Unlike a map, duplicate keys are kept so they can be reported instead of
/// silently overwriting each other.
#[derive(Debug, Clone)]
pub struct Entries<T>(Vec<(String, T)>);

impl<T> Default for Entries<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> Entries<T> {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> FromIterator<(String, T)> for Entries<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for Entries<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Entries<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = Entries<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of names to definitions")
            }

            fn visit_unit<E>(self) -> std::result::Result<Self::Value, E> {
                Ok(Entries::default())
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, T>()? {
                    entries.push((key, value));
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_any(EntriesVisitor(PhantomData))
    }
}

/// DAG definition as parsed from YAML (raw)
#[derive(Debug, Clone, Deserialize)]
pub struct DagDefinition {
    pub name: String,
    #[serde(default)]
    pub schedule_interval: Option<String>,
    /// Inactive DAGs are loaded but never built
    #[serde(default)]
    pub active: bool,
    /// DAG-level configuration exposed as `$DAG_CONFIG`
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
    pub nodes: Entries<NodeDefinition>,
    #[serde(default)]
    pub edges: Entries<EdgeDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDefinition {
    pub function: String,
    #[serde(default, alias = "async")]
    pub asynchronous: bool,
    /// Literal parameters passed to the function
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeDefinition {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub adapter: Option<String>,
    #[serde(default)]
    pub transformations: Vec<String>,
}

impl DagDefinition {
    /// Validate names and function identifiers and build the [`Dag`].
    ///
    /// Endpoint existence is NOT checked here: that is a compile-time
    /// integrity check (`dag::validate_integrity`).
    pub fn make_dag(self) -> Result<Dag> {
        validate_name("DAG", &self.name)?;

        let mut nodes: IndexMap<Arc<str>, Node> = IndexMap::with_capacity(self.nodes.len());
        for (name, def) in self.nodes {
            validate_name("node", &name)?;
            let function = FunctionRef::parse(&format!("node '{}'", name), &def.function)?;
            let name: Arc<str> = Arc::from(name);
            if nodes.contains_key(&name) {
                return Err(TyphoonError::DuplicateName {
                    kind: "node".to_string(),
                    name: name.to_string(),
                });
            }
            nodes.insert(
                Arc::clone(&name),
                Node {
                    name,
                    function,
                    asynchronous: def.asynchronous,
                    config: def.config.unwrap_or_default(),
                },
            );
        }

        let mut edges: IndexMap<Arc<str>, Edge> = IndexMap::with_capacity(self.edges.len());
        for (name, def) in self.edges {
            validate_name("edge", &name)?;
            let adapter = def
                .adapter
                .as_deref()
                .map(|a| FunctionRef::parse(&format!("edge '{}' adapter", name), a))
                .transpose()?;
            let name: Arc<str> = Arc::from(name);
            if edges.contains_key(&name) {
                return Err(TyphoonError::DuplicateName {
                    kind: "edge".to_string(),
                    name: name.to_string(),
                });
            }
            // Reuse the node's Arc when the endpoint exists
            let source = endpoint(&nodes, &def.source);
            let destination = endpoint(&nodes, &def.destination);
            edges.insert(
                Arc::clone(&name),
                Edge {
                    name,
                    source,
                    destination,
                    adapter,
                    transformations: def.transformations,
                },
            );
        }

        Ok(Dag {
            name: Arc::from(self.name),
            schedule_interval: self.schedule_interval,
            active: self.active,
            config: Arc::new(self.config.unwrap_or_default()),
            nodes,
            edges,
        })
    }
}

fn endpoint(nodes: &IndexMap<Arc<str>, Node>, name: &str) -> Arc<str> {
    nodes
        .get_key_value(name)
        .map_or_else(|| Arc::from(name), |(k, _)| Arc::clone(k))
}

// ═══════════════════════════════════════════════════════════════
// GRAPH MODEL
// ═══════════════════════════════════════════════════════════════

/// Named callable unit
#[derive(Debug, Clone)]
pub struct Node {
    pub name: Arc<str>,
    pub function: FunctionRef,
    /// Fire-and-forget dispatch instead of awaited invocation
    pub asynchronous: bool,
    pub config: Map<String, Value>,
}

/// Directed connection `source → destination`
#[derive(Debug, Clone)]
pub struct Edge {
    pub name: Arc<str>,
    pub source: Arc<str>,
    pub destination: Arc<str>,
    pub adapter: Option<FunctionRef>,
    /// Ordered expressions evaluated against the edge input
    pub transformations: Vec<String>,
}

/// Validated DAG. Identity is the name.
#[derive(Debug, Clone)]
pub struct Dag {
    pub name: Arc<str>,
    pub schedule_interval: Option<String>,
    pub active: bool,
    pub config: Arc<Map<String, Value>>,
    pub nodes: IndexMap<Arc<str>, Node>,
    pub edges: IndexMap<Arc<str>, Edge>,
}

impl Dag {
    /// Parse and validate a single YAML definition
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        parse_definition(yaml, "<inline>")?.make_dag()
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Adjacency derived from the edges (recomputed on every call)
    pub fn structure(&self) -> Structure {
        Structure::from_edges(&self.edges)
    }

    /// Edges leaving `source`, in declaration order
    pub fn edges_for<'a>(&'a self, source: &'a str) -> EdgesFor<'a> {
        crate::dag::edges_for(&self.edges, source)
    }

    /// The single edge connecting `source` to `destination`.
    ///
    /// Fails with an ambiguity error when several edges connect the pair.
    pub fn edge(&self, source: &str, destination: &str) -> Result<Option<&Edge>> {
        crate::dag::edge(&self.edges, source, destination)
    }

    /// Node names in declaration order
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|k| k.as_ref())
    }

    /// Set of all function identifiers used by nodes and adapters
    pub fn function_paths(&self) -> FxHashSet<&str> {
        self.nodes
            .values()
            .map(|n| n.function.as_str())
            .chain(
                self.edges
                    .values()
                    .filter_map(|e| e.adapter.as_ref().map(FunctionRef::as_str)),
            )
            .collect()
    }
}

impl PartialEq for Dag {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Dag {}

impl Hash for Dag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Parse YAML text into a raw definition.
///
/// Invalid YAML is a parse error; valid YAML with missing or mistyped
/// fields is a schema error.
pub(crate) fn parse_definition(yaml: &str, source_id: &str) -> Result<DagDefinition> {
    serde_yaml::from_str::<DagDefinition>(yaml).map_err(|e| {
        match serde_yaml::from_str::<serde_yaml::Value>(yaml) {
            Err(syntax) => TyphoonError::ParseError {
                source_id: source_id.to_string(),
                details: syntax.to_string(),
            },
            Ok(_) => TyphoonError::SchemaError {
                location: source_id.to_string(),
                reason: e.to_string(),
            },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
name: example
active: true
config:
  region: eu-west-1
nodes:
  a:
    function: typhoon.flow.emit
    config:
      items: [1, 2]
  b:
    function: mylib.sink.write
    async: true
edges:
  a_to_b:
    source: a
    destination: b
    adapter: typhoon.data.identity
    transformations:
      - $SOURCE + 1
"#;

    #[test]
    fn parse_example() {
        let dag = Dag::from_yaml(EXAMPLE).unwrap();
        assert_eq!(&*dag.name, "example");
        assert!(dag.active);
        assert_eq!(dag.config["region"], "eu-west-1");
        assert_eq!(dag.nodes.len(), 2);
        assert!(dag.node("b").unwrap().asynchronous);
        let edge = &dag.edges["a_to_b"];
        assert_eq!(&*edge.source, "a");
        assert_eq!(&*edge.destination, "b");
        assert_eq!(edge.adapter.as_ref().unwrap().as_str(), "typhoon.data.identity");
        assert_eq!(edge.transformations, vec!["$SOURCE + 1"]);
    }

    #[test]
    fn active_defaults_to_false() {
        let dag = Dag::from_yaml(
            r#"
name: idle
nodes:
  a:
    function: typhoon.flow.emit
"#,
        )
        .unwrap();
        assert!(!dag.active);
        assert!(dag.edges.is_empty());
        assert!(dag.config.is_empty());
    }

    #[test]
    fn missing_function_is_schema_error() {
        let err = Dag::from_yaml(
            r#"
name: broken
nodes:
  a:
    asynchronous: true
"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "TYPHOON-010");
        assert!(err.to_string().contains("function"));
    }

    #[test]
    fn invalid_yaml_is_parse_error() {
        let err = Dag::from_yaml("name: [unclosed").unwrap_err();
        assert_eq!(err.code(), "TYPHOON-001");
    }

    #[test]
    fn duplicate_node_names_are_rejected() {
        let err = Dag::from_yaml(
            r#"
name: dupes
nodes:
  a:
    function: typhoon.flow.emit
  a:
    function: typhoon.flow.echo
"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "TYPHOON-012");
    }

    #[test]
    fn malformed_function_is_rejected() {
        let err = Dag::from_yaml(
            r#"
name: bad_fn
nodes:
  a:
    function: not_dotted
"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "TYPHOON-011");
        assert!(err.to_string().contains("node 'a'"));
    }

    #[test]
    fn unknown_endpoint_is_not_checked_at_parse_time() {
        let dag = Dag::from_yaml(
            r#"
name: dangling
nodes:
  a:
    function: typhoon.flow.emit
edges:
  e1:
    source: a
    destination: ghost
"#,
        )
        .unwrap();
        assert_eq!(&*dag.edges["e1"].destination, "ghost");
    }

    #[test]
    fn dag_identity_is_name() {
        let a = Dag::from_yaml(EXAMPLE).unwrap();
        let mut b = a.clone();
        b.active = false;
        assert_eq!(a, b);
    }
}
