//! Definition loading
//!
//! A `DefinitionSource` yields `(source id, YAML text)` pairs; the loader
//! doesn't care whether they came from a directory, a database or a request
//! body. Bulk loading never stops at the first bad definition: each failure is
//! recorded against its source id and the remaining definitions still load.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, TyphoonError};
use crate::util::DAG_FILE_EXTENSIONS;

use super::dag::{parse_definition, Dag};

/// One raw definition text with the identifier of where it came from
#[derive(Debug, Clone)]
pub struct Definition {
    pub source_id: String,
    pub text: String,
}

/// Provider of raw DAG definitions
pub trait DefinitionSource {
    fn definitions(&self) -> Result<Vec<Definition>>;
}

/// All `*.yml` / `*.yaml` files below a directory, in sorted path order
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_definition_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DAG_FILE_EXTENSIONS.contains(&ext))
}

impl DefinitionSource for DirectorySource {
    fn definitions(&self) -> Result<Vec<Definition>> {
        if !self.root.is_dir() {
            return Err(TyphoonError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("dags directory '{}' does not exist", self.root.display()),
            )));
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && is_definition_file(entry.path()))
            .map(|entry| entry.into_path())
            .collect();
        paths.sort();

        let mut definitions = Vec::with_capacity(paths.len());
        for path in paths {
            let text = std::fs::read_to_string(&path)?;
            definitions.push(Definition {
                source_id: path.display().to_string(),
                text,
            });
        }
        Ok(definitions)
    }
}

/// Definitions held in memory (request bodies, tests)
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    entries: Vec<Definition>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.push(source_id, text);
        self
    }

    pub fn push(&mut self, source_id: impl Into<String>, text: impl Into<String>) {
        self.entries.push(Definition {
            source_id: source_id.into(),
            text: text.into(),
        });
    }
}

impl DefinitionSource for InMemorySource {
    fn definitions(&self) -> Result<Vec<Definition>> {
        Ok(self.entries.clone())
    }
}

/// A successfully loaded DAG and where it came from
#[derive(Debug, Clone)]
pub struct LoadedDag {
    pub dag: Dag,
    pub source_id: String,
}

/// Result of loading every definition of a source
#[derive(Debug, Default)]
pub struct LoadReport {
    pub dags: Vec<LoadedDag>,
    /// Per-source failures: `(source id, error)`
    pub errors: Vec<(String, TyphoonError)>,
}

impl LoadReport {
    /// The unique DAG with this name.
    ///
    /// Several DAGs sharing the name is an ambiguity, not "first wins".
    pub fn find(&self, name: &str) -> Result<&LoadedDag> {
        let mut matches = self.dags.iter().filter(|l| &*l.dag.name == name);
        let first = matches.next().ok_or_else(|| TyphoonError::DagNotFound {
            name: name.to_string(),
        })?;
        let rest: Vec<&LoadedDag> = matches.collect();
        if rest.is_empty() {
            return Ok(first);
        }
        let sources: Vec<&str> = std::iter::once(first)
            .chain(rest.iter().copied())
            .map(|l| l.source_id.as_str())
            .collect();
        Err(TyphoonError::DuplicateDag {
            name: name.to_string(),
            count: sources.len(),
            sources: sources.join(", "),
        })
    }

    /// DAGs flagged `active`
    pub fn active(&self) -> impl Iterator<Item = &LoadedDag> {
        self.dags.iter().filter(|l| l.dag.active)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Load every definition of `source`, collecting per-definition errors
pub fn load_dags(source: &dyn DefinitionSource) -> Result<LoadReport> {
    let mut report = LoadReport::default();
    for definition in source.definitions()? {
        match parse_definition(&definition.text, &definition.source_id)
            .and_then(|def| def.make_dag())
        {
            Ok(dag) => {
                debug!(dag = %dag.name, source = %definition.source_id, "Loaded DAG");
                report.dags.push(LoadedDag {
                    dag,
                    source_id: definition.source_id,
                });
            }
            Err(e) => {
                warn!(source = %definition.source_id, error = %e, "Skipping invalid DAG definition");
                report.errors.push((definition.source_id, e));
            }
        }
    }
    Ok(report)
}

/// Load the single DAG called `name` from `source`
pub fn load_dag(source: &dyn DefinitionSource, name: &str) -> Result<Dag> {
    let report = load_dags(source)?;
    report.find(name).map(|loaded| loaded.dag.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dag_yaml(name: &str) -> String {
        format!(
            r#"
name: {name}
active: true
nodes:
  a:
    function: typhoon.flow.emit
"#
        )
    }

    #[test]
    fn bad_definitions_do_not_stop_bulk_load() {
        let source = InMemorySource::new()
            .with("one", dag_yaml("first"))
            .with("two", "name: broken\nnodes:\n  a: {}\n")
            .with("three", dag_yaml("third"));

        let report = load_dags(&source).unwrap();
        assert_eq!(report.dags.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "two");
        assert!(report.find("third").is_ok());
    }

    #[test]
    fn duplicate_names_are_ambiguous() {
        let source = InMemorySource::new()
            .with("x.yml", dag_yaml("same"))
            .with("y.yml", dag_yaml("same"));

        let err = load_dag(&source, "same").unwrap_err();
        assert_eq!(err.code(), "TYPHOON-050");
        assert!(err.to_string().contains("x.yml"));
        assert!(err.to_string().contains("y.yml"));
    }

    #[test]
    fn missing_dag_is_not_found() {
        let source = InMemorySource::new().with("x.yml", dag_yaml("present"));
        let err = load_dag(&source, "absent").unwrap_err();
        assert_eq!(err.code(), "TYPHOON-052");
    }

    #[test]
    fn directory_source_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.yml"), dag_yaml("b")).unwrap();
        std::fs::write(dir.path().join("nested/c.yaml"), dag_yaml("c")).unwrap();
        std::fs::write(dir.path().join("a.yml"), dag_yaml("a")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a dag").unwrap();

        let source = DirectorySource::new(dir.path());
        let report = load_dags(&source).unwrap();
        let names: Vec<&str> = report.dags.iter().map(|l| &*l.dag.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(!report.has_errors());
    }

    #[test]
    fn missing_directory_is_io_error() {
        let source = DirectorySource::new("/definitely/not/here");
        let err = load_dags(&source).unwrap_err();
        assert_eq!(err.code(), "TYPHOON-090");
    }
}
