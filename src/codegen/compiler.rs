//! Compiler - DAG definitions to artifacts on a sink
//!
//! `build_all` compiles every active DAG of a load report. A failing DAG is
//! recorded in the `BuildReport` and the others still build. Artifacts whose
//! contents match what the sink already holds are not rewritten.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info, instrument, warn};
use xxhash_rust::xxh3::xxh3_64;

use super::emitter::Emitter;
use super::plan::DagPlan;
use super::target::TargetEnv;
use crate::ast::{Dag, LoadReport};
use crate::error::{Result, TyphoonError};
use crate::registry::FunctionResolver;
use crate::util::ARTIFACT_EXTENSION;

// ═══════════════════════════════════════════════════════════════
// SINKS
// ═══════════════════════════════════════════════════════════════

/// Destination of generated artifacts, addressed by relative path
pub trait ArtifactSink: Send + Sync {
    /// Current content at `path`, if any
    fn read(&self, path: &Path) -> Option<String>;

    fn write(&self, path: &Path, contents: &str) -> Result<()>;
}

/// Writes artifacts under a root directory
#[derive(Debug, Clone)]
pub struct FsArtifactSink {
    root: PathBuf,
}

impl FsArtifactSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactSink for FsArtifactSink {
    fn read(&self, path: &Path) -> Option<String> {
        fs::read_to_string(self.root.join(path)).ok()
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, contents)?;
        Ok(())
    }
}

/// In-memory sink, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemorySink {
    files: RwLock<BTreeMap<PathBuf, String>>,
    writes: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.read().get(path.as_ref()).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.read().keys().cloned().collect()
    }

    /// Number of `write` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl ArtifactSink for MemorySink {
    fn read(&self, path: &Path) -> Option<String> {
        self.get(path)
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        self.files
            .write()
            .insert(path.to_path_buf(), contents.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
// REPORT
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    Written,
    Unchanged,
}

/// One generated artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub dag: String,
    pub path: PathBuf,
    /// xxh3 of the contents
    pub hash: u64,
    pub status: ArtifactStatus,
}

/// Outcome of a bulk build
#[derive(Debug, Default)]
pub struct BuildReport {
    pub artifacts: Vec<Artifact>,
    /// Names of DAGs skipped because they are not active
    pub inactive: Vec<String>,
    /// (DAG name or source id, error)
    pub errors: Vec<(String, TyphoonError)>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn written(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts
            .iter()
            .filter(|a| a.status == ArtifactStatus::Written)
    }

    pub fn unchanged(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts
            .iter()
            .filter(|a| a.status == ArtifactStatus::Unchanged)
    }

    pub fn error_for(&self, name: &str) -> Option<&TyphoonError> {
        self.errors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, error)| error)
    }
}

// ═══════════════════════════════════════════════════════════════
// COMPILER
// ═══════════════════════════════════════════════════════════════

/// Artifact path of a DAG, relative to the sink
pub fn artifact_path(dag_name: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", dag_name, ARTIFACT_EXTENSION))
}

pub struct Compiler {
    target: TargetEnv,
    resolver: Option<Arc<dyn FunctionResolver>>,
}

impl Compiler {
    pub fn new(target: TargetEnv) -> Self {
        Self {
            target,
            resolver: None,
        }
    }

    /// Require every function to resolve at compile time
    pub fn with_resolver(mut self, resolver: Arc<dyn FunctionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn target(&self) -> &TargetEnv {
        &self.target
    }

    /// Generate the artifact text of one DAG
    pub fn compile(&self, dag: &Dag) -> Result<String> {
        let plan = DagPlan::build(dag, self.resolver.as_deref())?;
        Ok(Emitter::new(&plan, &self.target).emit())
    }

    /// Compile one DAG and write it unless the sink already holds the same bytes
    pub fn build(&self, dag: &Dag, sink: &dyn ArtifactSink) -> Result<Artifact> {
        let code = self.compile(dag)?;
        let path = artifact_path(&dag.name);
        let hash = xxh3_64(code.as_bytes());

        let unchanged = sink.read(&path).is_some_and(|existing| existing == code);
        let status = if unchanged {
            debug!(dag = %dag.name, path = %path.display(), "artifact unchanged");
            ArtifactStatus::Unchanged
        } else {
            sink.write(&path, &code)?;
            info!(dag = %dag.name, path = %path.display(), bytes = code.len(), "artifact written");
            ArtifactStatus::Written
        };

        Ok(Artifact {
            dag: dag.name.to_string(),
            path,
            hash,
            status,
        })
    }

    /// Build every active DAG of `loaded`.
    ///
    /// Duplicate names and per-DAG failures land in the report; definitions
    /// that failed to load are already listed in `loaded.errors`.
    #[instrument(skip_all, fields(environment = %self.target.environment))]
    pub fn build_all(&self, loaded: &LoadReport, sink: &dyn ArtifactSink) -> BuildReport {
        let mut report = BuildReport::default();

        let mut sources: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        for entry in &loaded.dags {
            sources
                .entry(entry.dag.name.as_ref())
                .or_default()
                .push(entry.source_id.as_str());
        }

        for entry in &loaded.dags {
            let dag = &entry.dag;
            let name = dag.name.as_ref();
            match sources.get(name) {
                Some(found) if found.len() > 1 => {
                    if report.error_for(name).is_none() {
                        report.errors.push((
                            name.to_string(),
                            TyphoonError::DuplicateDag {
                                name: name.to_string(),
                                count: found.len(),
                                sources: found.join(", "),
                            },
                        ));
                    }
                    continue;
                }
                _ => {}
            }

            if !dag.active {
                debug!(dag = %name, "inactive, skipped");
                report.inactive.push(name.to_string());
                continue;
            }

            match self.build(dag, sink) {
                Ok(artifact) => report.artifacts.push(artifact),
                Err(error) => {
                    warn!(dag = %name, code = error.code(), "build failed: {}", error);
                    report.errors.push((name.to_string(), error));
                }
            }
        }

        info!(
            written = report.written().count(),
            unchanged = report.unchanged().count(),
            failed = report.errors.len(),
            "build finished"
        );
        report
    }
}
