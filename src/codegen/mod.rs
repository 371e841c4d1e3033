//! Codegen Module - DAG to deployable pipeline artifact
//!
//! - `plan`: compile-time checks, steps rewritten and parsed
//! - `imports`: module collection and reserved-namespace aliasing
//! - `emitter`: Python module text
//! - `compiler`: bulk builds through an `ArtifactSink`
//! - `target`: environment parameters baked into the artifact

mod compiler;
mod emitter;
mod imports;
mod plan;
mod target;

pub use compiler::{
    artifact_path, Artifact, ArtifactSink, ArtifactStatus, BuildReport, Compiler, FsArtifactSink,
    MemorySink,
};
pub use emitter::Emitter;
pub use imports::{expression_calls, function_modules, Imports};
pub use plan::{CompiledStep, DagPlan};
pub use target::TargetEnv;
