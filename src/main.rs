//! Typhoon CLI - ETL DAG compiler

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use typhoon::ast::{load_dags, Dag, DirectorySource};
use typhoon::codegen::{Compiler, FsArtifactSink};
use typhoon::config::TyphoonConfig;
use typhoon::dag::validate_integrity;
use typhoon::error::{FixSuggestion, TyphoonError};
use typhoon::registry::FunctionRegistry;
use typhoon::runtime::{DagContext, Runner};
use typhoon::transform::{TransformationRequest, TransformationResult};

#[derive(Parser)]
#[command(name = "typhoon")]
#[command(about = "Typhoon - compile YAML ETL DAGs into deployable pipelines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a DAG definition (structure and transformations)
    Validate {
        /// Path to a DAG YAML file
        file: PathBuf,
    },

    /// Compile active DAGs of the dags directory into artifacts
    Build {
        /// Target environment (defaults to TYPHOON_ENV or the config default)
        #[arg(short, long)]
        env: Option<String>,

        /// Build only this DAG
        #[arg(short, long)]
        dag: Option<String>,
    },

    /// Interpret a DAG locally (reserved functions only)
    Run {
        /// DAG name
        dag: String,

        /// Execution date, YYYY-MM-DDTHH:MM (defaults to now)
        #[arg(short, long)]
        time: Option<String>,

        /// Print the event log as JSON
        #[arg(long)]
        events: bool,
    },

    /// Preview parameter chains from a JSON request
    Transform {
        /// Path to the request file
        request: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => validate_dag(&file),
        Commands::Build { env, dag } => build_dags(env, dag),
        Commands::Run { dag, time, events } => run_dag(&dag, time, events).await,
        Commands::Transform { request } => transform(&request).await,
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            report_error(&e);
            std::process::exit(1);
        }
    }
}

fn report_error(e: &TyphoonError) {
    eprintln!("{} {}", "Error:".red().bold(), e);
    if let Some(suggestion) = e.fix_suggestion() {
        eprintln!("  {} {}", "Fix:".yellow(), suggestion);
    }
}

fn load_config() -> Result<TyphoonConfig, TyphoonError> {
    TyphoonConfig::load(std::env::current_dir()?)?.with_env()
}

fn validate_dag(file: &Path) -> Result<bool, TyphoonError> {
    let yaml = std::fs::read_to_string(file)?;
    let dag = Dag::from_yaml(&yaml)?;
    validate_integrity(&dag)?;

    // Rewrites and parses every step
    let config = load_config()?;
    Compiler::new(config.current_target()?).compile(&dag)?;

    let structure = dag.structure();
    println!("{} DAG '{}' is valid", "✓".green(), dag.name);
    println!("  Nodes: {}", dag.nodes.len());
    println!("  Edges: {}", dag.edges.len());
    println!("  Sources: {}", join(&structure.sources()));
    println!("  Sinks: {}", join(&structure.sinks()));
    println!("  Active: {}", dag.active);
    if let Err(e) = structure.detect_cycles() {
        println!("  {} {} (only the compiled artifact can run it)", "!".yellow(), e);
    }
    Ok(true)
}

fn join(names: &[Arc<str>]) -> String {
    if names.is_empty() {
        return "(none)".to_string();
    }
    names.iter().map(|n| n.as_ref()).collect::<Vec<_>>().join(", ")
}

fn build_dags(env: Option<String>, only: Option<String>) -> Result<bool, TyphoonError> {
    let config = load_config()?;
    let environment = env.unwrap_or_else(|| config.environment().to_string());
    let target = config.target(&environment)?;
    let loaded = load_dags(&DirectorySource::new(config.dags_directory()))?;

    let compiler = Compiler::new(target);
    let sink = FsArtifactSink::new(config.out_directory().join(&environment));

    println!(
        "{} Building for environment: {}",
        "→".cyan(),
        environment.cyan().bold()
    );

    let mut ok = true;
    for (source, error) in &loaded.errors {
        eprintln!("{} {}", source.red(), "failed to load".red());
        report_error(error);
        ok = false;
    }

    if let Some(name) = only {
        let entry = loaded.find(&name)?;
        let artifact = compiler.build(&entry.dag, &sink)?;
        println!("{} {} → {}", "✓".green(), name, artifact.path.display());
        return Ok(ok);
    }

    let report = compiler.build_all(&loaded, &sink);
    for artifact in &report.artifacts {
        println!(
            "{} {} → {} ({:?})",
            "✓".green(),
            artifact.dag,
            artifact.path.display(),
            artifact.status
        );
    }
    for name in &report.inactive {
        println!("  {} {} (inactive)", "-".dimmed(), name);
    }
    for (name, error) in &report.errors {
        eprintln!("{} {}", "✗".red(), name.red());
        report_error(error);
    }
    Ok(ok && report.is_success())
}

async fn run_dag(name: &str, time: Option<String>, events: bool) -> Result<bool, TyphoonError> {
    let config = load_config()?;
    let loaded = load_dags(&DirectorySource::new(config.dags_directory()))?;
    let dag = loaded.find(name)?.dag.clone();

    let context = match time {
        Some(time) => DagContext::parse(name, &time)?,
        None => DagContext::now(name),
    };
    println!(
        "{} Running {} for {}",
        "→".cyan(),
        name.cyan().bold(),
        context.ts().cyan()
    );

    let runner = Runner::new(Arc::new(dag), Arc::new(FunctionRegistry::new()))?;
    let report = runner.run(context).await;

    for run in &report.edges {
        let marker = if run.is_success() { "✓".green() } else { "✗".red() };
        println!(
            "{} {} [batch {}] {}",
            marker,
            run.edge,
            run.batch_num,
            run.final_value()
        );
        for (step, error) in &run.failed_steps {
            println!("    step {}: {}", step, error);
        }
    }
    for failure in &report.node_failures {
        println!(
            "{} node {} [batch {}]: {}",
            "✗".red(),
            failure.node,
            failure.batch_num,
            failure.error
        );
    }

    if events {
        println!("{}", serde_json::to_string_pretty(&report.events.to_json())?);
    }
    Ok(report.is_success())
}

async fn transform(path: &Path) -> Result<bool, TyphoonError> {
    // Read async to not block runtime
    let text = tokio::fs::read_to_string(path).await?;
    let request = TransformationRequest::from_json(&text)?;
    let registry = FunctionRegistry::new();
    let results = request.run(Some(&registry))?;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(results.values().all(TransformationResult::is_success))
}
