//! `promptflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: parse a workflow script and report its dependency graph.
//! - `run`: execute a workflow script against the dry-run echo client.

mod echo;
mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use engine::{
    bind_model_variables, build_workflow, topological_order, ExecutorConfig, ModelRef, NodeKind,
    WorkflowExecutor,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::echo::EchoClient;
use crate::settings::ClientSettings;

#[derive(Parser)]
#[command(
    name = "promptflow",
    about = "Prompt-chaining workflow runner",
    version
)]
struct Cli {
    /// Log at debug level (RUST_LOG still wins).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a workflow script and print its nodes and execution order.
    Validate {
        /// Path to the workflow script.
        path: PathBuf,
        /// Print the resolved nodes as JSON.
        #[arg(long)]
        json: bool,
        /// Client settings JSON; its model list decides which model tokens are nicknames.
        #[arg(long, env = "PROMPTFLOW_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Execute a workflow script and print the final output.
    Run {
        /// Path to the workflow script.
        path: PathBuf,
        /// User input substituted for {{INPUT}}; read from stdin when omitted.
        #[arg(long, short)]
        input: Option<String>,
        /// Client settings JSON (models, sequentialWorkflowRequests, workflowRequestDelay).
        #[arg(long, env = "PROMPTFLOW_CONFIG")]
        config: Option<PathBuf>,
        /// Issue each round's completion calls concurrently.
        #[arg(long)]
        parallel: bool,
        /// Seconds to wait before each completion call.
        #[arg(long, env = "WORKFLOW_REQUEST_DELAY")]
        delay: Option<f64>,
        /// Also print every node's output.
        #[arg(long)]
        show_nodes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Validate { path, json, config } => {
            let settings = ClientSettings::load(config.as_deref())?;
            validate(&path, json, &settings)
        }
        Command::Run { path, input, config, parallel, delay, show_nodes } => {
            let mut settings = ClientSettings::load(config.as_deref())?;
            if parallel {
                settings.workflow.sequential_workflow_requests = false;
            }
            if let Some(delay) = delay {
                settings.workflow.workflow_request_delay = delay;
            }
            run(&path, input, settings, show_nodes).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_script(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("cannot read workflow script {}", path.display()))
}

fn validate(path: &Path, json: bool, settings: &ClientSettings) -> Result<()> {
    let source = read_script(path)?;
    let mut workflow = build_workflow(&source)?;
    bind_model_variables(&mut workflow, &settings.models);

    if json {
        println!("{}", serde_json::to_string_pretty(&workflow.nodes)?);
        return Ok(());
    }

    for node in &workflow.nodes {
        let kind = match &node.kind {
            NodeKind::Static => "static".to_owned(),
            NodeKind::Llm { model: ModelRef::Nickname(name) } => format!("llm({name})"),
            NodeKind::Llm { model: ModelRef::Variable(var) } => format!("llm(${var})"),
        };
        let deps: Vec<&str> = node.dependencies().collect();
        println!(
            "{:>4}  {}{:<16} {:<18} deps: [{}]",
            node.line,
            "  ".repeat(node.indent_level),
            node.id,
            kind,
            deps.join(", ")
        );
    }

    match topological_order(&workflow) {
        Ok(order) => {
            println!("✅ Workflow is valid. Execution order: {order:?}");
            Ok(())
        }
        Err(cycle) => {
            eprintln!("❌ {cycle}; this workflow would deadlock");
            std::process::exit(1);
        }
    }
}

async fn run(path: &Path, input: Option<String>, settings: ClientSettings, show_nodes: bool) -> Result<()> {
    let source = read_script(path)?;
    let input = match input {
        Some(input) => input,
        None => std::io::read_to_string(std::io::stdin()).context("cannot read input from stdin")?,
    };

    let config = ExecutorConfig::from(&settings.workflow);
    let client = Arc::new(EchoClient::new(settings.models));
    let executor = WorkflowExecutor::new(client, config);

    let progress = |status: &str| info!(target: "promptflow::progress", "{status}");
    let result = executor.run(&source, &input, &progress).await?;

    if show_nodes {
        for node in &result.node_outputs {
            println!("== {} ==\n{}\n", node.id, node.output);
        }
    }
    println!("{}", result.output);
    Ok(())
}
