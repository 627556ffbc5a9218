//! # agentgraph-cli
//!
//! Command-line front end for running agentic workflow graphs.

use agentgraph_core::budget::ExecutionBudget;
use agentgraph_core::llm::LlmAdapter;
use agentgraph_core::Engine;
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Run an agentic workflow document and write its execution trace.
#[derive(Parser)]
#[command(name = "agentgraph")]
#[command(about = "Run an AgenticDSL Markdown workflow", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the workflow document (e.g. `workflow.agent.md`).
    workflow: PathBuf,

    /// Where to write the execution trace.
    #[arg(long, default_value = "execution_trace.json")]
    trace_out: PathBuf,

    /// Optional JSON file overriding the workflow's execution budget.
    #[arg(long)]
    budget: Option<PathBuf>,

    /// Optional JSON file supplying the initial context (defaults to `{}`).
    #[arg(long)]
    input: Option<PathBuf>,

    /// Increase logging verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all logging below errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Placeholder adapter for CLI runs: this crate is an orchestration engine,
/// not an LLM client, so the binary does not wire a default provider. Host
/// integrations embed `Engine` directly and supply their own adapter.
struct UnconfiguredLlm;

#[async_trait]
impl LlmAdapter for UnconfiguredLlm {
    async fn complete(&self, _prompt: &str) -> std::result::Result<String, String> {
        Err("no LLM adapter configured for this CLI run".to_string())
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> Result<bool> {
    let text = std::fs::read_to_string(&cli.workflow)
        .with_context(|| format!("reading workflow file {}", cli.workflow.display()))?;

    let mut engine = Engine::from_markdown(&text, std::sync::Arc::new(UnconfiguredLlm))
        .context("loading workflow")?;

    if let Some(budget_path) = &cli.budget {
        let budget_text = std::fs::read_to_string(budget_path)
            .with_context(|| format!("reading budget override {}", budget_path.display()))?;
        let budget: ExecutionBudget =
            serde_json::from_str(&budget_text).context("parsing budget override")?;
        engine.override_budget(budget);
    }

    let initial_ctx = match &cli.input {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading input context {}", path.display()))?;
            serde_json::from_str(&text).context("parsing input context")?
        }
        None => serde_json::json!({}),
    };

    let result = engine.run(initial_ctx).await.context("running workflow")?;

    let trace_json = serde_json::to_string_pretty(&result).context("serializing trace")?;
    std::fs::write(&cli.trace_out, trace_json)
        .with_context(|| format!("writing trace to {}", cli.trace_out.display()))?;

    if !result.success {
        tracing::error!(message = %result.message, "workflow run failed");
    }

    Ok(result.success)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %err, "fatal error");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
