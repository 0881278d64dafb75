//! CLI binary for planning and running Kiln helper pipelines.

mod host;
mod manifest;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use kiln_pipeline::{Diagnostic, HelperExecutionSnapshot, PipelineEvent};

use crate::host::{pipeline_from_manifest, ManifestRun, RunOptions};
use crate::manifest::Manifest;

#[derive(Parser)]
#[command(name = "kiln", version, about = "Dependency-ordered helper pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline manifest
    Run {
        /// Path to the JSON manifest
        manifest: PathBuf,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved execution order without running anything
    Plan {
        /// Path to the JSON manifest
        manifest: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { manifest, json } => {
            cmd_run(&manifest, json).await?;
        }
        Commands::Plan { manifest } => {
            cmd_plan(&manifest).await?;
        }
    }

    Ok(())
}

async fn cmd_plan(path: &Path) -> anyhow::Result<()> {
    let manifest = Manifest::load(path)?;
    let pipeline = pipeline_from_manifest(&manifest)?;
    let plan = pipeline.plan().await?;

    println!("Pipeline: {}", manifest.name);
    println!("\nFragments:");
    for (i, key) in plan.fragments.iter().enumerate() {
        println!("  {}. {}", i + 1, key);
    }
    println!("\nBuilders:");
    for (i, key) in plan.builders.iter().enumerate() {
        println!("  {}. {}", i + 1, key);
    }
    if !plan.unresolved.is_empty() {
        println!("\nUnresolved: {}", plan.unresolved.join(", "));
    }
    print_diagnostics(&pipeline.diagnostics());

    if !plan.unresolved.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_run(path: &Path, json: bool) -> anyhow::Result<()> {
    let manifest = Manifest::load(path)?;
    let pipeline = pipeline_from_manifest(&manifest)?;

    let mut events = pipeline.subscribe();
    let outcome = pipeline.run(RunOptions::default()).await;
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::PhaseEntered { phase, .. } => tracing::debug!(phase = %phase, "phase entered"),
            PipelineEvent::HelperStarted { key, kind, .. } => {
                tracing::debug!(key = %key, kind = %kind, "helper started")
            }
            _ => {}
        }
    }

    match outcome {
        Ok(run) if json => {
            println!("{}", serde_json::to_string_pretty(&run_report(&manifest, &run))?);
        }
        Ok(run) => print_run(&manifest, &run),
        Err(e) => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "name": manifest.name,
                        "error": e.to_string(),
                        "diagnostics": pipeline.diagnostics(),
                    }))?
                );
            } else {
                eprintln!("Pipeline failed: {e}");
                print_diagnostics(&pipeline.diagnostics());
            }
            std::process::exit(1);
        }
    }

    Ok(())
}

fn run_report(manifest: &Manifest, run: &ManifestRun) -> serde_json::Value {
    serde_json::json!({
        "name": manifest.name,
        "steps": run.result.steps,
        "helpers": run.result.helpers,
        "artifact": run.result.artifact,
        "output": run.output,
        "diagnostics": run.result.diagnostics,
    })
}

fn print_run(manifest: &Manifest, run: &ManifestRun) {
    println!("Pipeline completed: {}", manifest.name);

    println!("\nSteps:");
    for step in &run.result.steps {
        println!("  {} [{}] priority={}", step.key, step.kind, step.priority);
    }

    print_snapshot(&run.result.helpers.fragments);
    print_snapshot(&run.result.helpers.builders);

    println!("\nOutput:");
    for line in &run.output {
        println!("  {}", line);
    }

    print_diagnostics(&run.result.diagnostics);
}

fn print_snapshot(snapshot: &HelperExecutionSnapshot) {
    println!(
        "\n{}: {} registered, {} executed",
        snapshot.kind,
        snapshot.registered.len(),
        snapshot.executed.len()
    );
    if !snapshot.missing.is_empty() {
        println!("  not executed: {}", snapshot.missing.join(", "));
    }
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }
    println!("\nDiagnostics:");
    for diag in diagnostics {
        println!("  [{}] {}", diag.type_name(), diag.message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_json_flag() {
        let cli = Cli::parse_from(["kiln", "--verbose", "run", "pipeline.json", "--json"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Run { manifest, json } => {
                assert_eq!(manifest, PathBuf::from("pipeline.json"));
                assert!(json);
            }
            Commands::Plan { .. } => panic!("expected run"),
        }
    }

    #[tokio::test]
    async fn run_report_lists_steps_and_output() {
        let manifest = Manifest::parse(
            r#"{ "name": "r", "fragments": [{ "key": "a", "value": 1 }], "builders": [{ "key": "out" }] }"#,
        )
        .unwrap();
        let pipeline = pipeline_from_manifest(&manifest).unwrap();
        let run = pipeline.run(RunOptions::default()).await.unwrap();

        let report = run_report(&manifest, &run);
        assert_eq!(report["steps"][0]["key"], "a");
        assert_eq!(report["steps"][1]["key"], "out");
        assert_eq!(report["output"][0], "out: a=1");
        assert_eq!(report["helpers"]["fragments"]["executed"][0], "a");
        assert_eq!(report["artifact"]["entries"][0]["value"], 1);
    }
}
