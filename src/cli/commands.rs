//! CLI command definitions for etlflow.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::pipeline::{PipelineConfig, PipelineOrchestrator};
use crate::quality::{QualityIssue, QualityReport};
use crate::registry::PluginCatalog;

/// Default output prefix for `etlflow run`.
const DEFAULT_OUTPUT_PREFIX: &str = "./output/etl";

/// Configuration-driven ETL runner.
#[derive(Parser)]
#[command(name = "etlflow")]
#[command(about = "Run configuration-driven extract-transform-load pipelines")]
#[command(version)]
#[command(
    long_about = "etlflow reads records from a local directory or a remote JSON endpoint (or a configured plugin), transforms them, and writes CSV or Parquet.\n\nExample usage:\n  etlflow run --config pipeline.yaml --output ./output/odds --format parquet"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run extract, transform and load.
    Run(RunArgs),

    /// Extract only and print the quality report.
    Quality(QualityArgs),

    /// List the plugins declared in a configuration.
    Plugins(PluginsArgs),
}

/// Arguments for `etlflow run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Pipeline configuration file (.json, .yaml, .yml).
    #[arg(short, long, env = "ETLFLOW_CONFIG")]
    pub config: PathBuf,

    /// Output prefix; the format extension is appended.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_PREFIX)]
    pub output: String,

    /// Output format (csv or parquet).
    #[arg(short, long, default_value = "csv")]
    pub format: String,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `etlflow quality`.
#[derive(Parser, Debug)]
pub struct QualityArgs {
    /// Pipeline configuration file (.json, .yaml, .yml).
    #[arg(short, long, env = "ETLFLOW_CONFIG")]
    pub config: PathBuf,

    /// Output JSON report.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `etlflow plugins`.
#[derive(Parser, Debug)]
pub struct PluginsArgs {
    /// Pipeline configuration file (.json, .yaml, .yml).
    #[arg(short, long, env = "ETLFLOW_CONFIG")]
    pub config: PathBuf,

    /// Output JSON listing.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline_command(args).await,
        Commands::Quality(args) => run_quality_command(args).await,
        Commands::Plugins(args) => run_plugins_command(args),
    }
}

fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    let config = PipelineConfig::from_file(path)
        .and_then(PipelineConfig::apply_env_overrides)
        .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e))?;
    info!(path = %path.display(), "Loaded pipeline configuration");
    Ok(config)
}

/// Cancels batch fan-out on Ctrl-C; in-flight items still finish.
fn cancel_on_ctrl_c(orchestrator: &PipelineOrchestrator) {
    let cancel = orchestrator.cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, no new items will be scheduled");
            cancel.cancel();
        }
    });
}

async fn run_pipeline_command(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;

    let mut orchestrator = PipelineOrchestrator::new();
    cancel_on_ctrl_c(&orchestrator);
    orchestrator.configure(config)?;

    let result = orchestrator.run(&args.output, &args.format).await;
    let summary = orchestrator.summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("\n=== Pipeline Run {} ===", summary.run_id);
        println!("State:        {}", summary.state);
        println!("Extracted:    {}", summary.extracted_records);
        println!("Transformed:  {}", summary.transformed_records);
        if let Some(report) = &summary.quality {
            println!("Quality:      {}", report);
        }
        for stage in &summary.stages {
            println!(
                "  {:<10} records={:<8} {}ms",
                stage.stage.to_string(),
                stage.records,
                stage.duration_ms
            );
        }
        for path in &summary.outputs {
            println!("Wrote:        {}", path.display());
        }
        if let Some(failure) = &summary.failure {
            println!("Failed at {} ({}): {}", failure.stage, failure.kind, failure.message);
        }
    }

    result?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct QualityOutput<'a> {
    source: &'a str,
    report: &'a QualityReport,
    issues: Vec<QualityIssue>,
}

async fn run_quality_command(args: QualityArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let source = config.data_source_path.clone();

    let mut orchestrator = PipelineOrchestrator::new();
    cancel_on_ctrl_c(&orchestrator);
    orchestrator.configure(config)?;
    orchestrator.extract().await?;

    let report = orchestrator
        .quality_report()
        .ok_or_else(|| anyhow::anyhow!("Extraction produced no quality report"))?;
    let output = QualityOutput {
        source: &source,
        report,
        issues: report.issues(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("\n=== Quality Report: {} ===", output.source);
        println!("Score:            {}/100", report.score);
        println!("Sample size:      {}", report.sample_size);
        println!("Completeness:     {:.3}", report.completeness);
        println!("Duplicate ratio:  {:.3}", report.duplicate_ratio);
        println!("Type consistency: {:.3}", report.type_consistency);
        if let Some(valid) = report.schema_valid {
            println!("Schema valid:     {}", valid);
        }
        for issue in &output.issues {
            println!("  [{:?}] {}: {}", issue.severity, issue.issue_type, issue.description);
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct PluginListing {
    name: String,
    target: String,
    enabled: bool,
    resolvable: bool,
    stages: Vec<&'static str>,
    parameters: Vec<String>,
}

fn run_plugins_command(args: PluginsArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let catalog = PluginCatalog::builtin();

    let listings: Vec<PluginListing> = config
        .plugins
        .iter()
        .map(|(name, descriptor)| {
            let bound = |stage: &Option<String>| stage.as_deref() == Some(name.as_str());
            let mut stages = Vec::new();
            if bound(&config.stages.extract) {
                stages.push("extract");
            }
            if bound(&config.stages.transform) {
                stages.push("transform");
            }
            if bound(&config.stages.load) {
                stages.push("load");
            }
            PluginListing {
                name: name.clone(),
                target: descriptor.target.to_string(),
                enabled: descriptor.enabled,
                resolvable: catalog.contains(&descriptor.target),
                stages,
                parameters: descriptor.parameters.keys().cloned().collect(),
            }
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    if listings.is_empty() {
        println!("No plugins configured.");
        return Ok(());
    }

    for plugin in &listings {
        println!(
            "{} -> {} [{}{}]{}",
            plugin.name,
            plugin.target,
            if plugin.enabled { "enabled" } else { "disabled" },
            if plugin.resolvable { "" } else { ", unknown target" },
            if plugin.stages.is_empty() {
                String::new()
            } else {
                format!(" stages: {}", plugin.stages.join(", "))
            }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from([
            "etlflow", "run", "--config", "p.yaml", "--output", "out/x", "--format", "parquet", "-j",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("p.yaml"));
                assert_eq!(args.output, "out/x");
                assert_eq!(args.format, "parquet");
                assert!(args.json);
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.log_level, "info");
    }
}
