use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use shared_engine_host::{init_logging, log_startup, EmbeddingConfig};

#[path = "engine_share_cli/scenario.rs"]
mod scenario;
use scenario::{Scenario, ScenarioReport, ScenarioRunner, BUILTIN_EVICTION};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("engine-share error: {err:?}");
            ExitCode::from(1)
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "engine-share",
    about = "Replay shared-engine host lifecycles against a headless engine"
)]
struct Cli {
    /// JSON configuration file; defaults apply when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit delegate logs on stderr.
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn execute(self) -> Result<()> {
        if self.verbose {
            init_logging();
        }
        let config = match &self.config {
            Some(path) => EmbeddingConfig::load_from_file(path),
            None => EmbeddingConfig::default(),
        };
        log_startup(&config);

        match self.command {
            Command::Run(args) => run_command(config, args),
            Command::Config => config_command(&config),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a lifecycle scenario and print the resulting telemetry.
    Run(RunArgs),
    /// Print the effective configuration as JSON.
    Config,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Scenario file; the built-in eviction scenario when absent.
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
    format: ReportFormat,
    /// Destination file for the report (JSON only).
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum ReportFormat {
    Table,
    Json,
}

fn run_command(config: EmbeddingConfig, args: RunArgs) -> Result<()> {
    let source = match &args.scenario {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?,
        None => BUILTIN_EVICTION.to_string(),
    };
    let scenario: Scenario =
        serde_json::from_str(&source).context("scenario is not valid JSON")?;

    let mut runner = ScenarioRunner::new(config, &scenario)?;
    let report = runner.run(&scenario.steps)?;

    match args.format {
        ReportFormat::Table => print_table(&report),
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&report)?;
            match &args.out {
                Some(path) => fs::write(path, json)
                    .with_context(|| format!("failed to write report {}", path.display()))?,
                None => println!("{json}"),
            }
        }
    }
    Ok(())
}

fn config_command(config: &EmbeddingConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn print_table(report: &ScenarioReport) {
    println!("steps run: {}", report.steps_run);
    println!("pending tasks: {}", report.pending_tasks);
    println!();
    println!("{:<12} {:<10} {:<12} {:>12} {:>8}", "page", "id", "state", "placeholders", "dropped");
    for page in &report.pages {
        println!(
            "{:<12} {:<10} {:<12} {:>12} {:>8}",
            page.name,
            page.page_id,
            page.state.as_deref().unwrap_or("-"),
            page.placeholders,
            page.dropped_events
        );
    }
    println!();
    println!(
        "events: {} total, {} dropped from history",
        report.telemetry.total_events, report.telemetry.dropped_events
    );
    for record in &report.telemetry.recent {
        let payload = serde_json::to_string(&record.event).unwrap_or_default();
        println!("{:>4} {:<20} {}", record.sequence, record.event.kind(), payload);
    }
}
