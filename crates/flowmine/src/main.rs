use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{CellAlignment, Table};
use flowmine_core::pipeline::RunReport;
use flowmine_core::render::PrimaryRender;
use flowmine_core::{run, PipelineConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Spreadsheet to process map: event log, directly-follows graph and diagram", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Spreadsheet file or directory of per-sheet CSV files
    #[arg(long)]
    input: Option<PathBuf>,
    /// Directory receiving every artifact of the run
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Graphviz layout binary
    #[arg(long)]
    graphviz_bin: Option<String>,
    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
    /// Do not print the edge table
    #[arg(long)]
    quiet_table: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config =
        PipelineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    config.apply_env(|key| std::env::var(key).ok());
    if let Some(input) = cli.input {
        config.input = input;
    }
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(binary) = cli.graphviz_bin {
        config.graphviz.binary = binary;
    }

    let report = run(&config)
        .await
        .with_context(|| format!("process mining run on {} failed", config.input.display()))?;

    if !cli.quiet_table {
        println!("{}", edge_table(&report));
    }
    if let PrimaryRender::Failed(err) = &report.render.primary {
        warn!(error = %err, "Graphviz diagram unavailable; see the fallback SVG");
    }

    println!("Artifacts:");
    for path in &report.artifacts {
        println!("  {}", path.display());
    }
    info!(
        cases = report.summary.total_cases,
        events = report.summary.total_events,
        "Done"
    );
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn edge_table(report: &RunReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Source", "Target", "Frequency"]);
    for edge in &report.edges {
        table.add_row(vec![
            edge.source.clone(),
            edge.target.clone(),
            edge.frequency.to_string(),
        ]);
    }
    if let Some(column) = table.column_mut(2) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    table
}
