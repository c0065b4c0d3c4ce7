use std::path::PathBuf;

use flowmine_parser::read_workbook;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::dfg::{DirectlyFollowsGraph, Edge};
use crate::error::{PipelineError, Result};
use crate::event_log::EventLogBuilder;
use crate::outputs::{
    write_edges_csv, write_event_log_csv, write_event_log_parquet, write_summary_json,
};
use crate::render::{
    render_with_fallback, FallbackSvgRenderer, GraphvizRenderer, PrimaryRender, RenderOutcome,
};
use crate::store::{StagingStore, StoreError};
use crate::summary::ProcessSummary;
use crate::vocabulary::ActivityVocabulary;

pub const EVENT_LOG_TABLE: &str = "event_log";
pub const EDGES_TABLE: &str = "dfg_edges";

#[derive(Debug)]
pub struct StagedTable {
    pub name: String,
    pub rows: u64,
}

/// What a successful run produced.
#[derive(Debug)]
pub struct RunReport {
    pub artifacts: Vec<PathBuf>,
    pub staged_tables: Vec<StagedTable>,
    pub edges: Vec<Edge>,
    pub summary: ProcessSummary,
    pub render: RenderOutcome,
}

impl RunReport {
    pub fn primary_render_failed(&self) -> bool {
        matches!(self.render.primary, PrimaryRender::Failed(_))
    }
}

/// Runs every stage in order. Each stage finishes and persists its output before
/// the next one starts.
pub async fn run(config: &PipelineConfig) -> Result<RunReport> {
    config.validate()?;

    std::fs::create_dir_all(&config.output_dir).map_err(|source| PipelineError::OutputDir {
        path: config.output_dir.clone(),
        source,
    })?;

    info!(input = %config.input.display(), "Loading workbook");
    let workbook = read_workbook(&config.input, &config.skip_sheets)?;
    let vocabulary = ActivityVocabulary::resolve(config, &workbook)?;
    info!(
        sheets = workbook.tables.len(),
        activities = vocabulary.len(),
        "Validated input schema"
    );

    let mut artifacts = Vec::new();

    let db_path = config.artifact_path(&config.artifacts.database);
    let store = StagingStore::create(&db_path).await?;
    let mut staged_tables = Vec::with_capacity(workbook.tables.len());
    for table in &workbook.tables {
        let key = config.sheet(&table.name).map(|sheet| sheet.join.key_column());
        let rows = store.stage_table(table, key).await?;
        info!(table = %table.name, rows, "Staged sheet");
        staged_tables.push(StagedTable {
            name: table.name.clone(),
            rows,
        });
    }

    let log = EventLogBuilder::new(config, &vocabulary).build(&workbook)?;
    if log.is_empty() {
        warn!("Event log is empty; the process map will have no activities");
    }

    let event_log_path = config.artifact_path(&config.artifacts.event_log);
    write_event_log_csv(&event_log_path, &log)?;
    artifacts.push(event_log_path);

    let parquet_path = config.artifact_path(&config.artifacts.event_log_parquet);
    write_event_log_parquet(&parquet_path, &log)?;
    artifacts.push(parquet_path);

    let graph = DirectlyFollowsGraph::discover(&log);
    let edges = graph.sorted_edges();
    for edge in &edges {
        info!(
            source = %edge.source,
            target = %edge.target,
            frequency = edge.frequency,
            "Directly-follows edge"
        );
    }

    let edges_path = config.artifact_path(&config.artifacts.edges);
    write_edges_csv(&edges_path, &graph)?;
    artifacts.push(edges_path);

    let log_frame = log.to_dataframe().map_err(StoreError::from)?;
    let rows = store
        .write_frame(EVENT_LOG_TABLE, &log_frame, Some("case_id"))
        .await?;
    staged_tables.push(StagedTable {
        name: EVENT_LOG_TABLE.to_string(),
        rows,
    });
    let edge_frame = graph.to_dataframe().map_err(StoreError::from)?;
    let rows = store.write_frame(EDGES_TABLE, &edge_frame, None).await?;
    staged_tables.push(StagedTable {
        name: EDGES_TABLE.to_string(),
        rows,
    });
    store.close().await;
    artifacts.push(db_path);

    let summary = ProcessSummary::compute(&log, &graph);
    summary.log();

    let primary = GraphvizRenderer::from_config(config);
    let fallback = FallbackSvgRenderer::from_config(config);
    let render = render_with_fallback(&primary, &fallback, &graph, &summary)?;
    if primary.dot_path.exists() {
        artifacts.push(primary.dot_path.clone());
    }
    if let Some(path) = render.primary_path() {
        artifacts.push(path.clone());
    }
    artifacts.push(render.fallback.clone());

    let summary_path = config.artifact_path(&config.artifacts.summary);
    write_summary_json(&summary_path, &summary)?;
    artifacts.push(summary_path);

    info!(artifacts = artifacts.len(), "Pipeline finished");
    Ok(RunReport {
        artifacts,
        staged_tables,
        edges,
        summary,
        render,
    })
}
