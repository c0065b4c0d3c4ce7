use std::fs::File;
use std::path::{Path, PathBuf};

use flowmine_parser::TIMESTAMP_FORMAT;
use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::PolarsError;
use thiserror::Error;
use tracing::debug;

use crate::dfg::DirectlyFollowsGraph;
use crate::event_log::EventLog;
use crate::summary::ProcessSummary;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("cannot serialize {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot write parquet {}: {source}", path.display())]
    Parquet {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
}

pub const EVENT_LOG_BASE_COLUMNS: [&str; 5] =
    ["case_id", "activity", "timestamp", "resource", "source_sheet"];

/// One row per event in log order, attribute columns after the fixed ones.
pub fn write_event_log_csv(path: &Path, log: &EventLog) -> Result<(), ArtifactError> {
    let csv_error = |source: csv::Error| ArtifactError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;

    let mut header: Vec<&str> = EVENT_LOG_BASE_COLUMNS.to_vec();
    header.extend(log.attribute_columns().iter().map(String::as_str));
    writer.write_record(&header).map_err(csv_error)?;

    for event in log.events() {
        let timestamp = event.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let mut record: Vec<&str> = vec![
            event.case_id.as_str(),
            event.activity.as_str(),
            timestamp.as_str(),
            event.resource.as_str(),
            event.source_sheet.as_str(),
        ];
        for name in log.attribute_columns() {
            record.push(log.event_attribute(event, name).unwrap_or(""));
        }
        writer.write_record(&record).map_err(csv_error)?;
    }

    writer.flush().map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), rows = log.len(), "Wrote event log CSV");
    Ok(())
}

pub fn write_edges_csv(path: &Path, graph: &DirectlyFollowsGraph) -> Result<(), ArtifactError> {
    let csv_error = |source: csv::Error| ArtifactError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    writer
        .write_record(["source", "target", "frequency"])
        .map_err(csv_error)?;

    let edges = graph.sorted_edges();
    for edge in &edges {
        writer
            .write_record([
                edge.source.as_str(),
                edge.target.as_str(),
                edge.frequency.to_string().as_str(),
            ])
            .map_err(csv_error)?;
    }

    writer.flush().map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), rows = edges.len(), "Wrote edge CSV");
    Ok(())
}

/// Zstd-compressed parquet copy of the event log, with typed timestamp column.
pub fn write_event_log_parquet(path: &Path, log: &EventLog) -> Result<(), ArtifactError> {
    let parquet_error = |source: PolarsError| ArtifactError::Parquet {
        path: path.to_path_buf(),
        source,
    };
    let mut df = log.to_dataframe().map_err(parquet_error)?;
    let file = File::create(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .with_statistics(StatisticsOptions::default())
        .finish(&mut df)
        .map_err(parquet_error)?;
    debug!(path = %path.display(), rows = df.height(), "Wrote event log parquet");
    Ok(())
}

pub fn write_summary_json(path: &Path, summary: &ProcessSummary) -> Result<(), ArtifactError> {
    let mut bytes = serde_json::to_vec_pretty(summary).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    bytes.push(b'\n');
    std::fs::write(path, bytes).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}
