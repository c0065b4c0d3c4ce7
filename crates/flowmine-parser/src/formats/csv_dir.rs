use std::path::{Path, PathBuf};

use csv::ReaderBuilder;

use crate::errors::LoadError;
use crate::formats::{header_name, parse_csv_cell};
use crate::model::RawSheet;
use crate::registry::WorkbookReader;

const READER: &str = "csv_directory";

/// Reads a directory holding one `<sheet>.csv` per sheet. Sheets are returned in
/// file-name order.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvDirectoryReader;

impl WorkbookReader for CsvDirectoryReader {
    fn name(&self) -> &'static str {
        READER
    }

    fn read(&self, path: &Path) -> Result<Vec<RawSheet>, LoadError> {
        if !path.is_dir() {
            return Err(LoadError::FormatMismatch {
                reader: READER,
                reason: "input is not a directory".to_string(),
            });
        }

        let entries = std::fs::read_dir(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let file = entry.path();
            let is_csv = file
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if is_csv && file.is_file() {
                files.push(file);
            }
        }

        if files.is_empty() {
            return Err(LoadError::FormatMismatch {
                reader: READER,
                reason: "directory contains no .csv files".to_string(),
            });
        }
        files.sort();

        files.iter().map(|file| read_sheet(file)).collect()
    }
}

fn read_sheet(file: &Path) -> Result<RawSheet, LoadError> {
    let csv_error = |source: csv::Error| LoadError::Csv {
        path: file.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(file)
        .map_err(csv_error)?;

    let headers = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(header_name)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        rows.push(record.iter().map(parse_csv_cell).collect());
    }

    let name = file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string();

    Ok(RawSheet {
        name,
        headers,
        rows,
    })
}
