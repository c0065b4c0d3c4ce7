use std::path::Path;

use tracing::debug;

use crate::errors::{LoadError, ReaderAttempt};
use crate::formats::{CsvDirectoryReader, SpreadsheetReader};
use crate::model::{normalize_sheet_name, RawSheet, Table, Workbook};

pub trait WorkbookReader {
    fn name(&self) -> &'static str;
    fn read(&self, path: &Path) -> Result<Vec<RawSheet>, LoadError>;
}

/// Loads every sheet of `path` except those named in `skip_sheets`.
pub fn read_workbook(path: &Path, skip_sheets: &[String]) -> Result<Workbook, LoadError> {
    let spreadsheet = SpreadsheetReader;
    let csv_directory = CsvDirectoryReader;
    let readers: [&dyn WorkbookReader; 2] = [&spreadsheet, &csv_directory];
    read_with_readers(path, &readers, skip_sheets)
}

pub fn read_with_readers(
    path: &Path,
    readers: &[&dyn WorkbookReader],
    skip_sheets: &[String],
) -> Result<Workbook, LoadError> {
    let mut attempts = Vec::new();

    for reader in readers {
        match reader.read(path) {
            Ok(sheets) => return build_workbook(sheets, skip_sheets),
            Err(LoadError::FormatMismatch { reason, .. }) => {
                attempts.push(ReaderAttempt::new(reader.name(), reason));
            }
            Err(err) => return Err(err),
        }
    }

    Err(LoadError::NoMatchingReader {
        path: path.to_path_buf(),
        attempts,
    })
}

fn build_workbook(sheets: Vec<RawSheet>, skip_sheets: &[String]) -> Result<Workbook, LoadError> {
    let skipped: Vec<String> = skip_sheets
        .iter()
        .map(|name| normalize_sheet_name(name))
        .collect();

    let mut tables = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        if skipped.contains(&normalize_sheet_name(&sheet.name)) {
            debug!(sheet = %sheet.name, "Skipping sheet");
            continue;
        }
        let table = Table::from_raw(sheet)?;
        debug!(
            table = %table.name,
            rows = table.height(),
            columns = table.df.width(),
            "Loaded sheet"
        );
        tables.push(table);
    }

    Ok(Workbook { tables })
}
