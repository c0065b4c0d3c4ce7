use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};

use crate::errors::LoadError;
use crate::formats::{header_name, parse_text_cell};
use crate::model::{CellValue, RawSheet};
use crate::registry::WorkbookReader;

const READER: &str = "spreadsheet";
const EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Reads Excel and OpenDocument workbooks; the first row of every sheet is its header.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpreadsheetReader;

impl WorkbookReader for SpreadsheetReader {
    fn name(&self) -> &'static str {
        READER
    }

    fn read(&self, path: &Path) -> Result<Vec<RawSheet>, LoadError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !EXTENSIONS.contains(&extension.as_str()) {
            return Err(LoadError::FormatMismatch {
                reader: READER,
                reason: format!("unsupported extension '{extension}'"),
            });
        }

        std::fs::metadata(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut workbook = open_workbook_auto(path).map_err(|source| LoadError::Spreadsheet {
            path: path.to_path_buf(),
            source,
        })?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|source| LoadError::Spreadsheet {
                    path: path.to_path_buf(),
                    source,
                })?;
            sheets.push(sheet_from_range(name, &range));
        }
        Ok(sheets)
    }
}

fn sheet_from_range(name: String, range: &Range<Data>) -> RawSheet {
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return RawSheet {
            name,
            ..RawSheet::default()
        };
    };

    let headers = header_row
        .iter()
        .map(|cell| match cell {
            Data::Empty => String::new(),
            other => header_name(&other.to_string()),
        })
        .collect();

    let rows = rows
        .map(|row| row.iter().map(decode_cell).collect())
        .collect();

    RawSheet {
        name,
        headers,
        rows,
    }
}

pub(crate) fn decode_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Null,
        Data::String(value) => parse_text_cell(value),
        Data::Int(value) => CellValue::Integer(*value),
        Data::Float(value) if value.is_nan() => CellValue::Null,
        Data::Float(value) => CellValue::Float(*value),
        Data::Bool(value) => CellValue::Bool(*value),
        Data::DateTime(value) => value
            .as_datetime()
            .map_or(CellValue::Float(value.as_f64()), CellValue::DateTime),
        Data::DateTimeIso(value) => parse_text_cell(value),
        Data::DurationIso(value) => CellValue::Text(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn decodes_typed_cells() {
        assert_eq!(decode_cell(&Data::Empty), CellValue::Null);
        assert_eq!(decode_cell(&Data::Int(7)), CellValue::Integer(7));
        assert_eq!(decode_cell(&Data::Float(f64::NAN)), CellValue::Null);
        assert_eq!(
            decode_cell(&Data::String("  North ".to_string())),
            CellValue::Text("North".to_string())
        );
    }

    #[test]
    fn promotes_iso_and_text_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(
            decode_cell(&Data::DateTimeIso("2024-01-02T09:30:00".to_string())),
            CellValue::DateTime(expected)
        );
        assert_eq!(
            decode_cell(&Data::String("2024-01-02 09:30:00".to_string())),
            CellValue::DateTime(expected)
        );
    }

    #[test]
    fn rejects_non_spreadsheet_extension() {
        let err = SpreadsheetReader
            .read(Path::new("orders.csv"))
            .expect_err("csv should not be accepted");
        assert!(matches!(err, LoadError::FormatMismatch { .. }));
    }
}
