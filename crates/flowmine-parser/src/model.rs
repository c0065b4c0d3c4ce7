use std::fmt;

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;

use crate::errors::LoadError;

/// Canonical text rendering for timestamps, shared by the CSV artifacts and the
/// staging store.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single decoded spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Timestamp view of the cell. Text is accepted when it parses as a date.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::DateTime(value) => Some(*value),
            CellValue::Text(text) => crate::formats::parse_timestamp(text),
            _ => None,
        }
    }

    pub fn to_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Text(value) => f.write_str(value),
            CellValue::Integer(value) => write!(f, "{value}"),
            // Whole floats come out of spreadsheets for integer ids; print them without ".0".
            CellValue::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            CellValue::Float(value) => write!(f, "{value}"),
            CellValue::Bool(value) => write!(f, "{value}"),
            CellValue::DateTime(value) => write!(f, "{}", value.format(TIMESTAMP_FORMAT)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Datetime,
    Integer,
    Float,
    Boolean,
    Text,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Datetime => "datetime",
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Text => "text",
        }
    }

    /// Picks the narrowest kind able to hold every non-null value.
    pub fn infer(values: &[CellValue]) -> Self {
        let mut kind: Option<ColumnKind> = None;
        for value in values {
            let current = match value {
                CellValue::Null => continue,
                CellValue::Text(_) => return ColumnKind::Text,
                CellValue::Integer(_) => ColumnKind::Integer,
                CellValue::Float(_) => ColumnKind::Float,
                CellValue::Bool(_) => ColumnKind::Boolean,
                CellValue::DateTime(_) => ColumnKind::Datetime,
            };
            kind = Some(match (kind, current) {
                (None, next) => next,
                (Some(prev), next) if prev == next => prev,
                (Some(ColumnKind::Integer), ColumnKind::Float)
                | (Some(ColumnKind::Float), ColumnKind::Integer) => ColumnKind::Float,
                _ => return ColumnKind::Text,
            });
        }
        kind.unwrap_or(ColumnKind::Text)
    }

    fn of_dtype(dtype: &DataType) -> Self {
        match dtype {
            DataType::Datetime(_, _) => ColumnKind::Datetime,
            DataType::Int64 | DataType::Int32 => ColumnKind::Integer,
            DataType::Float64 | DataType::Float32 => ColumnKind::Float,
            DataType::Boolean => ColumnKind::Boolean,
            _ => ColumnKind::Text,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercases and strips whitespace: `"Order Table"` becomes `ordertable`.
pub fn normalize_sheet_name(name: &str) -> String {
    name.chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// A sheet as handed over by a reader, before type inference.
#[derive(Debug, Clone, Default)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// One loaded sheet backed by a typed DataFrame.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub source_name: String,
    pub df: DataFrame,
}

impl Table {
    pub fn from_raw(raw: RawSheet) -> Result<Self, LoadError> {
        let RawSheet {
            name: source_name,
            headers,
            rows,
        } = raw;

        let mut columns: Vec<Vec<CellValue>> = vec![Vec::with_capacity(rows.len()); headers.len()];
        for row in rows {
            if row.iter().all(CellValue::is_null) {
                continue;
            }
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.push(cells.next().unwrap_or(CellValue::Null));
            }
        }

        let mut seen: Vec<&str> = Vec::with_capacity(headers.len());
        let mut frame_columns: Vec<Column> = Vec::with_capacity(headers.len());
        for (header, values) in headers.iter().zip(columns) {
            if header.is_empty() {
                if values.iter().all(CellValue::is_null) {
                    continue;
                }
                return Err(LoadError::InvalidHeader {
                    sheet: source_name,
                    message: "unnamed column contains data".to_string(),
                });
            }
            if seen.contains(&header.as_str()) {
                return Err(LoadError::InvalidHeader {
                    sheet: source_name,
                    message: format!("duplicate column '{header}'"),
                });
            }
            seen.push(header);
            frame_columns.push(build_column(header, &values)?);
        }

        Ok(Self {
            name: normalize_sheet_name(&source_name),
            source_name,
            df: DataFrame::new(frame_columns)?,
        })
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.df.column(column).is_ok()
    }

    pub fn column_kind(&self, column: &str) -> Result<ColumnKind, LoadError> {
        column_kind(&self.df, column).map_err(|err| self.rename_missing(err))
    }

    pub fn values(&self, column: &str) -> Result<Vec<CellValue>, LoadError> {
        column_values(&self.df, column).map_err(|err| self.rename_missing(err))
    }

    fn rename_missing(&self, err: LoadError) -> LoadError {
        match err {
            LoadError::MissingColumn { column, .. } => LoadError::MissingColumn {
                table: self.name.clone(),
                column,
            },
            other => other,
        }
    }
}

/// All sheets of one input, in source order.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub tables: Vec<Table>,
}

impl Workbook {
    pub fn table(&self, name: &str) -> Option<&Table> {
        let wanted = normalize_sheet_name(name);
        self.tables.iter().find(|table| table.name == wanted)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|table| table.name.as_str()).collect()
    }
}

/// Builds a typed column from decoded cells.
pub fn build_column(name: &str, values: &[CellValue]) -> Result<Column, LoadError> {
    let series = match ColumnKind::infer(values) {
        ColumnKind::Datetime => {
            let micros: Vec<Option<i64>> = values
                .iter()
                .map(|value| value.as_datetime().map(|dt| dt.and_utc().timestamp_micros()))
                .collect();
            Series::new(name.into(), micros)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?
        }
        ColumnKind::Integer => {
            let ints: Vec<Option<i64>> = values
                .iter()
                .map(|value| match value {
                    CellValue::Integer(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), ints)
        }
        ColumnKind::Float => {
            let floats: Vec<Option<f64>> = values
                .iter()
                .map(|value| match value {
                    CellValue::Integer(v) => Some(*v as f64),
                    CellValue::Float(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), floats)
        }
        ColumnKind::Boolean => {
            let bools: Vec<Option<bool>> = values
                .iter()
                .map(|value| match value {
                    CellValue::Bool(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), bools)
        }
        ColumnKind::Text => {
            let texts: Vec<Option<String>> = values.iter().map(CellValue::to_text).collect();
            Series::new(name.into(), texts)
        }
    };
    Ok(series.into())
}

pub fn column_kind(df: &DataFrame, column: &str) -> Result<ColumnKind, LoadError> {
    let col = df.column(column).map_err(|_| LoadError::MissingColumn {
        table: String::new(),
        column: column.to_string(),
    })?;
    Ok(ColumnKind::of_dtype(col.dtype()))
}

/// Reads a DataFrame column back into cells, whatever its dtype.
pub fn column_values(df: &DataFrame, column: &str) -> Result<Vec<CellValue>, LoadError> {
    let col = df.column(column).map_err(|_| LoadError::MissingColumn {
        table: String::new(),
        column: column.to_string(),
    })?;

    let values = match col.dtype() {
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let physical = col.cast(&DataType::Int64)?;
            physical
                .i64()?
                .iter()
                .map(|value| {
                    value
                        .and_then(|raw| match unit {
                            TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(raw)),
                            TimeUnit::Microseconds => DateTime::from_timestamp_micros(raw),
                            TimeUnit::Milliseconds => DateTime::from_timestamp_millis(raw),
                        })
                        .map_or(CellValue::Null, |dt| CellValue::DateTime(dt.naive_utc()))
                })
                .collect()
        }
        DataType::Int64 | DataType::Int32 => {
            let physical = col.cast(&DataType::Int64)?;
            physical
                .i64()?
                .iter()
                .map(|value| value.map_or(CellValue::Null, CellValue::Integer))
                .collect()
        }
        DataType::Float64 | DataType::Float32 => {
            let physical = col.cast(&DataType::Float64)?;
            physical
                .f64()?
                .iter()
                .map(|value| value.map_or(CellValue::Null, CellValue::Float))
                .collect()
        }
        DataType::Boolean => col
            .bool()?
            .iter()
            .map(|value| value.map_or(CellValue::Null, CellValue::Bool))
            .collect(),
        _ => {
            let text = col.cast(&DataType::String)?;
            text.str()?
                .iter()
                .map(|value| value.map_or(CellValue::Null, |v| CellValue::Text(v.to_string())))
                .collect()
        }
    };

    Ok(values)
}
