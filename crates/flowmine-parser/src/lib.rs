pub mod errors;
pub mod formats;
pub mod model;
mod registry;

pub use errors::{LoadError, ReaderAttempt};
pub use formats::{parse_timestamp, CsvDirectoryReader, SpreadsheetReader};
pub use model::{
    build_column, column_kind, column_values, normalize_sheet_name, CellValue, ColumnKind,
    RawSheet, Table, Workbook, TIMESTAMP_FORMAT,
};
pub use registry::{read_with_readers, read_workbook, WorkbookReader};

#[cfg(test)]
mod tests;
