mod common;
mod csv_dir;
mod spreadsheet;

pub use common::parse_timestamp;
pub use csv_dir::CsvDirectoryReader;
pub use spreadsheet::SpreadsheetReader;

pub(crate) use common::{header_name, parse_csv_cell, parse_text_cell};
