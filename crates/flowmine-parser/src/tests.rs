use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::errors::LoadError;
use crate::model::{normalize_sheet_name, CellValue, ColumnKind, RawSheet, Table};
use crate::registry::{read_with_readers, WorkbookReader};
use crate::{read_workbook, CsvDirectoryReader};

fn fixture_dir(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
}

fn skip_db_structure() -> Vec<String> {
    vec!["DB structure".to_string()]
}

fn text(value: &str) -> CellValue {
    CellValue::Text(value.to_string())
}

#[test]
fn normalizes_sheet_names_like_table_names() {
    assert_eq!(normalize_sheet_name("Order Table"), "ordertable");
    assert_eq!(normalize_sheet_name(" Support\tTable "), "supporttable");
    assert_eq!(normalize_sheet_name("ordertable"), "ordertable");
}

#[test]
fn reads_csv_directory_and_skips_metadata_sheet() {
    let workbook =
        read_workbook(&fixture_dir("sample"), &skip_db_structure()).expect("sample workbook");

    assert_eq!(
        workbook.table_names(),
        vec!["customertable", "ordertable", "shippingtable", "supporttable"]
    );
    assert!(workbook.table("DB structure").is_none());

    let orders = workbook.table("Order Table").expect("orders");
    assert_eq!(orders.height(), 5);
    assert_eq!(orders.column_kind("OrderID").unwrap(), ColumnKind::Integer);
    assert_eq!(orders.column_kind("OrderDate").unwrap(), ColumnKind::Datetime);
    assert_eq!(orders.column_kind("PackedDate").unwrap(), ColumnKind::Datetime);
    assert_eq!(orders.column_kind("OrderTotal").unwrap(), ColumnKind::Float);
    assert_eq!(orders.column_kind("Warehouse").unwrap(), ColumnKind::Text);

    let customers = workbook.table("customertable").expect("customers");
    assert_eq!(customers.column_kind("SignUpDate").unwrap(), ColumnKind::Datetime);
    assert_eq!(
        customers.column_kind("HasLoyaltyCard").unwrap(),
        ColumnKind::Boolean
    );
}

#[test]
fn reads_xlsx_workbook_with_spaced_sheet_names() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/sample.xlsx");
    let workbook = read_workbook(&path, &skip_db_structure()).expect("sample xlsx");

    assert_eq!(
        workbook.table_names(),
        vec!["ordertable", "customertable", "shippingtable", "supporttable"]
    );
    assert!(workbook.table("DB structure").is_none());

    let orders = workbook.table("Order Table").expect("orders");
    assert_eq!(orders.height(), 5);
    // Spreadsheet numbers are floats even when whole.
    assert_eq!(orders.column_kind("OrderID").unwrap(), ColumnKind::Float);
    assert_eq!(orders.column_kind("OrderDate").unwrap(), ColumnKind::Datetime);
    assert_eq!(orders.column_kind("Warehouse").unwrap(), ColumnKind::Text);

    let ids = orders.values("OrderID").expect("ids");
    assert_eq!(ids[0], CellValue::Float(1001.0));
    assert_eq!(ids[0].to_text().as_deref(), Some("1001"));

    let picked = orders.values("PickedDate").expect("picked column");
    let expected = NaiveDate::from_ymd_opt(2024, 1, 3)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    assert_eq!(picked[0], CellValue::DateTime(expected));
    assert_eq!(picked[4], CellValue::Null);

    let customers = workbook.table("customertable").expect("customers");
    assert_eq!(customers.column_kind("SignUpDate").unwrap(), ColumnKind::Datetime);
    assert_eq!(
        customers.column_kind("HasLoyaltyCard").unwrap(),
        ColumnKind::Boolean
    );
}

#[test]
fn null_dates_survive_as_nulls() {
    let workbook =
        read_workbook(&fixture_dir("sample"), &skip_db_structure()).expect("sample workbook");
    let orders = workbook.table("ordertable").expect("orders");

    let packed = orders.values("PackedDate").expect("packed column");
    let expected = NaiveDate::from_ymd_opt(2024, 1, 3)
        .unwrap()
        .and_hms_opt(15, 0, 0)
        .unwrap();
    assert_eq!(packed[0], CellValue::DateTime(expected));
    assert_eq!(packed[2], CellValue::Null);
    assert_eq!(packed[4], CellValue::Null);
}

#[test]
fn whole_floats_render_without_fraction() {
    assert_eq!(CellValue::Float(1001.0).to_string(), "1001");
    assert_eq!(CellValue::Float(49.99).to_string(), "49.99");
    assert_eq!(CellValue::Null.to_text(), None);
}

#[test]
fn infers_column_kinds() {
    assert_eq!(
        ColumnKind::infer(&[CellValue::Integer(1), CellValue::Float(2.5)]),
        ColumnKind::Float
    );
    assert_eq!(
        ColumnKind::infer(&[CellValue::Null, CellValue::Null]),
        ColumnKind::Text
    );
    assert_eq!(
        ColumnKind::infer(&[CellValue::Integer(1), text("x")]),
        ColumnKind::Text
    );
}

#[test]
fn rejects_duplicate_headers() {
    let raw = RawSheet {
        name: "Orders".to_string(),
        headers: vec!["OrderID".to_string(), "OrderID".to_string()],
        rows: vec![vec![CellValue::Integer(1), CellValue::Integer(2)]],
    };
    let err = Table::from_raw(raw).expect_err("duplicate header should fail");
    assert!(matches!(err, LoadError::InvalidHeader { .. }));
}

#[test]
fn pads_ragged_rows_and_drops_blank_trailing_columns() {
    let raw = RawSheet {
        name: "Orders".to_string(),
        headers: vec!["OrderID".to_string(), "Warehouse".to_string(), String::new()],
        rows: vec![
            vec![CellValue::Integer(1), text("North")],
            vec![CellValue::Null, CellValue::Null, CellValue::Null],
            vec![CellValue::Integer(2)],
        ],
    };
    let table = Table::from_raw(raw).expect("table");
    assert_eq!(table.column_names(), vec!["OrderID", "Warehouse"]);
    assert_eq!(table.height(), 2);
    assert_eq!(
        table.values("Warehouse").unwrap(),
        vec![text("North"), CellValue::Null]
    );
}

#[test]
fn missing_column_names_the_table() {
    let raw = RawSheet {
        name: "Order Table".to_string(),
        headers: vec!["OrderID".to_string()],
        rows: vec![vec![CellValue::Integer(1)]],
    };
    let table = Table::from_raw(raw).expect("table");
    match table.values("OrderDate") {
        Err(LoadError::MissingColumn { table, column }) => {
            assert_eq!(table, "ordertable");
            assert_eq!(column, "OrderDate");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

struct RejectAll;

impl WorkbookReader for RejectAll {
    fn name(&self) -> &'static str {
        "reject_all"
    }

    fn read(&self, _path: &Path) -> Result<Vec<RawSheet>, LoadError> {
        Err(LoadError::FormatMismatch {
            reader: "reject_all",
            reason: "never matches".to_string(),
        })
    }
}

#[test]
fn registry_falls_through_format_mismatches() {
    let readers: [&dyn WorkbookReader; 2] = [&RejectAll, &CsvDirectoryReader];
    let workbook = read_with_readers(&fixture_dir("sample"), &readers, &skip_db_structure())
        .expect("csv reader should pick up the directory");
    assert_eq!(workbook.tables.len(), 4);
}

#[test]
fn registry_reports_every_attempt() {
    let err = read_workbook(Path::new("does-not-exist.txt"), &[])
        .expect_err("unknown input should fail");
    match err {
        LoadError::NoMatchingReader { attempts, .. } => {
            let readers: Vec<&str> = attempts.iter().map(|attempt| attempt.reader).collect();
            assert_eq!(readers, vec!["spreadsheet", "csv_directory"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
