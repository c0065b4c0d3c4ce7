use std::collections::HashSet;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use flowmine_core::event_log::{EventLogError, ValidationError};
use flowmine_core::vocabulary::SchemaError;
use flowmine_core::{ActivityVocabulary, CaseId, EventLog, EventLogBuilder, PipelineConfig};
use flowmine_parser::{read_workbook, CellValue, ColumnKind, RawSheet, Table, Workbook};

fn sample_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../flowmine-parser/tests/data/sample")
}

fn sample_log() -> (PipelineConfig, Workbook, EventLog) {
    let config = PipelineConfig {
        input: sample_dir(),
        ..PipelineConfig::default()
    };
    let workbook = read_workbook(&config.input, &config.skip_sheets).expect("read sample");
    let vocabulary = ActivityVocabulary::resolve(&config, &workbook).expect("vocabulary");
    let log = EventLogBuilder::new(&config, &vocabulary)
        .build(&workbook)
        .expect("build event log");
    (config, workbook, log)
}

fn dt(value: &str) -> CellValue {
    CellValue::DateTime(
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").expect("fixture timestamp"),
    )
}

fn text(value: &str) -> CellValue {
    CellValue::Text(value.to_string())
}

fn sheet(name: &str, headers: &[&str], rows: Vec<Vec<CellValue>>) -> Table {
    Table::from_raw(RawSheet {
        name: name.to_string(),
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows,
    })
    .expect("valid sheet")
}

const TWO_SHEET_CONFIG: &str = r#"
    skip_sheets = []
    resource_columns = ["Region"]

    [[sheets]]
    name = "orders"
    join = { role = "primary", case_column = "OrderID" }
    activities = [{ column = "Placed" }, { column = "Picked" }]
    attributes = ["Region"]

    [[sheets]]
    name = "tickets"
    join = { role = "case", case_column = "OrderID" }
    activities = [{ column = "Opened" }]
    attributes = ["Region"]
"#;

const TICKET_ID_CONFIG: &str = r#"
    skip_sheets = []
    resource_columns = ["Region"]

    [[sheets]]
    name = "orders"
    join = { role = "primary", case_column = "OrderID" }
    activities = [{ column = "Placed" }, { column = "Picked" }]
    attributes = ["Region"]

    [[sheets]]
    name = "tickets"
    join = { role = "case", case_column = "OrderID" }
    activities = [{ column = "Opened" }]
    attributes = ["TicketID", "Region"]
"#;

fn orders() -> Table {
    sheet(
        "orders",
        &["OrderID", "Placed", "Picked", "Region"],
        vec![
            vec![
                CellValue::Integer(1),
                dt("2024-02-01 09:00:00"),
                dt("2024-02-01 09:00:00"),
                text("East"),
            ],
            vec![
                CellValue::Integer(2),
                dt("2024-02-02 09:00:00"),
                CellValue::Null,
                text("West"),
            ],
        ],
    )
}

fn build(tables: Vec<Table>) -> Result<EventLog, EventLogError> {
    let config = PipelineConfig::from_toml_str(TWO_SHEET_CONFIG).expect("config");
    let workbook = Workbook { tables };
    let vocabulary = ActivityVocabulary::resolve(&config, &workbook)?;
    EventLogBuilder::new(&config, &vocabulary).build(&workbook)
}

#[test]
fn sample_workbook_unpivots_every_date_cell() {
    let (_, workbook, log) = sample_log();

    assert_eq!(log.cases().len(), 5);
    assert_eq!(log.len(), 22);

    let primary_ids: HashSet<CaseId> = workbook
        .table("ordertable")
        .expect("ordertable")
        .values("OrderID")
        .expect("OrderID")
        .iter()
        .filter_map(CaseId::from_cell)
        .collect();
    for event in log.events() {
        assert!(primary_ids.contains(&event.case_id), "orphan {}", event.case_id);
    }

    let per_case = |id: &str| {
        log.events()
            .iter()
            .filter(|event| event.case_id.as_str() == id)
            .map(|event| event.activity.as_str())
            .collect::<Vec<_>>()
    };
    assert_eq!(per_case("1005"), vec!["OrderDate"]);
    assert_eq!(
        per_case("1003"),
        vec!["OrderDate", "PickedDate", "TicketReceived", "TicketResolved"]
    );
    assert_eq!(per_case("1002").len(), 8);
}

#[test]
fn xlsx_workbook_builds_the_same_log_as_csv_sheets() {
    let config = PipelineConfig {
        input: sample_dir().with_extension("xlsx"),
        ..PipelineConfig::default()
    };
    let workbook = read_workbook(&config.input, &config.skip_sheets).expect("read sample xlsx");
    let vocabulary = ActivityVocabulary::resolve(&config, &workbook).expect("vocabulary");
    let log = EventLogBuilder::new(&config, &vocabulary)
        .build(&workbook)
        .expect("build event log from xlsx");
    let (_, _, csv_log) = sample_log();

    let key = |log: &EventLog| {
        log.events()
            .iter()
            .map(|event| {
                (
                    event.case_id.as_str().to_string(),
                    event.activity.clone(),
                    event.timestamp,
                    event.resource.clone(),
                    event.source_sheet.clone(),
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(log.cases(), csv_log.cases());
    assert_eq!(log.len(), 22);
    assert_eq!(key(&log), key(&csv_log));

    let case = CaseId::new("1001");
    assert_eq!(log.attribute(&case, "DeliveryCompany"), Some("FastShip"));
    assert_eq!(log.attribute(&case, "ShippingAddress"), Some("12 High St"));
}

#[test]
fn vocabulary_follows_configured_sheet_and_column_order() {
    let (config, workbook, _) = sample_log();
    let vocabulary = ActivityVocabulary::resolve(&config, &workbook).expect("vocabulary");

    assert!(!vocabulary.is_empty());
    let labels: Vec<(&str, usize)> = vocabulary
        .activities()
        .iter()
        .map(|activity| (activity.label.as_str(), activity.ordinal))
        .collect();
    assert_eq!(
        labels,
        vec![
            ("OrderDate", 0),
            ("PickedDate", 1),
            ("PackedDate", 2),
            ("PickUpDate", 3),
            ("DeliveredDate", 4),
            ("TicketReceived", 5),
            ("TicketResolved", 6),
            ("RefundIssued", 7),
        ]
    );
    assert_eq!(vocabulary.for_sheet("supporttable").len(), 3);
}

#[test]
fn events_are_grouped_and_time_ordered() {
    let (_, _, log) = sample_log();

    for pair in log.events().windows(2) {
        assert!(pair[0].case_id <= pair[1].case_id);
        if pair[0].case_id == pair[1].case_id {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }
}

#[test]
fn resources_and_attributes_are_joined() {
    let (_, _, log) = sample_log();
    let event = |case: &str, activity: &str| {
        log.events()
            .iter()
            .find(|event| event.case_id.as_str() == case && event.activity == activity)
            .unwrap_or_else(|| panic!("missing {case}/{activity}"))
    };

    assert_eq!(event("1001", "OrderDate").resource, "North");
    assert_eq!(event("1001", "PickUpDate").resource, "FastShip");
    assert_eq!(event("1002", "TicketReceived").resource, "Tier1");
    assert_eq!(event("1002", "TicketReceived").source_sheet, "supporttable");

    let case = CaseId::new("1001");
    assert_eq!(log.attribute(&case, "ShippingAddress"), Some("12 High St"));
    assert_eq!(log.attribute(&case, "DeliveryCompany"), Some("FastShip"));
    assert_eq!(log.attribute(&case, "TicketID"), None);
    assert_eq!(log.attribute_columns()[0], "CustomerID");
}

#[test]
fn null_dates_produce_no_events_and_ties_follow_vocabulary() {
    let tickets = sheet(
        "tickets",
        &["OrderID", "Opened", "Region"],
        vec![vec![CellValue::Integer(1), dt("2024-02-03 10:00:00"), text("East")]],
    );
    let log = build(vec![orders(), tickets]).expect("valid input");

    let activities: Vec<(&str, &str)> = log
        .events()
        .iter()
        .map(|event| (event.case_id.as_str(), event.activity.as_str()))
        .collect();
    assert_eq!(
        activities,
        vec![("1", "Placed"), ("1", "Picked"), ("1", "Opened"), ("2", "Placed")]
    );
    assert!(log.events().iter().all(|event| event.resource != "Unknown"));
}

#[test]
fn orphan_case_is_rejected() {
    let tickets = sheet(
        "tickets",
        &["OrderID", "Opened", "Region"],
        vec![vec![CellValue::Integer(99), dt("2024-02-03 10:00:00"), text("East")]],
    );
    let err = build(vec![orders(), tickets]).expect_err("orphan");

    match err {
        EventLogError::Validation(ValidationError::OrphanCase { case_id, sheet, .. }) => {
            assert_eq!(case_id.as_str(), "99");
            assert_eq!(sheet, "tickets");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn conflicting_attribute_is_rejected() {
    let tickets = sheet(
        "tickets",
        &["OrderID", "Opened", "Region"],
        vec![vec![CellValue::Integer(2), dt("2024-02-03 10:00:00"), text("East")]],
    );
    let err = build(vec![orders(), tickets]).expect_err("conflict");

    assert!(matches!(
        err,
        EventLogError::Validation(ValidationError::ConflictingAttribute { ref attribute, .. })
            if attribute == "Region"
    ));
}

#[test]
fn repeated_case_rows_keep_their_own_attributes() {
    let config = PipelineConfig::from_toml_str(TICKET_ID_CONFIG).expect("config");
    let tickets = sheet(
        "tickets",
        &["TicketID", "OrderID", "Opened", "Region"],
        vec![
            vec![
                text("T1"),
                CellValue::Integer(1),
                dt("2024-02-06 10:00:00"),
                text("East"),
            ],
            vec![
                text("T2"),
                CellValue::Integer(1),
                dt("2024-02-08 10:00:00"),
                text("East"),
            ],
        ],
    );
    let workbook = Workbook {
        tables: vec![orders(), tickets],
    };
    let vocabulary = ActivityVocabulary::resolve(&config, &workbook).expect("vocabulary");
    let log = EventLogBuilder::new(&config, &vocabulary)
        .build(&workbook)
        .expect("one order may have several tickets");

    let opened: Vec<_> = log
        .events()
        .iter()
        .filter(|event| event.activity == "Opened")
        .collect();
    assert_eq!(opened.len(), 2);
    assert!(opened.iter().all(|event| event.case_id.as_str() == "1"));
    let ticket_ids: Vec<&str> = opened
        .iter()
        .map(|event| log.event_attribute(event, "TicketID").expect("ticket id"))
        .collect();
    assert_eq!(ticket_ids, vec!["T1", "T2"]);

    let case = CaseId::new("1");
    assert_eq!(log.attribute(&case, "TicketID"), Some("T1"));
    let placed = &log.events()[0];
    assert_eq!(placed.activity, "Placed");
    assert_eq!(log.event_attribute(placed, "TicketID"), Some("T1"));

    let frame = log.to_dataframe().expect("frame");
    assert_eq!(frame.height(), 5);
}

#[test]
fn schema_problems_are_reported() {
    let missing_sheet = build(vec![orders()]).expect_err("tickets sheet missing");
    assert!(matches!(
        missing_sheet,
        EventLogError::Schema(SchemaError::MissingSheet { ref sheet, .. }) if sheet == "tickets"
    ));

    let without_column = sheet(
        "tickets",
        &["OrderID", "Region"],
        vec![vec![CellValue::Integer(1), text("East")]],
    );
    let missing_column = build(vec![orders(), without_column]).expect_err("no Opened column");
    assert!(matches!(
        missing_column,
        EventLogError::Schema(SchemaError::MissingColumn { ref column, .. }) if column == "Opened"
    ));

    let numeric = sheet(
        "tickets",
        &["OrderID", "Opened", "Region"],
        vec![vec![CellValue::Integer(1), CellValue::Integer(5), text("East")]],
    );
    let not_temporal = build(vec![orders(), numeric]).expect_err("integers are not dates");
    assert!(matches!(
        not_temporal,
        EventLogError::Schema(SchemaError::NotTemporal {
            kind: ColumnKind::Integer,
            ..
        })
    ));
}
