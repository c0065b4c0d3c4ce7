use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDateTime;
use flowmine_parser::{CellValue, LoadError, Table, Workbook};
use polars::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, SheetJoin, SheetSpec};
use crate::types::{CaseId, Event};
use crate::vocabulary::{ActivityDef, ActivityVocabulary, SchemaError};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(
        "sheet '{sheet}' references case '{case_id}', which is absent from primary sheet '{primary}'"
    )]
    OrphanCase {
        sheet: String,
        primary: String,
        case_id: CaseId,
    },
    #[error(
        "case '{case_id}' has conflicting values for '{attribute}': '{existing}' (sheet '{existing_sheet}') vs '{incoming}' (sheet '{sheet}')"
    )]
    ConflictingAttribute {
        case_id: CaseId,
        attribute: String,
        existing: String,
        existing_sheet: String,
        incoming: String,
        sheet: String,
    },
    #[error("sheet '{sheet}' column '{column}' holds '{value}' for case '{case_id}', which is not a timestamp")]
    InvalidTimestamp {
        sheet: String,
        column: String,
        case_id: CaseId,
        value: String,
    },
}

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<LoadError> for EventLogError {
    fn from(err: LoadError) -> Self {
        EventLogError::Schema(SchemaError::Load(err))
    }
}

/// Flat, case-grouped, time-ordered events plus per-case attributes.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
    cases: Vec<CaseId>,
    attribute_columns: Vec<String>,
    case_attributes: BTreeMap<CaseId, BTreeMap<String, String>>,
}

impl EventLog {
    /// Log without attributes whose cases are exactly those seen in `events`.
    pub fn from_events(events: Vec<Event>) -> Self {
        let cases: BTreeSet<CaseId> = events.iter().map(|event| event.case_id.clone()).collect();
        Self::assemble(events, cases, Vec::new(), BTreeMap::new())
    }

    fn assemble(
        mut events: Vec<Event>,
        cases: BTreeSet<CaseId>,
        attribute_columns: Vec<String>,
        case_attributes: BTreeMap<CaseId, BTreeMap<String, String>>,
    ) -> Self {
        events.sort_by(|a, b| {
            a.case_id
                .cmp(&b.case_id)
                .then_with(|| a.trace_key().cmp(&b.trace_key()))
        });
        events.dedup_by(|next, prev| {
            next.case_id == prev.case_id
                && next.ordinal == prev.ordinal
                && next.timestamp == prev.timestamp
        });

        Self {
            events,
            cases: cases.into_iter().collect(),
            attribute_columns,
            case_attributes,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Every case of the primary sheet, including cases without events.
    pub fn cases(&self) -> &[CaseId] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn attribute_columns(&self) -> &[String] {
        &self.attribute_columns
    }

    pub fn attribute(&self, case_id: &CaseId, name: &str) -> Option<&str> {
        self.case_attributes
            .get(case_id)
            .and_then(|attributes| attributes.get(name))
            .map(String::as_str)
    }

    /// The event's own row value, else the case-level one.
    pub fn event_attribute<'s>(&'s self, event: &'s Event, name: &str) -> Option<&'s str> {
        event
            .attributes
            .get(name)
            .map(String::as_str)
            .or_else(|| self.attribute(&event.case_id, name))
    }

    /// Distinct activities in order of first appearance.
    pub fn activity_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for event in &self.events {
            if !labels.contains(&event.activity.as_str()) {
                labels.push(&event.activity);
            }
        }
        labels
    }

    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self.events.iter().map(|event| event.timestamp).min()?;
        let last = self.events.iter().map(|event| event.timestamp).max()?;
        Some((first, last))
    }

    /// One row per event: case_id, activity, timestamp, resource, source_sheet,
    /// then the attribute columns.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(5 + self.attribute_columns.len());

        let case_ids: Vec<&str> = self.events.iter().map(|e| e.case_id.as_str()).collect();
        columns.push(Series::new("case_id".into(), case_ids).into());

        let activities: Vec<&str> = self.events.iter().map(|e| e.activity.as_str()).collect();
        columns.push(Series::new("activity".into(), activities).into());

        let timestamps: Vec<i64> = self
            .events
            .iter()
            .map(|e| e.timestamp.and_utc().timestamp_micros())
            .collect();
        let timestamps = Series::new("timestamp".into(), timestamps)
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;
        columns.push(timestamps.into());

        let resources: Vec<&str> = self.events.iter().map(|e| e.resource.as_str()).collect();
        columns.push(Series::new("resource".into(), resources).into());

        let sheets: Vec<&str> = self.events.iter().map(|e| e.source_sheet.as_str()).collect();
        columns.push(Series::new("source_sheet".into(), sheets).into());

        for name in &self.attribute_columns {
            let values: Vec<Option<&str>> = self
                .events
                .iter()
                .map(|e| self.event_attribute(e, name))
                .collect();
            columns.push(Series::new(name.as_str().into(), values).into());
        }

        DataFrame::new(columns)
    }
}

/// Unpivots the activity columns of every configured sheet into events and joins
/// the attribute columns onto cases.
pub struct EventLogBuilder<'a> {
    config: &'a PipelineConfig,
    vocabulary: &'a ActivityVocabulary,
}

struct PendingEvent {
    case_id: CaseId,
    activity: ActivityRef,
    timestamp: NaiveDateTime,
    resource: Option<String>,
    sheet: String,
    attributes: BTreeMap<String, String>,
}

struct ActivityRef {
    label: String,
    ordinal: usize,
}

/// Columns of one sheet that the builder reads, decoded once.
struct SheetColumns<'v> {
    sheet: String,
    key: Vec<CellValue>,
    attributes: Vec<(String, Vec<CellValue>)>,
    resource: Option<Vec<CellValue>>,
    activities: Vec<(&'v ActivityDef, Vec<CellValue>)>,
}

impl<'v> SheetColumns<'v> {
    fn read(
        table: &Table,
        spec: &SheetSpec,
        vocabulary: &'v ActivityVocabulary,
    ) -> Result<Self, LoadError> {
        let key = table.values(spec.join.key_column())?;

        let mut attributes = Vec::with_capacity(spec.attributes.len());
        for name in &spec.attributes {
            attributes.push((name.clone(), table.values(name)?));
        }

        let resource = match &spec.resource_column {
            Some(column) => Some(table.values(column)?),
            None => None,
        };

        let mut activities = Vec::new();
        for activity in vocabulary.for_sheet(&table.name) {
            activities.push((activity, table.values(&activity.column)?));
        }

        Ok(Self {
            sheet: table.name.clone(),
            key,
            attributes,
            resource,
            activities,
        })
    }

    fn height(&self) -> usize {
        self.key.len()
    }
}

/// Case-level attribute value and the sheet that first supplied it.
struct Sourced {
    value: String,
    sheet: String,
}

#[derive(Default)]
struct BuildState {
    cases: BTreeSet<CaseId>,
    attributes: BTreeMap<CaseId, BTreeMap<String, Sourced>>,
    pending: Vec<PendingEvent>,
}

impl BuildState {
    fn attribute(&self, case_id: &CaseId, name: &str) -> Option<&String> {
        self.attributes
            .get(case_id)
            .and_then(|values| values.get(name))
            .map(|sourced| &sourced.value)
    }

    fn absorb_row(
        &mut self,
        columns: &SheetColumns<'_>,
        row: usize,
        case_id: &CaseId,
    ) -> Result<(), ValidationError> {
        let mut row_attributes = BTreeMap::new();
        for (name, values) in &columns.attributes {
            if let Some(incoming) = values[row].to_text() {
                self.merge_attribute(case_id, name, &incoming, &columns.sheet)?;
                row_attributes.insert(name.clone(), incoming);
            }
        }

        let resource = columns
            .resource
            .as_ref()
            .and_then(|values| values[row].to_text());

        for (activity, values) in &columns.activities {
            let cell = &values[row];
            if cell.is_null() {
                continue;
            }
            let timestamp = cell
                .as_datetime()
                .ok_or_else(|| ValidationError::InvalidTimestamp {
                    sheet: columns.sheet.clone(),
                    column: activity.column.clone(),
                    case_id: case_id.clone(),
                    value: cell.to_string(),
                })?;
            self.pending.push(PendingEvent {
                case_id: case_id.clone(),
                activity: ActivityRef {
                    label: activity.label.clone(),
                    ordinal: activity.ordinal,
                },
                timestamp,
                resource: resource.clone(),
                sheet: columns.sheet.clone(),
                attributes: row_attributes.clone(),
            });
        }

        Ok(())
    }

    /// Rows of one sheet may repeat a case (several tickets per order); the
    /// first row's value stays case-level. Sheets must agree with each other.
    fn merge_attribute(
        &mut self,
        case_id: &CaseId,
        name: &str,
        incoming: &str,
        sheet: &str,
    ) -> Result<(), ValidationError> {
        let attributes = self.attributes.entry(case_id.clone()).or_default();
        match attributes.get(name) {
            Some(existing) if existing.value != incoming && existing.sheet != sheet => {
                Err(ValidationError::ConflictingAttribute {
                    case_id: case_id.clone(),
                    attribute: name.to_string(),
                    existing: existing.value.clone(),
                    existing_sheet: existing.sheet.clone(),
                    incoming: incoming.to_string(),
                    sheet: sheet.to_string(),
                })
            }
            Some(_) => Ok(()),
            None => {
                attributes.insert(
                    name.to_string(),
                    Sourced {
                        value: incoming.to_string(),
                        sheet: sheet.to_string(),
                    },
                );
                Ok(())
            }
        }
    }
}

impl<'a> EventLogBuilder<'a> {
    pub fn new(config: &'a PipelineConfig, vocabulary: &'a ActivityVocabulary) -> Self {
        Self { config, vocabulary }
    }

    pub fn build(&self, workbook: &Workbook) -> Result<EventLog, EventLogError> {
        let primary = self.config.primary_sheet().ok_or_else(|| SchemaError::MissingSheet {
            sheet: "<primary>".to_string(),
            available: workbook
                .table_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        })?;

        let mut state = BuildState::default();

        let ordered = std::iter::once(primary).chain(
            self.config
                .sheets
                .iter()
                .filter(|sheet| !matches!(sheet.join, SheetJoin::Primary { .. })),
        );

        for spec in ordered {
            let table = lookup_table(workbook, spec)?;
            let columns = SheetColumns::read(table, spec, self.vocabulary)?;
            let before = state.pending.len();

            match &spec.join {
                SheetJoin::Primary { .. } => {
                    for row in 0..columns.height() {
                        let Some(case_id) = CaseId::from_cell(&columns.key[row]) else {
                            warn!(sheet = %columns.sheet, row, "Skipping row without a case id");
                            continue;
                        };
                        state.cases.insert(case_id.clone());
                        state.absorb_row(&columns, row, &case_id)?;
                    }
                }
                SheetJoin::Case { .. } => {
                    for row in 0..columns.height() {
                        let Some(case_id) = CaseId::from_cell(&columns.key[row]) else {
                            warn!(sheet = %columns.sheet, row, "Skipping row without a case id");
                            continue;
                        };
                        if !state.cases.contains(&case_id) {
                            return Err(ValidationError::OrphanCase {
                                sheet: columns.sheet.clone(),
                                primary: primary.name.clone(),
                                case_id,
                            }
                            .into());
                        }
                        state.absorb_row(&columns, row, &case_id)?;
                    }
                }
                SheetJoin::Lookup { via_attribute, .. } => {
                    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
                    for (row, key) in columns.key.iter().enumerate() {
                        if let Some(key) = key.to_text() {
                            index.entry(key).or_default().push(row);
                        }
                    }

                    let cases: Vec<CaseId> = state.cases.iter().cloned().collect();
                    for case_id in cases {
                        let Some(key) = state.attribute(&case_id, via_attribute).cloned() else {
                            continue;
                        };
                        for &row in index.get(&key).into_iter().flatten() {
                            state.absorb_row(&columns, row, &case_id)?;
                        }
                    }
                }
            }

            debug!(
                sheet = %columns.sheet,
                rows = columns.height(),
                events = state.pending.len() - before,
                "Unpivoted sheet"
            );
        }

        let BuildState {
            cases,
            attributes,
            pending,
        } = state;

        let attributes: BTreeMap<CaseId, BTreeMap<String, String>> = attributes
            .into_iter()
            .map(|(case_id, values)| {
                let values = values
                    .into_iter()
                    .map(|(name, sourced)| (name, sourced.value))
                    .collect();
                (case_id, values)
            })
            .collect();

        let events: Vec<Event> = pending
            .into_iter()
            .map(|pending| {
                let resource = pending
                    .resource
                    .or_else(|| {
                        self.fallback_resource(&pending.attributes, attributes.get(&pending.case_id))
                    })
                    .unwrap_or_else(|| self.config.default_resource.clone());
                Event {
                    case_id: pending.case_id,
                    activity: pending.activity.label,
                    timestamp: pending.timestamp,
                    resource,
                    source_sheet: pending.sheet,
                    ordinal: pending.activity.ordinal,
                    attributes: pending.attributes,
                }
            })
            .collect();

        let log = EventLog::assemble(events, cases, self.config.attribute_columns(), attributes);
        info!(
            events = log.len(),
            cases = log.cases().len(),
            activities = log.activity_labels().len(),
            "Built event log"
        );
        Ok(log)
    }

    /// First configured resource column with a value, preferring the row's own.
    fn fallback_resource(
        &self,
        row: &BTreeMap<String, String>,
        case: Option<&BTreeMap<String, String>>,
    ) -> Option<String> {
        self.config.resource_columns.iter().find_map(|column| {
            row.get(column)
                .or_else(|| case.and_then(|values| values.get(column)))
                .cloned()
        })
    }
}

fn lookup_table<'w>(workbook: &'w Workbook, spec: &SheetSpec) -> Result<&'w Table, SchemaError> {
    workbook
        .table(&spec.name)
        .ok_or_else(|| SchemaError::MissingSheet {
            sheet: spec.name.clone(),
            available: workbook
                .table_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
}
