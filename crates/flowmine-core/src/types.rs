use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use flowmine_parser::CellValue;
use serde::Serialize;

/// Identifier of one business transaction. Ids that both parse as integers
/// compare numerically, so `999` sorts before `1001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// `None` for null or blank cells.
    pub fn from_cell(cell: &CellValue) -> Option<Self> {
        cell.to_text()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl Ord for CaseId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for CaseId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One activity occurrence of a case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub case_id: CaseId,
    pub activity: String,
    pub timestamp: NaiveDateTime,
    pub resource: String,
    pub source_sheet: String,
    /// Position of the activity in the vocabulary; breaks timestamp ties.
    pub ordinal: usize,
    /// Attributes of the source row. They take precedence over the case-level
    /// values, so two ticket rows of one order keep their own `TicketID`.
    pub attributes: BTreeMap<String, String>,
}

impl Event {
    /// Sort key inside a case trace.
    pub fn trace_key(&self) -> (NaiveDateTime, usize) {
        (self.timestamp, self.ordinal)
    }
}
