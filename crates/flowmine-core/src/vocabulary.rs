use std::collections::HashSet;

use flowmine_parser::{ColumnKind, LoadError, Table, Workbook};
use thiserror::Error;
use tracing::debug;

use crate::config::PipelineConfig;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("input has no sheet '{sheet}' (found: {})", available.join(", "))]
    MissingSheet {
        sheet: String,
        available: Vec<String>,
    },
    #[error("sheet '{sheet}' has no column '{column}'")]
    MissingColumn { sheet: String, column: String },
    #[error("activity column '{column}' in sheet '{sheet}' holds {kind} values, not timestamps")]
    NotTemporal {
        sheet: String,
        column: String,
        kind: ColumnKind,
    },
    #[error(transparent)]
    Load(#[from] LoadError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityDef {
    pub label: String,
    pub sheet: String,
    pub column: String,
    pub ordinal: usize,
}

/// The fixed set of date-bearing columns that become activities, in tie-break order.
#[derive(Debug, Clone, Default)]
pub struct ActivityVocabulary {
    activities: Vec<ActivityDef>,
}

impl ActivityVocabulary {
    /// Builds the vocabulary from `config` and checks it against the loaded sheets.
    pub fn resolve(config: &PipelineConfig, workbook: &Workbook) -> Result<Self, SchemaError> {
        let mut activities: Vec<ActivityDef> = Vec::new();
        let mut labels: HashSet<String> = HashSet::new();

        for sheet in &config.sheets {
            let table = workbook
                .table(&sheet.name)
                .ok_or_else(|| SchemaError::MissingSheet {
                    sheet: sheet.name.clone(),
                    available: workbook
                        .table_names()
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                })?;

            let mut claimed: HashSet<&str> = HashSet::new();
            let key = sheet.join.key_column();
            require_column(table, key)?;
            claimed.insert(key);

            for attribute in &sheet.attributes {
                require_column(table, attribute)?;
                claimed.insert(attribute);
            }
            if let Some(resource) = &sheet.resource_column {
                require_column(table, resource)?;
                claimed.insert(resource);
            }

            for activity in &sheet.activities {
                require_column(table, &activity.column)?;
                require_temporal(table, &activity.column)?;
                claimed.insert(&activity.column);
                labels.insert(activity.label().to_string());
                activities.push(ActivityDef {
                    label: activity.label().to_string(),
                    sheet: table.name.clone(),
                    column: activity.column.clone(),
                    ordinal: activities.len(),
                });
            }

            if config.discover_date_columns {
                for column in table.column_names() {
                    if claimed.contains(column.as_str())
                        || table.column_kind(&column)? != ColumnKind::Datetime
                    {
                        continue;
                    }
                    if !labels.insert(column.clone()) {
                        debug!(sheet = %table.name, column = %column, "Discovered date column shadows an existing label; ignoring");
                        continue;
                    }
                    debug!(sheet = %table.name, column = %column, "Discovered date column");
                    activities.push(ActivityDef {
                        label: column.clone(),
                        sheet: table.name.clone(),
                        column,
                        ordinal: activities.len(),
                    });
                }
            }
        }

        Ok(Self { activities })
    }

    pub fn activities(&self) -> &[ActivityDef] {
        &self.activities
    }

    pub fn for_sheet(&self, sheet: &str) -> Vec<&ActivityDef> {
        self.activities
            .iter()
            .filter(|activity| activity.sheet == sheet)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

fn require_column(table: &Table, column: &str) -> Result<(), SchemaError> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(SchemaError::MissingColumn {
            sheet: table.name.clone(),
            column: column.to_string(),
        })
    }
}

// An all-empty column loads as text; it simply yields no events.
fn require_temporal(table: &Table, column: &str) -> Result<(), SchemaError> {
    let kind = table.column_kind(column)?;
    if kind == ColumnKind::Datetime {
        return Ok(());
    }
    if kind == ColumnKind::Text && table.values(column)?.iter().all(|value| value.is_null()) {
        return Ok(());
    }
    Err(SchemaError::NotTemporal {
        sheet: table.name.clone(),
        column: column.to_string(),
        kind,
    })
}
