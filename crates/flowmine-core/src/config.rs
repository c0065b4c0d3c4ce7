use std::collections::HashSet;
use std::path::{Path, PathBuf};

use flowmine_parser::normalize_sheet_name;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_INPUT: &str = "FLOWMINE_INPUT";
pub const ENV_OUTPUT_DIR: &str = "FLOWMINE_OUTPUT_DIR";
pub const ENV_GRAPHVIZ_BIN: &str = "FLOWMINE_GRAPHVIZ_BIN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a run needs: where to read, where to write, and how sheets map onto
/// cases, activities and attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub artifacts: ArtifactNames,
    pub skip_sheets: Vec<String>,
    /// Also treat unlisted datetime columns of configured sheets as activities.
    pub discover_date_columns: bool,
    /// Case attributes consulted, in order, when an event's own sheet has no resource.
    pub resource_columns: Vec<String>,
    pub default_resource: String,
    pub graphviz: GraphvizConfig,
    pub sheets: Vec<SheetSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactNames {
    pub database: String,
    pub event_log: String,
    pub event_log_parquet: String,
    pub edges: String,
    pub dot_source: String,
    pub primary_diagram_stem: String,
    pub fallback_diagram: String,
    pub summary: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            database: "process_data.db".to_string(),
            event_log: "event_log.csv".to_string(),
            event_log_parquet: "event_log.parquet".to_string(),
            edges: "dfg_edges.csv".to_string(),
            dot_source: "process_map.dot".to_string(),
            primary_diagram_stem: "process_map".to_string(),
            fallback_diagram: "process_map_fallback.svg".to_string(),
            summary: "run_summary.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphvizConfig {
    pub binary: String,
    pub format: String,
}

impl Default for GraphvizConfig {
    fn default() -> Self {
        Self {
            binary: "dot".to_string(),
            format: "png".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetSpec {
    pub name: String,
    pub join: SheetJoin,
    #[serde(default)]
    pub activities: Vec<ActivitySpec>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub resource_column: Option<String>,
}

/// How a sheet's rows are attached to cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum SheetJoin {
    /// Defines the case universe.
    Primary { case_column: String },
    /// Rows carry the case id directly; unknown ids are rejected.
    Case { case_column: String },
    /// Rows are found through a case attribute that holds their key.
    Lookup {
        key_column: String,
        via_attribute: String,
    },
}

impl SheetJoin {
    /// Column holding the sheet's natural identifier.
    pub fn key_column(&self) -> &str {
        match self {
            SheetJoin::Primary { case_column } | SheetJoin::Case { case_column } => case_column,
            SheetJoin::Lookup { key_column, .. } => key_column,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySpec {
    pub column: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl ActivitySpec {
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
            label: None,
        }
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.column)
    }
}

impl SheetSpec {
    fn new(name: &str, join: SheetJoin, activities: &[&str], attributes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            join,
            activities: activities.iter().map(|column| ActivitySpec::new(column)).collect(),
            attributes: attributes.iter().map(|column| column.to_string()).collect(),
            resource_column: None,
        }
    }

    fn with_resource(mut self, column: &str) -> Self {
        self.resource_column = Some(column.to_string());
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("sample_data.xlsx"),
            output_dir: PathBuf::from("output"),
            artifacts: ArtifactNames::default(),
            skip_sheets: vec!["DB structure".to_string()],
            discover_date_columns: false,
            resource_columns: vec![
                "Warehouse".to_string(),
                "DeliveryCompany".to_string(),
                "SupportTeam".to_string(),
            ],
            default_resource: "Unknown".to_string(),
            graphviz: GraphvizConfig::default(),
            sheets: vec![
                SheetSpec::new(
                    "ordertable",
                    SheetJoin::Primary {
                        case_column: "OrderID".to_string(),
                    },
                    &["OrderDate", "PickedDate", "PackedDate"],
                    &["CustomerID", "OrderDetails", "OrderTotal", "Warehouse"],
                )
                .with_resource("Warehouse"),
                SheetSpec::new(
                    "customertable",
                    SheetJoin::Lookup {
                        key_column: "CustomerID".to_string(),
                        via_attribute: "CustomerID".to_string(),
                    },
                    &[],
                    &["ShippingAddress", "SignUpDate", "HasLoyaltyCard"],
                ),
                SheetSpec::new(
                    "shippingtable",
                    SheetJoin::Case {
                        case_column: "OrderID".to_string(),
                    },
                    &["PickUpDate", "DeliveredDate"],
                    &["DeliveryCompany", "ShipmentID"],
                )
                .with_resource("DeliveryCompany"),
                SheetSpec::new(
                    "supporttable",
                    SheetJoin::Case {
                        case_column: "OrderID".to_string(),
                    },
                    &["TicketReceived", "TicketResolved", "RefundIssued"],
                    &["TicketID", "SupportTeam", "IssueCategory", "CustomerNPS"],
                )
                .with_resource("SupportTeam"),
            ],
        }
    }
}

impl PipelineConfig {
    /// Defaults, overlaid with the TOML file when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Applies `FLOWMINE_*` overrides. `lookup` is `std::env::var` in the binary.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(input) = lookup(ENV_INPUT).filter(|value| !value.is_empty()) {
            self.input = PathBuf::from(input);
        }
        if let Some(output_dir) = lookup(ENV_OUTPUT_DIR).filter(|value| !value.is_empty()) {
            self.output_dir = PathBuf::from(output_dir);
        }
        if let Some(binary) = lookup(ENV_GRAPHVIZ_BIN).filter(|value| !value.is_empty()) {
            self.graphviz.binary = binary;
        }
    }

    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    pub fn primary_diagram_path(&self) -> PathBuf {
        self.artifact_path(&format!(
            "{}.{}",
            self.artifacts.primary_diagram_stem, self.graphviz.format
        ))
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetSpec> {
        let wanted = normalize_sheet_name(name);
        self.sheets
            .iter()
            .find(|sheet| normalize_sheet_name(&sheet.name) == wanted)
    }

    pub fn primary_sheet(&self) -> Option<&SheetSpec> {
        self.sheets
            .iter()
            .find(|sheet| matches!(sheet.join, SheetJoin::Primary { .. }))
    }

    /// Attribute columns across all sheets in declaration order, without repeats.
    pub fn attribute_columns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.sheets
            .iter()
            .flat_map(|sheet| sheet.attributes.iter())
            .filter(|name| seen.insert(name.to_string()))
            .cloned()
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let primaries = self
            .sheets
            .iter()
            .filter(|sheet| matches!(sheet.join, SheetJoin::Primary { .. }))
            .count();
        if primaries != 1 {
            return Err(ConfigError::Invalid(format!(
                "exactly one primary sheet is required, found {primaries}"
            )));
        }

        if self.graphviz.format.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "graphviz output format must not be empty".to_string(),
            ));
        }

        let mut sheet_names = HashSet::new();
        let mut labels = HashSet::new();
        let mut provided_attributes: HashSet<&str> = HashSet::new();

        for sheet in &self.sheets {
            let normalized = normalize_sheet_name(&sheet.name);
            if normalized.is_empty() {
                return Err(ConfigError::Invalid("sheet name must not be empty".to_string()));
            }
            if !sheet_names.insert(normalized) {
                return Err(ConfigError::Invalid(format!(
                    "sheet '{}' is configured more than once",
                    sheet.name
                )));
            }

            if let SheetJoin::Lookup { via_attribute, .. } = &sheet.join {
                if !provided_attributes.contains(via_attribute.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "lookup sheet '{}' joins via '{}', which no earlier sheet provides as an attribute",
                        sheet.name, via_attribute
                    )));
                }
            }

            for activity in &sheet.activities {
                let label = activity.label().trim();
                if label.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "sheet '{}' has an activity with an empty label",
                        sheet.name
                    )));
                }
                if !labels.insert(label.to_string()) {
                    return Err(ConfigError::Invalid(format!(
                        "activity label '{label}' is used more than once"
                    )));
                }
            }

            provided_attributes.extend(sheet.attributes.iter().map(String::as_str));
        }

        Ok(())
    }
}
