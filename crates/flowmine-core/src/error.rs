use std::path::PathBuf;

use flowmine_parser::LoadError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::event_log::{EventLogError, ValidationError};
use crate::outputs::ArtifactError;
use crate::render::RenderError;
use crate::store::StoreError;
use crate::vocabulary::SchemaError;

/// Fatal failures of a pipeline run. A failing primary renderer is not fatal and
/// surfaces through the run report instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input could not be loaded: {0}")]
    Load(#[from] LoadError),

    #[error("Input does not match the configured layout: {0}")]
    Schema(#[from] SchemaError),

    #[error("Input failed validation: {0}")]
    Validation(#[from] ValidationError),

    #[error("Staging store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Diagram rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Failed to write artifact: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Cannot create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<EventLogError> for PipelineError {
    fn from(err: EventLogError) -> Self {
        match err {
            EventLogError::Schema(err) => PipelineError::Schema(err),
            EventLogError::Validation(err) => PipelineError::Validation(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
