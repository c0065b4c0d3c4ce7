pub mod config;
pub mod dfg;
pub mod error;
pub mod event_log;
pub mod outputs;
pub mod pipeline;
pub mod render;
pub mod store;
pub mod summary;
pub mod types;
pub mod vocabulary;

pub use config::PipelineConfig;
pub use dfg::{DirectlyFollowsGraph, Edge};
pub use error::{PipelineError, Result};
pub use event_log::{EventLog, EventLogBuilder};
pub use pipeline::{run, RunReport};
pub use summary::ProcessSummary;
pub use types::{CaseId, Event};
pub use vocabulary::ActivityVocabulary;
