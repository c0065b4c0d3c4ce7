//! Diagram rendering: a Graphviz primary backend and a built-in SVG fallback.

mod dot;
mod svg;

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::dfg::DirectlyFollowsGraph;
use crate::summary::ProcessSummary;

pub use dot::{to_dot, GraphvizRenderer};
pub use svg::{to_svg, FallbackSvgRenderer};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("layout engine '{binary}' is not available: {source}")]
    BackendUnavailable {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("layout engine '{binary}' exited with {status}: {stderr}")]
    BackendFailed {
        binary: String,
        status: String,
        stderr: String,
    },
    #[error("cannot write diagram {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait DiagramRenderer {
    fn name(&self) -> &'static str;

    /// Writes the diagram and returns its path. Must not alter `graph`.
    fn render(
        &self,
        graph: &DirectlyFollowsGraph,
        summary: &ProcessSummary,
    ) -> Result<PathBuf, RenderError>;
}

/// Stroke width for an edge: 1 for the rarest possible edge, 5 for the most frequent.
pub fn edge_weight(frequency: u64, max_frequency: u64) -> f64 {
    if max_frequency == 0 {
        return 1.0;
    }
    1.0 + 4.0 * frequency as f64 / max_frequency as f64
}

#[derive(Debug)]
pub enum PrimaryRender {
    Rendered(PathBuf),
    Failed(RenderError),
}

#[derive(Debug)]
pub struct RenderOutcome {
    pub primary: PrimaryRender,
    pub fallback: PathBuf,
}

impl RenderOutcome {
    pub fn primary_path(&self) -> Option<&PathBuf> {
        match &self.primary {
            PrimaryRender::Rendered(path) => Some(path),
            PrimaryRender::Failed(_) => None,
        }
    }
}

/// Tries `primary`, then always runs `fallback`. Only a fallback failure is an error.
pub fn render_with_fallback(
    primary: &dyn DiagramRenderer,
    fallback: &dyn DiagramRenderer,
    graph: &DirectlyFollowsGraph,
    summary: &ProcessSummary,
) -> Result<RenderOutcome, RenderError> {
    let primary = match primary.render(graph, summary) {
        Ok(path) => {
            info!(renderer = primary.name(), path = %path.display(), "Rendered process map");
            PrimaryRender::Rendered(path)
        }
        Err(err) => {
            warn!(renderer = primary.name(), error = %err, "Primary renderer failed; relying on fallback diagram");
            PrimaryRender::Failed(err)
        }
    };

    let fallback_path = fallback.render(graph, summary)?;
    info!(renderer = fallback.name(), path = %fallback_path.display(), "Rendered fallback process map");

    Ok(RenderOutcome {
        primary,
        fallback: fallback_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_weight_scales_with_frequency() {
        assert_eq!(edge_weight(4, 4), 5.0);
        assert_eq!(edge_weight(2, 4), 3.0);
        assert!(edge_weight(1, 4) < edge_weight(3, 4));
        assert_eq!(edge_weight(0, 0), 1.0);
    }
}
