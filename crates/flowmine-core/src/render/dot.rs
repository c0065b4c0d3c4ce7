use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use super::{edge_weight, DiagramRenderer, RenderError};
use crate::config::PipelineConfig;
use crate::dfg::DirectlyFollowsGraph;
use crate::summary::ProcessSummary;

const START_NODE: &str = "__start__";
const END_NODE: &str = "__end__";

/// Graphviz source for the graph. Nodes are numbered in first-occurrence order and
/// edges follow `sorted_edges`, so the text is stable for identical input.
pub fn to_dot(graph: &DirectlyFollowsGraph) -> String {
    let ids: HashMap<&str, String> = graph
        .activities()
        .iter()
        .enumerate()
        .map(|(index, activity)| (activity.as_str(), format!("n{index}")))
        .collect();
    let max = graph.max_frequency();

    let mut out = String::new();
    out.push_str("digraph process_map {\n");
    out.push_str("  rankdir=TB;\n");
    out.push_str("  node [shape=box, style=\"rounded,filled\", fillcolor=\"lightblue\", color=\"navy\", fontname=\"Helvetica\", fontsize=10];\n");
    out.push_str("  edge [fontname=\"Helvetica\", fontsize=9, color=\"darkgreen\"];\n");
    out.push('\n');

    out.push_str(&format!(
        "  {START_NODE} [label=\"\", shape=circle, width=0.25, fillcolor=\"forestgreen\"];\n"
    ));
    out.push_str(&format!(
        "  {END_NODE} [label=\"\", shape=doublecircle, width=0.2, fillcolor=\"orange\"];\n"
    ));

    let counts = graph.activity_counts();
    for activity in graph.activities() {
        let count = counts.get(activity).copied().unwrap_or(0);
        out.push_str(&format!(
            "  {} [label=\"{}\\n({count})\"];\n",
            ids[activity.as_str()],
            escape_dot(activity)
        ));
    }

    out.push('\n');

    for (activity, count) in graph.start_activities() {
        if let Some(id) = ids.get(activity.as_str()) {
            out.push_str(&format!(
                "  {START_NODE} -> {id} [label=\"{count}\", style=dashed];\n"
            ));
        }
    }

    for edge in graph.sorted_edges() {
        let (Some(source), Some(target)) = (
            ids.get(edge.source.as_str()),
            ids.get(edge.target.as_str()),
        ) else {
            continue;
        };
        out.push_str(&format!(
            "  {source} -> {target} [label=\"{}\", penwidth={:.2}];\n",
            edge.frequency,
            edge_weight(edge.frequency, max)
        ));
    }

    for (activity, count) in graph.end_activities() {
        if let Some(id) = ids.get(activity.as_str()) {
            out.push_str(&format!(
                "  {id} -> {END_NODE} [label=\"{count}\", style=dashed];\n"
            ));
        }
    }

    out.push_str("}\n");
    out
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Writes the DOT source and lays it out with the external `dot` binary.
#[derive(Debug, Clone)]
pub struct GraphvizRenderer {
    pub binary: String,
    pub format: String,
    pub dot_path: PathBuf,
    pub output_path: PathBuf,
}

impl GraphvizRenderer {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            binary: config.graphviz.binary.clone(),
            format: config.graphviz.format.clone(),
            dot_path: config.artifact_path(&config.artifacts.dot_source),
            output_path: config.primary_diagram_path(),
        }
    }
}

impl DiagramRenderer for GraphvizRenderer {
    fn name(&self) -> &'static str {
        "graphviz"
    }

    fn render(
        &self,
        graph: &DirectlyFollowsGraph,
        _summary: &ProcessSummary,
    ) -> Result<PathBuf, RenderError> {
        std::fs::write(&self.dot_path, to_dot(graph)).map_err(|source| RenderError::Io {
            path: self.dot_path.clone(),
            source,
        })?;
        debug!(path = %self.dot_path.display(), "Wrote DOT source");

        // A diagram left by an earlier run must not outlive a failed render.
        match std::fs::remove_file(&self.output_path) {
            Ok(()) => debug!(path = %self.output_path.display(), "Removed previous diagram"),
            Err(source) if source.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(RenderError::Io {
                    path: self.output_path.clone(),
                    source,
                })
            }
        }

        let output = Command::new(&self.binary)
            .arg(format!("-T{}", self.format))
            .arg(&self.dot_path)
            .arg("-o")
            .arg(&self.output_path)
            .output()
            .map_err(|source| match source.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    RenderError::BackendUnavailable {
                        binary: self.binary.clone(),
                        source,
                    }
                }
                _ => RenderError::Io {
                    path: PathBuf::from(&self.binary),
                    source,
                },
            })?;

        if !output.status.success() {
            return Err(RenderError::BackendFailed {
                binary: self.binary.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(self.output_path.clone())
    }
}
