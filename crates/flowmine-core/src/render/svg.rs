use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use super::{edge_weight, DiagramRenderer, RenderError};
use crate::config::PipelineConfig;
use crate::dfg::DirectlyFollowsGraph;
use crate::summary::ProcessSummary;

const WIDTH: f64 = 960.0;
const NODE_WIDTH: f64 = 300.0;
const NODE_HEIGHT: f64 = 54.0;
const ROW_SPACING: f64 = 96.0;
const TOP: f64 = 90.0;
const NODE_LEFT: f64 = (WIDTH - NODE_WIDTH) / 2.0;
const NODE_RIGHT: f64 = NODE_LEFT + NODE_WIDTH;
const STATS_HEIGHT: f64 = 130.0;

/// Layered layout without external tools: one activity per row, ordered by the
/// average position the activity takes in its traces.
#[derive(Debug, Clone)]
pub struct FallbackSvgRenderer {
    pub output_path: PathBuf,
}

impl FallbackSvgRenderer {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            output_path: config.artifact_path(&config.artifacts.fallback_diagram),
        }
    }
}

impl DiagramRenderer for FallbackSvgRenderer {
    fn name(&self) -> &'static str {
        "fallback-svg"
    }

    fn render(
        &self,
        graph: &DirectlyFollowsGraph,
        summary: &ProcessSummary,
    ) -> Result<PathBuf, RenderError> {
        std::fs::write(&self.output_path, to_svg(graph, summary)).map_err(|source| {
            RenderError::Io {
                path: self.output_path.clone(),
                source,
            }
        })?;
        Ok(self.output_path.clone())
    }
}

fn layer_order(graph: &DirectlyFollowsGraph) -> Vec<&str> {
    let mut activities: Vec<(&str, f64)> = graph
        .activities()
        .iter()
        .map(|activity| {
            let position = graph.mean_position(activity).unwrap_or(f64::MAX);
            (activity.as_str(), position)
        })
        .collect();
    activities.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    activities.into_iter().map(|(activity, _)| activity).collect()
}

fn row_center(row: usize) -> f64 {
    TOP + row as f64 * ROW_SPACING + NODE_HEIGHT / 2.0
}

pub fn to_svg(graph: &DirectlyFollowsGraph, summary: &ProcessSummary) -> String {
    let order = layer_order(graph);
    let rows: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(row, activity)| (*activity, row))
        .collect();
    let stats_top = TOP + order.len() as f64 * ROW_SPACING + 10.0;
    let height = stats_top + STATS_HEIGHT + 20.0;
    let max = graph.max_frequency();

    let mut out = String::new();
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH:.0}" height="{height:.0}" viewBox="0 0 {WIDTH:.0} {height:.0}" font-family="Helvetica, Arial, sans-serif">"#
    );
    out.push_str(
        r#"  <defs><marker id="arrow" viewBox="0 0 10 10" refX="9" refY="5" markerWidth="6" markerHeight="6" orient="auto-start-reverse"><path d="M 0 0 L 10 5 L 0 10 z" fill="darkgreen"/></marker></defs>"#,
    );
    out.push('\n');
    let _ = writeln!(
        out,
        r#"  <rect x="0" y="0" width="{WIDTH:.0}" height="{height:.0}" fill="white"/>"#
    );
    let _ = writeln!(
        out,
        r#"  <text x="{:.1}" y="40" text-anchor="middle" font-size="22" font-weight="bold">Process Flow Discovery Results</text>"#,
        WIDTH / 2.0
    );

    out.push_str("  <g id=\"edges\">\n");
    for edge in graph.sorted_edges() {
        let (Some(&from), Some(&to)) = (
            rows.get(edge.source.as_str()),
            rows.get(edge.target.as_str()),
        ) else {
            continue;
        };
        let width = edge_weight(edge.frequency, max);
        let (path, label_x, label_y) = edge_geometry(from, to);
        let _ = writeln!(
            out,
            r#"    <path d="{path}" fill="none" stroke="darkgreen" stroke-opacity="0.8" stroke-width="{width:.2}" marker-end="url(#arrow)"><title>{} -> {}: {}</title></path>"#,
            xml_escape(&edge.source),
            xml_escape(&edge.target),
            edge.frequency
        );
        let _ = writeln!(
            out,
            r##"    <rect x="{:.1}" y="{:.1}" width="28" height="18" rx="4" fill="#fff176" fill-opacity="0.9"/>"##,
            label_x - 14.0,
            label_y - 9.0
        );
        let _ = writeln!(
            out,
            r#"    <text x="{label_x:.1}" y="{:.1}" text-anchor="middle" font-size="11" font-weight="bold">{}</text>"#,
            label_y + 4.0,
            edge.frequency
        );
    }
    out.push_str("  </g>\n");

    out.push_str("  <g id=\"activities\">\n");
    let counts = graph.activity_counts();
    for (row, activity) in order.iter().enumerate() {
        let top = TOP + row as f64 * ROW_SPACING;
        let center = row_center(row);
        let count = counts.get(*activity).copied().unwrap_or(0);
        let _ = writeln!(
            out,
            r#"    <rect x="{NODE_LEFT:.1}" y="{top:.1}" width="{NODE_WIDTH:.1}" height="{NODE_HEIGHT:.1}" rx="8" fill="lightblue" stroke="navy" stroke-width="2"/>"#
        );
        let _ = writeln!(
            out,
            r#"    <text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="14" font-weight="bold">{}</text>"#,
            WIDTH / 2.0,
            center - 3.0,
            xml_escape(activity)
        );
        let _ = writeln!(
            out,
            r#"    <text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="11">({count} events)</text>"#,
            WIDTH / 2.0,
            center + 15.0
        );
    }
    out.push_str("  </g>\n");

    let lines = [
        "Process Mining Results".to_string(),
        format!("Total Cases: {}", summary.total_cases),
        format!("Total Events: {}", summary.total_events),
        format!("Activity Types: {}", summary.activity_types),
        format!("Transitions: {}", summary.total_transitions),
        format!("Time Span: {} days", summary.time_span_days),
    ];
    let _ = writeln!(
        out,
        r##"  <rect x="20" y="{stats_top:.1}" width="280" height="{STATS_HEIGHT:.1}" rx="8" fill="#fffde7" stroke="#c8b900"/>"##
    );
    for (index, line) in lines.iter().enumerate() {
        let weight = if index == 0 { "bold" } else { "normal" };
        let _ = writeln!(
            out,
            r#"  <text x="34" y="{:.1}" font-size="13" font-weight="{weight}">{}</text>"#,
            stats_top + 24.0 + index as f64 * 19.0,
            xml_escape(line)
        );
    }

    out.push_str("</svg>\n");
    out
}

/// Cubic path between two rows plus the point where its frequency label goes.
/// Downward edges arc on the right, upward edges on the left, self loops on the right.
fn edge_geometry(from: usize, to: usize) -> (String, f64, f64) {
    let y0 = row_center(from);
    let y1 = row_center(to);

    if from == to {
        let x = NODE_RIGHT;
        let reach = x + 70.0;
        let path = format!(
            "M {x:.1} {:.1} C {reach:.1} {:.1}, {reach:.1} {:.1}, {x:.1} {:.1}",
            y0 - 12.0,
            y0 - 40.0,
            y0 + 40.0,
            y0 + 12.0
        );
        return (path, x + 52.0, y0);
    }

    let span = from.abs_diff(to) as f64;
    let (x, control) = if to > from {
        (NODE_RIGHT, NODE_RIGHT + 40.0 + 30.0 * span)
    } else {
        (NODE_LEFT, NODE_LEFT - 40.0 - 30.0 * span)
    };
    let path = format!("M {x:.1} {y0:.1} C {control:.1} {y0:.1}, {control:.1} {y1:.1}, {x:.1} {y1:.1}");
    // Bezier midpoint at t = 0.5.
    let label_x = (2.0 * x + 6.0 * control) / 8.0;
    (path, label_x, (y0 + y1) / 2.0)
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
