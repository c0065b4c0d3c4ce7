use std::path::PathBuf;

use chrono::NaiveDate;
use flowmine_core::render::{
    render_with_fallback, to_dot, to_svg, DiagramRenderer, FallbackSvgRenderer, GraphvizRenderer,
    PrimaryRender, RenderError,
};
use flowmine_core::{CaseId, DirectlyFollowsGraph, Event, EventLog, ProcessSummary};

fn log() -> EventLog {
    let event = |case: &str, activity: &str, ordinal: usize, day: u32| Event {
        case_id: CaseId::new(case),
        activity: activity.to_string(),
        timestamp: NaiveDate::from_ymd_opt(2024, 4, day)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .expect("valid day"),
        resource: "Unknown".to_string(),
        source_sheet: "orders".to_string(),
        ordinal,
        attributes: Default::default(),
    };
    EventLog::from_events(vec![
        event("1", "Placed", 0, 1),
        event("1", "Picked", 1, 2),
        event("1", "Shipped", 2, 3),
        event("2", "Placed", 0, 1),
        event("2", "Picked", 1, 2),
        event("2", "Placed", 0, 4),
        event("3", "Placed", 0, 2),
        event("3", "Shipped", 2, 9),
    ])
}

struct Broken;

impl DiagramRenderer for Broken {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn render(
        &self,
        _graph: &DirectlyFollowsGraph,
        _summary: &ProcessSummary,
    ) -> Result<PathBuf, RenderError> {
        Err(RenderError::BackendFailed {
            binary: "broken".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "syntax error".to_string(),
        })
    }
}

#[test]
fn dot_source_labels_every_edge() {
    let log = log();
    let graph = DirectlyFollowsGraph::discover(&log);
    let dot = to_dot(&graph);

    for edge in graph.sorted_edges() {
        assert!(dot.contains(&format!("[label=\"{}\", penwidth=", edge.frequency)));
    }
    assert_eq!(dot.matches("penwidth=5.00").count(), 1);
    assert!(dot.contains("Placed\\n(4)"));
    assert!(dot.ends_with("}\n"));
}

#[test]
fn svg_draws_nodes_labels_and_stats() {
    let log = log();
    let graph = DirectlyFollowsGraph::discover(&log);
    let summary = ProcessSummary::compute(&log, &graph);
    let svg = to_svg(&graph, &summary);

    assert!(svg.starts_with("<svg"));
    assert!(svg.contains(">Placed</text>"));
    assert!(svg.contains("(4 events)"));
    assert!(svg.contains("<title>Placed -> Picked: 2</title>"));
    assert!(svg.contains("<title>Picked -> Placed: 1</title>"));
    assert!(svg.contains("Total Cases: 3"));
    assert!(svg.contains("Time Span: 8 days"));
    assert_eq!(svg, to_svg(&graph, &summary));
}

#[test]
fn missing_layout_engine_falls_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = log();
    let graph = DirectlyFollowsGraph::discover(&log);
    let summary = ProcessSummary::compute(&log, &graph);

    let primary = GraphvizRenderer {
        binary: dir.path().join("no-such-dot").display().to_string(),
        format: "png".to_string(),
        dot_path: dir.path().join("process_map.dot"),
        output_path: dir.path().join("process_map.png"),
    };
    let fallback = FallbackSvgRenderer {
        output_path: dir.path().join("process_map_fallback.svg"),
    };

    let outcome =
        render_with_fallback(&primary, &fallback, &graph, &summary).expect("fallback renders");

    assert!(matches!(
        outcome.primary,
        PrimaryRender::Failed(RenderError::BackendUnavailable { .. })
    ));
    assert!(outcome.primary_path().is_none());
    assert!(outcome.fallback.exists());
    assert!(!dir.path().join("process_map.png").exists());
    assert_eq!(graph.total_transitions(), 5);
}

#[test]
fn fallback_failure_is_an_error() {
    let log = log();
    let graph = DirectlyFollowsGraph::discover(&log);
    let summary = ProcessSummary::compute(&log, &graph);

    let result = render_with_fallback(&Broken, &Broken, &graph, &summary);
    assert!(matches!(result, Err(RenderError::BackendFailed { .. })));
}
