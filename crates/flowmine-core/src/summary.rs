use std::collections::BTreeMap;

use flowmine_parser::TIMESTAMP_FORMAT;
use serde::Serialize;
use tracing::info;

use crate::dfg::{DirectlyFollowsGraph, TraceVariant};
use crate::event_log::EventLog;

const TOP_VARIANTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityCount {
    pub activity: String,
    pub count: u64,
}

/// Run statistics. Contains nothing time-of-run dependent, so identical input
/// serializes identically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSummary {
    pub total_cases: usize,
    pub cases_with_events: usize,
    pub total_events: usize,
    pub average_events_per_case: f64,
    pub activity_types: usize,
    pub activity_counts: BTreeMap<String, u64>,
    pub most_common_activity: Option<ActivityCount>,
    pub least_common_activity: Option<ActivityCount>,
    pub first_event: Option<String>,
    pub last_event: Option<String>,
    pub time_span_days: i64,
    pub start_activities: BTreeMap<String, u64>,
    pub end_activities: BTreeMap<String, u64>,
    pub variant_count: usize,
    pub top_variants: Vec<TraceVariant>,
    pub edge_count: usize,
    pub total_transitions: u64,
}

impl ProcessSummary {
    pub fn compute(log: &EventLog, graph: &DirectlyFollowsGraph) -> Self {
        let total_cases = graph.case_count();
        let total_events = log.len();
        let average_events_per_case = if total_cases == 0 {
            0.0
        } else {
            total_events as f64 / total_cases as f64
        };

        let counts = graph.activity_counts();
        let range = log.time_range();

        Self {
            total_cases,
            cases_with_events: graph.start_activities().values().sum::<u64>() as usize,
            total_events,
            average_events_per_case,
            activity_types: graph.activities().len(),
            activity_counts: counts.clone(),
            most_common_activity: pick(counts, |candidate, best| candidate > best),
            least_common_activity: pick(counts, |candidate, best| candidate < best),
            first_event: range.map(|(first, _)| first.format(TIMESTAMP_FORMAT).to_string()),
            last_event: range.map(|(_, last)| last.format(TIMESTAMP_FORMAT).to_string()),
            time_span_days: range.map_or(0, |(first, last)| (last - first).num_days()),
            start_activities: graph.start_activities().clone(),
            end_activities: graph.end_activities().clone(),
            variant_count: graph.variants().len(),
            top_variants: graph.variants().iter().take(TOP_VARIANTS).cloned().collect(),
            edge_count: graph.edges().len(),
            total_transitions: graph.total_transitions(),
        }
    }

    pub fn log(&self) {
        info!(
            cases = self.total_cases,
            events = self.total_events,
            avg_events_per_case = %format_args!("{:.1}", self.average_events_per_case),
            time_span_days = self.time_span_days,
            "Process analytics"
        );
        if let Some(most) = &self.most_common_activity {
            info!(activity = %most.activity, count = most.count, "Most common activity");
        }
        if let Some(least) = &self.least_common_activity {
            info!(activity = %least.activity, count = least.count, "Least common activity");
        }
        info!(
            variants = self.variant_count,
            edges = self.edge_count,
            transitions = self.total_transitions,
            "Trace variants"
        );
    }
}

// Counts iterate in name order, so the first strict winner breaks ties by name.
fn pick<F>(counts: &BTreeMap<String, u64>, better: F) -> Option<ActivityCount>
where
    F: Fn(u64, u64) -> bool,
{
    let mut best: Option<(&String, u64)> = None;
    for (activity, &count) in counts {
        match best {
            Some((_, current)) if !better(count, current) => {}
            _ => best = Some((activity, count)),
        }
    }
    best.map(|(activity, count)| ActivityCount {
        activity: activity.clone(),
        count,
    })
}
