use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::event_log::EventLog;
use crate::types::{CaseId, Event};

/// Time-ordered events of one case.
#[derive(Debug, Clone)]
pub struct CaseTrace<'a> {
    pub case_id: &'a CaseId,
    pub events: Vec<&'a Event>,
}

impl<'a> CaseTrace<'a> {
    pub fn activities(&self) -> Vec<&'a str> {
        self.events.iter().map(|event| event.activity.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Groups the log's events per case. Traces follow the first appearance of each case
/// in the log; cases without events come last as empty traces.
pub fn case_traces(log: &EventLog) -> Vec<CaseTrace<'_>> {
    let mut positions: HashMap<&CaseId, usize> = HashMap::new();
    let mut traces: Vec<CaseTrace<'_>> = Vec::new();

    for event in log.events() {
        let index = *positions.entry(&event.case_id).or_insert_with(|| {
            traces.push(CaseTrace {
                case_id: &event.case_id,
                events: Vec::new(),
            });
            traces.len() - 1
        });
        traces[index].events.push(event);
    }

    for case_id in log.cases() {
        if !positions.contains_key(case_id) {
            traces.push(CaseTrace {
                case_id,
                events: Vec::new(),
            });
        }
    }

    for trace in &mut traces {
        trace.events.sort_by_key(|event| event.trace_key());
    }

    traces
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub frequency: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceVariant {
    pub activities: Vec<String>,
    pub cases: u64,
}

/// Directly-follows graph: activities plus (source, target) -> observation counts.
#[derive(Debug, Clone, Default)]
pub struct DirectlyFollowsGraph {
    activities: Vec<String>,
    edges: BTreeMap<(String, String), u64>,
    start_activities: BTreeMap<String, u64>,
    end_activities: BTreeMap<String, u64>,
    activity_counts: BTreeMap<String, u64>,
    positions: BTreeMap<String, (u64, u64)>,
    variants: Vec<TraceVariant>,
    case_count: usize,
}

impl DirectlyFollowsGraph {
    pub fn discover(log: &EventLog) -> Self {
        let graph = Self::from_traces(&case_traces(log));
        info!(
            cases = graph.case_count(),
            activities = graph.activities().len(),
            edges = graph.edges().len(),
            transitions = graph.total_transitions(),
            "Discovered directly-follows graph"
        );
        graph
    }

    pub fn from_traces(traces: &[CaseTrace<'_>]) -> Self {
        let mut graph = Self {
            case_count: traces.len(),
            ..Self::default()
        };
        let mut variants: BTreeMap<Vec<String>, u64> = BTreeMap::new();

        for trace in traces {
            let activities = trace.activities();

            for (position, activity) in activities.iter().enumerate() {
                if !graph.activities.iter().any(|known| known.as_str() == *activity) {
                    graph.activities.push(activity.to_string());
                }
                *graph.activity_counts.entry(activity.to_string()).or_default() += 1;
                let slot = graph.positions.entry(activity.to_string()).or_default();
                slot.0 += position as u64;
                slot.1 += 1;
            }

            for pair in activities.windows(2) {
                *graph
                    .edges
                    .entry((pair[0].to_string(), pair[1].to_string()))
                    .or_default() += 1;
            }

            if let (Some(first), Some(last)) = (activities.first(), activities.last()) {
                *graph.start_activities.entry(first.to_string()).or_default() += 1;
                *graph.end_activities.entry(last.to_string()).or_default() += 1;
                *variants
                    .entry(activities.iter().map(|a| a.to_string()).collect())
                    .or_default() += 1;
            }
        }

        let mut variants: Vec<TraceVariant> = variants
            .into_iter()
            .map(|(activities, cases)| TraceVariant { activities, cases })
            .collect();
        variants.sort_by(|a, b| {
            b.cases
                .cmp(&a.cases)
                .then_with(|| a.activities.cmp(&b.activities))
        });
        graph.variants = variants;

        graph
    }

    /// Activities in order of first appearance.
    pub fn activities(&self) -> &[String] {
        &self.activities
    }

    pub fn edges(&self) -> &BTreeMap<(String, String), u64> {
        &self.edges
    }

    pub fn frequency(&self, source: &str, target: &str) -> u64 {
        self.edges
            .get(&(source.to_string(), target.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Edges by frequency descending, then source and target.
    pub fn sorted_edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .edges
            .iter()
            .map(|((source, target), frequency)| Edge {
                source: source.clone(),
                target: target.clone(),
                frequency: *frequency,
            })
            .collect();
        edges.sort_by(|a, b| {
            (Reverse(a.frequency), &a.source, &a.target).cmp(&(
                Reverse(b.frequency),
                &b.source,
                &b.target,
            ))
        });
        edges
    }

    pub fn start_activities(&self) -> &BTreeMap<String, u64> {
        &self.start_activities
    }

    pub fn end_activities(&self) -> &BTreeMap<String, u64> {
        &self.end_activities
    }

    pub fn activity_counts(&self) -> &BTreeMap<String, u64> {
        &self.activity_counts
    }

    /// Average zero-based position of the activity within the traces it occurs in.
    pub fn mean_position(&self, activity: &str) -> Option<f64> {
        self.positions
            .get(activity)
            .filter(|(_, count)| *count > 0)
            .map(|(sum, count)| *sum as f64 / *count as f64)
    }

    pub fn variants(&self) -> &[TraceVariant] {
        &self.variants
    }

    /// All cases, including those whose trace is empty or a single event.
    pub fn case_count(&self) -> usize {
        self.case_count
    }

    pub fn total_transitions(&self) -> u64 {
        self.edges.values().sum()
    }

    pub fn max_frequency(&self) -> u64 {
        self.edges.values().copied().max().unwrap_or(0)
    }

    /// Edge table in `sorted_edges` order.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let edges = self.sorted_edges();
        let sources: Vec<&str> = edges.iter().map(|edge| edge.source.as_str()).collect();
        let targets: Vec<&str> = edges.iter().map(|edge| edge.target.as_str()).collect();
        let frequencies: Vec<i64> = edges.iter().map(|edge| edge.frequency as i64).collect();

        DataFrame::new(vec![
            Series::new("source".into(), sources).into(),
            Series::new("target".into(), targets).into(),
            Series::new("frequency".into(), frequencies).into(),
        ])
    }
}
