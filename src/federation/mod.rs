pub mod graph;

mod dispatch;
mod plan;

pub use graph::{Graph, OperGroup, SeriesRef, Stack};

use crate::catalog::{Catalog, GroupLibrary};
use crate::error::{PlotError, PlotResult};
use crate::plot::{
    combine_series, consolidate_series, ConsolidationType, OperatorType, Series, Summary,
};
use chrono::{DateTime, Utc};
use plan::{GroupPlan, Plan};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound on the buckets a single window may ask for.
pub const MAX_SAMPLE: usize = 10_000;

// One bucket per second of the values window
const VALUES_SAMPLE: usize = 61;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnresolvedMetric,
    BackendConflict,
    ConnectorFailure,
}

/// A unit of the request that degraded to "no data".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub sample: usize,
    #[serde(default)]
    pub percentiles: Vec<f64>,
}

impl PlotWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, sample: usize) -> Self {
        Self {
            start,
            end,
            sample,
            percentiles: Vec::new(),
        }
    }

    pub fn with_percentiles(mut self, percentiles: Vec<f64>) -> Self {
        self.percentiles = percentiles;
        self
    }

    pub fn validate(&self) -> PlotResult<()> {
        if self.sample == 0 {
            return Err(PlotError::InvalidArgument(
                "sample must be greater than zero".to_string(),
            ));
        }
        if self.sample > MAX_SAMPLE {
            return Err(PlotError::InvalidArgument(format!(
                "sample {} exceeds the maximum of {}",
                self.sample, MAX_SAMPLE
            )));
        }
        if self.end <= self.start {
            return Err(PlotError::InvalidArgument(format!(
                "end time {} is not after start time {}",
                self.end, self.start
            )));
        }
        if let Some(p) = self.percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
            return Err(PlotError::InvalidArgument(format!(
                "percentile {} is outside [0, 100]",
                p
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupPlots {
    pub name: String,
    #[serde(rename = "type")]
    pub operator: OperatorType,
    pub series: Vec<Series>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl GroupPlots {
    pub fn is_degraded(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackPlots {
    pub name: String,
    pub groups: Vec<GroupPlots>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederatedPlots {
    pub request_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub sample: usize,
    /// Bucket width in seconds, derived from the longest series.
    pub step: i64,
    pub stacks: Vec<StackPlots>,
}

impl FederatedPlots {
    pub fn series(&self) -> impl Iterator<Item = &Series> {
        self.stacks
            .iter()
            .flat_map(|stack| &stack.groups)
            .flat_map(|group| &group.series)
    }

    pub fn find(&self, name: &str) -> Option<&Series> {
        self.series().find(|series| series.name == name)
    }

    pub fn group(&self, name: &str) -> Option<&GroupPlots> {
        self.stacks
            .iter()
            .flat_map(|stack| &stack.groups)
            .find(|group| group.name == name)
    }

    pub fn diagnostics(&self) -> Vec<&Diagnostic> {
        self.stacks
            .iter()
            .flat_map(|stack| &stack.groups)
            .flat_map(|group| &group.diagnostics)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FederatedValues {
    pub values: BTreeMap<String, Summary>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolves graphs through the catalog and fans their queries out to the
/// connectors, one call per connector.
pub struct Federator {
    catalog: Arc<Catalog>,
    library: Arc<GroupLibrary>,
    query_timeout: Duration,
}

impl Federator {
    pub fn new(catalog: Arc<Catalog>, library: Arc<GroupLibrary>, query_timeout: Duration) -> Self {
        Self {
            catalog,
            library,
            query_timeout,
        }
    }

    pub async fn plots(&self, graph: &Graph, window: &PlotWindow) -> PlotResult<FederatedPlots> {
        window.validate()?;

        let request_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Federating graph {} over [{}, {}] ({})",
            graph.id, window.start, window.end, request_id
        );

        let snapshot = self.catalog.snapshot().await;
        let plan = Plan::build(graph, &snapshot, &self.library, window);
        debug!(
            "Graph {} planned into {} connector queries (catalog version {})",
            graph.id,
            plan.batches.len(),
            snapshot.version
        );

        let outcomes = dispatch::dispatch(&plan.batches, self.query_timeout, |connector, query| async move {
            connector.get_plots(&query).await
        })
        .await;

        let mut failures: HashMap<usize, Diagnostic> = HashMap::new();
        let mut received: HashMap<String, Series> = HashMap::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(series_list) => {
                    received.extend(series_list.into_iter().map(|series| (series.name.clone(), series)))
                }
                Err(e) => {
                    let connector = plan.batches[index].connector.name().to_string();
                    failures.insert(index, Diagnostic::from_error(connector, &e));
                }
            }
        }

        let mut stacks = Vec::with_capacity(plan.stacks.len());
        for stack in plan.stacks {
            let mut groups = Vec::with_capacity(stack.groups.len());
            for group in stack.groups {
                groups.push(assemble_group(group, &mut received, &failures, window)?);
            }
            stacks.push(StackPlots {
                name: stack.name,
                groups,
            });
        }

        let mut result = FederatedPlots {
            request_id,
            start: window.start,
            end: window.end,
            sample: window.sample,
            step: 0,
            stacks,
        };
        result.step = response_step(&result);

        info!(
            "Graph {} federated with {} series and {} diagnostics ({})",
            graph.id,
            result.series().count(),
            result.diagnostics().len(),
            result.request_id
        );

        Ok(result)
    }

    /// Statistics of the minute preceding `ref_time`, per series or combined
    /// group. They are computed on the same series `plots` would return.
    pub async fn values(
        &self,
        graph: &Graph,
        ref_time: DateTime<Utc>,
        percentiles: &[f64],
    ) -> PlotResult<FederatedValues> {
        // Buckets drop plots lying on the window end, so the window runs one
        // second past `ref_time`
        let window = PlotWindow::new(
            ref_time - chrono::Duration::minutes(1),
            ref_time + chrono::Duration::seconds(1),
            VALUES_SAMPLE,
        )
        .with_percentiles(percentiles.to_vec());

        debug!("Fetching values of graph {} at {}", graph.id, ref_time);
        let plots = self.plots(graph, &window).await?;

        let mut result = FederatedValues::default();
        for group in plots.stacks.into_iter().flat_map(|stack| stack.groups) {
            result.diagnostics.extend(group.diagnostics);
            for series in group.series {
                result.values.insert(series.name, series.summary);
            }
        }

        Ok(result)
    }
}

fn assemble_group(
    group: GroupPlan,
    received: &mut HashMap<String, Series>,
    failures: &HashMap<usize, Diagnostic>,
    window: &PlotWindow,
) -> PlotResult<GroupPlots> {
    let mut plots = GroupPlots {
        name: group.name.clone(),
        operator: group.operator,
        series: Vec::new(),
        diagnostics: group.diagnostics,
    };

    if let Some(failure) = group.batch.and_then(|index| failures.get(&index)) {
        plots.diagnostics.push(failure.clone());
        return Ok(plots);
    }

    let mut members = Vec::with_capacity(group.members.len());
    for member in &group.members {
        let mut series = received.remove(&member.key).unwrap_or_else(|| {
            debug!("Connector returned nothing for {}", member.name);
            Series::default()
        });
        series.name = member.name.clone();
        apply_scale(&mut series, member.scale);
        members.push(series);
    }

    if members.is_empty() {
        return Ok(plots);
    }

    // A lone member is not combined and keeps its own name
    let operator = if members.len() == 1 {
        OperatorType::None
    } else {
        group.operator
    };

    match operator {
        OperatorType::None => {
            for mut series in members {
                apply_scale(&mut series, group.scale);
                series.downsample(window.start, window.end, window.sample, ConsolidationType::Average)?;
                series.summarize(&window.percentiles);
                plots.series.push(series);
            }
        }
        operator => {
            let consolidated = consolidate_series(
                &members,
                window.start,
                window.end,
                window.sample,
                ConsolidationType::Average,
            )?;
            let mut combined = combine_series(&consolidated, operator)?;
            combined.name = group.name;
            apply_scale(&mut combined, group.scale);
            combined.summarize(&window.percentiles);
            plots.series.push(combined);
        }
    }

    Ok(plots)
}

fn apply_scale(series: &mut Series, scale: f64) {
    if scale != 0.0 {
        series.scale(scale);
    }
}

fn response_step(plots: &FederatedPlots) -> i64 {
    let longest = plots.series().map(Series::len).max().unwrap_or(0);
    if longest == 0 {
        return 0;
    }
    (plots.end - plots.start).num_seconds() / longest as i64
}
