use crate::error::{PlotError, PlotResult};
use crate::federation::{
    Diagnostic, FederatedPlots, Graph, OperGroup, PlotWindow, SeriesRef, Stack, StackPlots,
};
use crate::plot::OperatorType;
use crate::time::apply_range;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RANGE: &str = "-1h";

/// Inbound plot request. `graph` carries an inline definition, `origin` +
/// `source` + `metric` reference a single metric, and `id` names a stored
/// graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlotRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub graph: Option<Graph>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub range: String,
    #[serde(default)]
    pub sample: usize,
    #[serde(default)]
    pub percentiles: Vec<f64>,
}

impl PlotRequest {
    pub fn for_graph(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn for_metric(
        origin: impl Into<String>,
        source: impl Into<String>,
        metric: impl Into<String>,
    ) -> Self {
        Self {
            origin: Some(origin.into()),
            source: Some(source.into()),
            metric: Some(metric.into()),
            ..Default::default()
        }
    }

    /// Single-series graph for an ad hoc metric reference, if the request
    /// carries one. `source` and `metric` may name `group:` entries.
    pub fn metric_graph(&self) -> PlotResult<Option<Graph>> {
        let (origin, source, metric) = match (&self.origin, &self.source, &self.metric) {
            (None, None, None) => return Ok(None),
            (Some(origin), Some(source), Some(metric))
                if !origin.is_empty() && !source.is_empty() && !metric.is_empty() =>
            {
                (origin, source, metric)
            }
            _ => {
                return Err(PlotError::InvalidArgument(
                    "metric reference needs origin, source and metric".to_string(),
                ))
            }
        };

        let id = format!("{}/{}/{}", origin, source, metric);
        Ok(Some(Graph::new(id, metric.clone()).with_stack(
            Stack::new(source.clone()).with_group(
                OperGroup::new(metric.clone(), OperatorType::None)
                    .with_series(SeriesRef::new(metric.clone(), origin.clone(), source.clone(), metric.clone())),
            ),
        )))
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = range.into();
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Turns the request bounds into a concrete window. A missing time means
    /// "now" as the end; a negative range makes `time` the end, otherwise the
    /// start.
    pub fn resolve_window(&self, now: DateTime<Utc>, default_sample: usize) -> PlotResult<PlotWindow> {
        let range = if self.range.trim().is_empty() {
            DEFAULT_RANGE
        } else {
            self.range.as_str()
        };

        let (start, end) = match self.time {
            None => (apply_range(now, range)?, now),
            Some(time) if range.trim_start().starts_with('-') => (apply_range(time, range)?, time),
            Some(time) => (time, apply_range(time, range)?),
        };

        if end <= start {
            return Err(PlotError::InvalidRange(format!(
                "`{}' gives an empty window",
                range
            )));
        }

        let sample = if self.sample == 0 {
            default_sample
        } else {
            self.sample
        };

        let window = PlotWindow::new(start, end, sample).with_percentiles(self.percentiles.clone());
        window.validate()?;
        Ok(window)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotResponse {
    pub id: String,
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: i64,
    pub stacks: Vec<StackPlots>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl PlotResponse {
    pub fn new(graph: &Graph, plots: FederatedPlots) -> Self {
        let diagnostics = plots.diagnostics().into_iter().cloned().collect();

        Self {
            id: graph.id.clone(),
            name: graph.name.clone(),
            start: plots.start,
            end: plots.end,
            step: plots.step,
            stacks: plots.stacks,
            diagnostics,
        }
    }
}
