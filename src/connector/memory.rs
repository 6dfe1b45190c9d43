use super::Connector;
use crate::catalog::CatalogRecord;
use crate::error::{PlotError, PlotResult};
use crate::plot::{Plot, Series, Value};
use crate::query::Query;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

type MetricData = BTreeMap<DateTime<Utc>, Value>;

/// Initial content of a memory connector, as found in configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySeed {
    pub source: String,
    pub metric: String,
    #[serde(default)]
    pub plots: Vec<Plot>,
}

pub struct MemoryConnector {
    name: String,
    // source -> metric -> samples
    data: RwLock<HashMap<String, HashMap<String, MetricData>>>,
}

impl MemoryConnector {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_series(name, Vec::new())
    }

    pub fn with_series(name: impl Into<String>, seeds: Vec<MemorySeed>) -> Self {
        let mut data: HashMap<String, HashMap<String, MetricData>> = HashMap::new();
        for seed in seeds {
            let metric = data
                .entry(seed.source)
                .or_default()
                .entry(seed.metric)
                .or_default();
            metric.extend(seed.plots.into_iter().map(|plot| (plot.time, plot.value)));
        }

        Self {
            name: name.into(),
            data: RwLock::new(data),
        }
    }

    pub async fn insert(&self, source: &str, metric: &str, time: DateTime<Utc>, value: Value) {
        let mut data = self.data.write().await;
        data.entry(source.to_string())
            .or_default()
            .entry(metric.to_string())
            .or_default()
            .insert(time, value);
    }

    pub async fn insert_series(&self, source: &str, metric: &str, plots: &[Plot]) {
        let mut data = self.data.write().await;
        let samples = data
            .entry(source.to_string())
            .or_default()
            .entry(metric.to_string())
            .or_default();
        samples.extend(plots.iter().map(|plot| (plot.time, plot.value)));
    }

    pub async fn metric_count(&self) -> usize {
        let data = self.data.read().await;
        data.values().map(|metrics| metrics.len()).sum()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_plots(&self, query: &Query) -> PlotResult<Vec<Series>> {
        if query.end_time < query.start_time {
            return Err(PlotError::InvalidArgument(format!(
                "end time {} precedes start time {}",
                query.end_time, query.start_time
            )));
        }

        let data = self.data.read().await;
        let mut result = Vec::with_capacity(query.len());

        for entry in &query.group.series {
            let mut series = Series::new(entry.name.clone());

            match data
                .get(&entry.metric.source)
                .and_then(|metrics| metrics.get(&entry.metric.name))
            {
                Some(samples) => {
                    for (time, value) in samples.range(query.start_time..=query.end_time) {
                        series.add_plot(*time, *value);
                    }
                }
                None => debug!(
                    "Connector {} has no data for {}",
                    self.name, entry.metric
                ),
            }

            result.push(series);
        }

        Ok(result)
    }

    async fn refresh(&self, origin: &str, output: mpsc::Sender<CatalogRecord>) -> PlotResult<()> {
        let records: Vec<CatalogRecord> = {
            let data = self.data.read().await;
            data.iter()
                .flat_map(|(source, metrics)| {
                    metrics
                        .keys()
                        .map(move |metric| CatalogRecord::new(origin, source.clone(), metric.clone()))
                })
                .collect()
        };

        for record in records {
            output
                .send(record)
                .await
                .map_err(|e| PlotError::connector(self.name.clone(), e))?;
        }

        Ok(())
    }
}
