pub mod http;
pub mod memory;

pub use http::HttpConnector;
pub use memory::{MemoryConnector, MemorySeed};

use crate::catalog::CatalogRecord;
use crate::error::PlotResult;
use crate::plot::{Series, Summary};
use crate::query::Query;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Per-series statistics, keyed by the dispatch name of each series.
pub type ValueMap = BTreeMap<String, Summary>;

#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    /// Returns one raw series per query series, named after it.
    async fn get_plots(&self, query: &Query) -> PlotResult<Vec<Series>>;

    /// Summarizes the minute preceding `ref_time` for every query series.
    async fn get_value(
        &self,
        query: &Query,
        ref_time: DateTime<Utc>,
        percentiles: &[f64],
    ) -> PlotResult<ValueMap> {
        let window = Query {
            group: query.group.clone(),
            start_time: ref_time - chrono::Duration::minutes(1),
            end_time: ref_time,
            sample: query.sample,
        };

        let mut values = ValueMap::new();
        for mut series in self.get_plots(&window).await? {
            series.summarize(percentiles);
            values.insert(series.name, series.summary);
        }

        Ok(values)
    }

    /// Publishes every known (source, metric) pair of `origin`.
    async fn refresh(&self, origin: &str, output: mpsc::Sender<CatalogRecord>) -> PlotResult<()>;
}

pub fn same_connector(a: &Arc<dyn Connector>, b: &Arc<dyn Connector>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

fn default_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectorSettings {
    Memory {
        #[serde(default)]
        series: Vec<MemorySeed>,
    },
    Http {
        url: String,
        #[serde(default = "default_timeout_seconds")]
        timeout_seconds: u64,
    },
}

impl ConnectorSettings {
    pub fn build(&self, name: &str) -> PlotResult<Arc<dyn Connector>> {
        match self {
            ConnectorSettings::Memory { series } => {
                Ok(Arc::new(MemoryConnector::with_series(name, series.clone())))
            }
            ConnectorSettings::Http {
                url,
                timeout_seconds,
            } => Ok(Arc::new(HttpConnector::new(
                name,
                url,
                std::time::Duration::from_secs(*timeout_seconds),
            )?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::testing::at;
    use crate::query::QueryMetric;

    #[tokio::test]
    async fn test_default_get_value_summarizes_last_minute() {
        let connector = MemoryConnector::new("mem");
        for (t, v) in [(0, 100.0), (70, 1.0), (100, 3.0), (130, 5.0)] {
            connector.insert("host", "load", at(t), v).await;
        }

        let mut query = Query::new(at(0), at(130), 10);
        query.add_series("s0", QueryMetric::new("mem", "host", "load"));

        let values = connector.get_value(&query, at(130), &[50.0]).await.unwrap();
        let stats = &values["s0"];
        assert_eq!(stats["min"], 1.0);
        assert_eq!(stats["max"], 5.0);
        assert_eq!(stats["avg"], 3.0);
        assert_eq!(stats["last"], 5.0);
        assert_eq!(stats["50th"], 3.0);
    }

    #[test]
    fn test_settings_are_tagged() {
        let settings: ConnectorSettings =
            serde_json::from_str(r#"{"type": "http", "url": "http://localhost:9000"}"#).unwrap();
        match settings {
            ConnectorSettings::Http {
                url,
                timeout_seconds,
            } => {
                assert_eq!(url, "http://localhost:9000");
                assert_eq!(timeout_seconds, 30);
            }
            other => panic!("unexpected settings {:?}", other),
        }

        let settings: ConnectorSettings = serde_json::from_str(
            r#"{"type": "memory", "series": [{"source": "h", "metric": "m", "plots": [[0, 1], [60, null]]}]}"#,
        )
        .unwrap();
        let connector = settings.build("seeded").unwrap();
        assert_eq!(connector.name(), "seeded");
    }

    #[test]
    fn test_connector_identity() {
        let a: Arc<dyn Connector> = Arc::new(MemoryConnector::new("a"));
        let b: Arc<dyn Connector> = Arc::new(MemoryConnector::new("a"));

        assert!(same_connector(&a, &a.clone()));
        assert!(!same_connector(&a, &b));
    }
}
