use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryMetric {
    pub name: String,
    pub origin: String,
    pub source: String,
}

impl QueryMetric {
    pub fn new(
        origin: impl Into<String>,
        source: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            source: source.into(),
        }
    }
}

impl fmt::Display for QueryMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.origin, self.source, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySeries {
    /// Dispatch name echoed back by the connector on the returned series.
    pub name: String,
    pub metric: QueryMetric,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryGroup {
    #[serde(default)]
    pub series: Vec<QuerySeries>,
}

/// Raw plots wanted from one connector. Scaling and combination stay on the
/// federation side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub group: QueryGroup,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub sample: usize,
}

impl Query {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>, sample: usize) -> Self {
        Self {
            group: QueryGroup::default(),
            start_time,
            end_time,
            sample,
        }
    }

    pub fn add_series(&mut self, name: impl Into<String>, metric: QueryMetric) {
        self.group.series.push(QuerySeries {
            name: name.into(),
            metric,
        });
    }

    pub fn len(&self) -> usize {
        self.group.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.series.is_empty()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Query{{start:{} end:{} sample:{} series:{}}}",
            self.start_time.to_rfc3339(),
            self.end_time.to_rfc3339(),
            self.sample,
            self.group.series.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::testing::at;

    #[test]
    fn test_query_builder() {
        let mut query = Query::new(at(0), at(3600), 60);
        assert!(query.is_empty());

        query.add_series("s0", QueryMetric::new("rrd", "host1", "cpu.user"));
        query.add_series("s1", QueryMetric::new("rrd", "host1", "cpu.system"));

        assert_eq!(query.len(), 2);
        assert_eq!(query.group.series[1].metric.name, "cpu.system");
        assert_eq!(query.to_string(), format!("Query{{start:{} end:{} sample:60 series:2}}", at(0).to_rfc3339(), at(3600).to_rfc3339()));
    }

    #[test]
    fn test_query_json_shape() {
        let mut query = Query::new(at(0), at(60), 10);
        query.add_series("s0", QueryMetric::new("a", "b", "c"));

        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["group"]["series"][0]["name"], "s0");
        assert_eq!(json["group"]["series"][0]["metric"]["origin"], "a");

        let back: Query = serde_json::from_value(json).unwrap();
        assert_eq!(back.group, query.group);
        assert_eq!(back.sample, 10);
    }

    #[test]
    fn test_metric_display() {
        assert_eq!(QueryMetric::new("o", "s", "m").to_string(), "o/s/m");
    }
}
