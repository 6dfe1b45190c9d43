pub mod consolidation;
pub mod operators;
pub mod summary;

pub use consolidation::{consolidate_series, ConsolidationType};
pub use operators::{average_series, combine_series, sum_series, OperatorType};
pub use summary::{percentile, percentile_key};

use crate::error::PlotResult;
use chrono::{DateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A plot value. NaN stands for "no data at this instant".
pub type Value = f64;

pub type Summary = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plot {
    pub time: DateTime<Utc>,
    pub value: Value,
}

impl Plot {
    pub fn new(time: DateTime<Utc>, value: Value) -> Self {
        Self { time, value }
    }

    pub fn nan(time: DateTime<Utc>) -> Self {
        Self {
            time,
            value: Value::NAN,
        }
    }

    pub fn is_nan(&self) -> bool {
        self.value.is_nan()
    }
}

/// Wire form of a single value: NaN is `null`, near-zero artifacts are `0`.
#[derive(Debug, Clone, Copy)]
pub struct WireValue(pub Value);

impl Serialize for WireValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_nan() {
            serializer.serialize_none()
        } else if self.0.exp() == 1.0 {
            serializer.serialize_u8(0)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<f64>::deserialize(deserializer)?;
        Ok(WireValue(value.unwrap_or(Value::NAN)))
    }
}

impl Serialize for Plot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.time.timestamp(), WireValue(self.value)).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Plot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (seconds, value) = <(f64, WireValue)>::deserialize(deserializer)?;
        let time = Utc
            .timestamp_opt(seconds as i64, 0)
            .single()
            .ok_or_else(|| de::Error::custom(format!("invalid plot timestamp {}", seconds)))?;
        Ok(Plot::new(time, value.0))
    }
}

pub fn serialize_summary<S: Serializer>(summary: &Summary, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(summary.iter().map(|(key, value)| (key, WireValue(*value))))
}

pub fn deserialize_summary<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Summary, D::Error> {
    let raw = BTreeMap::<String, WireValue>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(key, value)| (key, value.0)).collect())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    #[serde(default)]
    pub plots: Vec<Plot>,
    /// Distance between two consecutive plots, in seconds.
    #[serde(default)]
    pub step: i64,
    #[serde(
        default,
        serialize_with = "serialize_summary",
        deserialize_with = "deserialize_summary"
    )]
    pub summary: Summary,
}

impl Series {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_plots(name: impl Into<String>, plots: Vec<Plot>) -> Self {
        Self {
            name: name.into(),
            plots,
            ..Default::default()
        }
    }

    pub fn add_plot(&mut self, time: DateTime<Utc>, value: Value) {
        self.plots.push(Plot::new(time, value));
    }

    pub fn len(&self) -> usize {
        self.plots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }

    /// Multiplies every non-NaN value by `factor`.
    pub fn scale(&mut self, factor: Value) {
        for plot in self.plots.iter_mut().filter(|plot| !plot.is_nan()) {
            plot.value *= factor;
        }
    }

    /// Consolidates the series against itself onto `sample` buckets.
    pub fn downsample(
        &mut self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        sample: usize,
        consolidation_type: ConsolidationType,
    ) -> PlotResult<()> {
        let consolidated = consolidate_series(
            std::slice::from_ref(&*self),
            start_time,
            end_time,
            sample,
            consolidation_type,
        )?;

        if let Some(series) = consolidated.into_iter().next() {
            *self = series;
        }

        Ok(())
    }
}

/// Whether `candidate` replaces the running extreme `current`. A NaN running
/// extreme is always replaced; a NaN candidate never wins otherwise.
pub(crate) fn supersedes(candidate: Value, current: Value, ordering: Ordering) -> bool {
    current.is_nan() || (!candidate.is_nan() && candidate.partial_cmp(&current) == Some(ordering))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    pub fn series(name: &str, points: &[(i64, f64)]) -> Series {
        Series::with_plots(
            name,
            points.iter().map(|&(t, v)| Plot::new(at(t), v)).collect(),
        )
    }

    pub fn values(series: &Series) -> Vec<f64> {
        series.plots.iter().map(|p| p.value).collect()
    }
}
