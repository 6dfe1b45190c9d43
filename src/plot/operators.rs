use super::{Plot, Series, Value};
use crate::error::{PlotError, PlotResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorType {
    #[default]
    None,
    Average,
    Sum,
}

/// Point-wise average of already aligned series.
pub fn average_series(series_list: &[Series]) -> PlotResult<Series> {
    combine_series(series_list, OperatorType::Average)
}

/// Point-wise sum of already aligned series.
pub fn sum_series(series_list: &[Series]) -> PlotResult<Series> {
    combine_series(series_list, OperatorType::Sum)
}

/// Combines series index by index. The first series gives the length and the
/// timestamps; NaN points are left out of both the sum and the count.
pub fn combine_series(series_list: &[Series], operator: OperatorType) -> PlotResult<Series> {
    let first = series_list
        .first()
        .ok_or_else(|| PlotError::InvalidArgument("no series provided".to_string()))?;

    if operator == OperatorType::None {
        return Err(PlotError::InvalidArgument(
            "operator `none' does not combine series".to_string(),
        ));
    }

    let mut combined = Series {
        name: first.name.clone(),
        plots: Vec::with_capacity(first.len()),
        step: first.step,
        summary: Default::default(),
    };

    for (index, reference) in first.plots.iter().enumerate() {
        let (sum, count) = series_list
            .iter()
            .filter_map(|series| series.plots.get(index))
            .filter(|plot| !plot.is_nan())
            .fold((0.0, 0usize), |(sum, count), plot| (sum + plot.value, count + 1));

        let value = match (count, operator) {
            (0, _) => Value::NAN,
            (_, OperatorType::Average) => sum / count as Value,
            _ => sum,
        };

        combined.plots.push(Plot::new(reference.time, value));
    }

    Ok(combined)
}
