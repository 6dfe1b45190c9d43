use super::{supersedes, Plot, Series, Value};
use crate::error::{PlotError, PlotResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidationType {
    #[default]
    Average,
    Last,
    Max,
    Min,
    Sum,
}

#[derive(Debug)]
struct PlotBucket {
    start_time: DateTime<Utc>,
    plots: Vec<Plot>,
}

impl PlotBucket {
    fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            plots: Vec::new(),
        }
    }

    fn consolidate(mut self, consolidation_type: ConsolidationType) -> Plot {
        if self.plots.is_empty() {
            return Plot::nan(self.start_time);
        }

        // Members are unordered on arrival; first/last refer to time
        self.plots.sort_by_key(|plot| plot.time);

        let first = self.plots[0];
        let last = self.plots[self.plots.len() - 1];

        match consolidation_type {
            ConsolidationType::Average => {
                let (sum, count) = valid_sum(&self.plots);
                let value = if count > 0 {
                    sum / count as Value
                } else {
                    Value::NAN
                };

                // Midpoint of the members rather than the bucket boundary
                let time = if self.plots.len() == 1 {
                    first.time
                } else {
                    first.time + (last.time - first.time) / 2
                };

                Plot::new(time, value)
            }
            ConsolidationType::Sum => {
                let (sum, count) = valid_sum(&self.plots);
                let value = if count > 0 { sum } else { Value::NAN };
                Plot::new(last.time, value)
            }
            ConsolidationType::Last => last,
            ConsolidationType::Max => self.extreme(Ordering::Greater),
            ConsolidationType::Min => self.extreme(Ordering::Less),
        }
    }

    fn extreme(&self, ordering: Ordering) -> Plot {
        self.plots
            .iter()
            .fold(Plot::nan(self.start_time), |current, plot| {
                if supersedes(plot.value, current.value, ordering) {
                    *plot
                } else {
                    current
                }
            })
    }
}

fn valid_sum(plots: &[Plot]) -> (Value, usize) {
    plots
        .iter()
        .filter(|plot| !plot.is_nan())
        .fold((0.0, 0), |(sum, count), plot| (sum + plot.value, count + 1))
}

/// Aligns every series onto `sample` buckets spanning `[start_time, end_time]`.
///
/// The effective sample count never exceeds the longest input series, so a
/// coarse series is not upsampled into fabricated resolution.
pub fn consolidate_series(
    series_list: &[Series],
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    sample: usize,
    consolidation_type: ConsolidationType,
) -> PlotResult<Vec<Series>> {
    if sample == 0 {
        return Err(PlotError::InvalidArgument(
            "sample must be greater than zero".to_string(),
        ));
    }

    if series_list.is_empty() {
        return Err(PlotError::InvalidArgument("no series provided".to_string()));
    }

    let max_length = series_list.iter().map(Series::len).max().unwrap_or(0);
    let sample = if max_length > 0 && max_length < sample {
        max_length
    } else {
        sample
    };

    let span = (end_time - start_time)
        .num_nanoseconds()
        .filter(|span| *span > 0)
        .ok_or_else(|| {
            PlotError::InvalidArgument(format!(
                "invalid consolidation window {} - {}",
                start_time, end_time
            ))
        })?;

    let step = span / sample as i64;
    if step == 0 {
        return Err(PlotError::InvalidArgument(format!(
            "consolidation window too small for {} samples",
            sample
        )));
    }

    let mut consolidated = Vec::with_capacity(series_list.len());

    for series in series_list {
        let mut buckets: Vec<PlotBucket> = (0..sample)
            .map(|index| PlotBucket::new(start_time + Duration::nanoseconds(index as i64 * step)))
            .collect();

        for plot in &series.plots {
            if plot.time < start_time || plot.time > end_time {
                continue;
            }

            let offset = match (plot.time - start_time).num_nanoseconds() {
                Some(offset) => offset,
                None => continue,
            };

            let index = (offset / step) as usize;
            if index >= sample {
                continue;
            }

            buckets[index].plots.push(*plot);
        }

        consolidated.push(Series {
            name: series.name.clone(),
            plots: buckets
                .into_iter()
                .map(|bucket| bucket.consolidate(consolidation_type))
                .collect(),
            step: step / 1_000_000_000,
            summary: Default::default(),
        });
    }

    Ok(consolidated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::testing::*;
    use proptest::prelude::*;

    #[test]
    fn test_average_into_two_buckets() {
        let s = series("cpu", &[(0, 1.0), (10, 2.0), (20, 3.0), (30, 4.0)]);
        let result = consolidate_series(&[s], at(0), at(40), 2, ConsolidationType::Average).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(values(&result[0]), vec![1.5, 3.5]);
        // Midpoint between the first and last member
        assert_eq!(result[0].plots[0].time, at(5));
        assert_eq!(result[0].plots[1].time, at(25));
        assert!(result[0].summary.is_empty());
    }

    #[test]
    fn test_rejects_zero_sample_and_empty_list() {
        let s = series("cpu", &[(0, 1.0)]);
        assert!(matches!(
            consolidate_series(&[s], at(0), at(10), 0, ConsolidationType::Average),
            Err(PlotError::InvalidArgument(_))
        ));
        assert!(matches!(
            consolidate_series(&[], at(0), at(10), 4, ConsolidationType::Average),
            Err(PlotError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rejects_empty_window() {
        let s = series("cpu", &[(0, 1.0)]);
        assert!(consolidate_series(&[s.clone()], at(10), at(10), 1, ConsolidationType::Average).is_err());
        assert!(consolidate_series(&[s], at(20), at(10), 1, ConsolidationType::Average).is_err());
    }

    #[test]
    fn test_sample_capped_at_longest_series() {
        let a = series("a", &[(0, 1.0), (30, 2.0)]);
        let b = series("b", &[(0, 1.0), (20, 2.0), (40, 3.0)]);
        let result = consolidate_series(&[a, b], at(0), at(60), 10, ConsolidationType::Average).unwrap();

        assert_eq!(result[0].len(), 3);
        assert_eq!(result[1].len(), 3);
        assert_eq!(result[0].step, 20);
    }

    #[test]
    fn test_empty_inputs_keep_requested_sample() {
        let result = consolidate_series(&[Series::new("empty")], at(0), at(60), 6, ConsolidationType::Average).unwrap();

        assert_eq!(result[0].len(), 6);
        assert!(result[0].plots.iter().all(Plot::is_nan));
        assert_eq!(result[0].plots[2].time, at(20));
    }

    #[test]
    fn test_out_of_window_plots_are_dropped() {
        let s = series("cpu", &[(-10, 100.0), (0, 1.0), (15, 2.0), (40, 50.0), (45, 100.0)]);
        let result = consolidate_series(&[s], at(0), at(40), 4, ConsolidationType::Max).unwrap();

        // 40 lies on the window end but past the last bucket, 45 is outside
        assert_eq!(values(&result[0])[0], 1.0);
        assert_eq!(values(&result[0])[1], 2.0);
        assert!(values(&result[0])[2].is_nan());
        assert!(values(&result[0])[3].is_nan());
    }

    #[test]
    fn test_all_nan_bucket_averages_to_nan() {
        let s = series("cpu", &[(0, f64::NAN), (5, f64::NAN), (10, 4.0)]);
        let result = consolidate_series(&[s], at(0), at(20), 2, ConsolidationType::Average).unwrap();

        assert!(result[0].plots[0].is_nan());
        assert_eq!(result[0].plots[1].value, 4.0);
    }

    #[test]
    fn test_average_skips_nan_members() {
        let s = series("cpu", &[(0, 2.0), (3, f64::NAN), (6, 4.0)]);
        let result = consolidate_series(&[s], at(0), at(20), 1, ConsolidationType::Average).unwrap();

        assert_eq!(result[0].plots[0].value, 3.0);
        assert_eq!(result[0].plots[0].time, at(3));
    }

    #[test]
    fn test_sum_uses_last_member_time() {
        let s = series("req", &[(2, 1.0), (4, 2.0), (8, 3.0)]);
        let result = consolidate_series(&[s], at(0), at(10), 1, ConsolidationType::Sum).unwrap();

        assert_eq!(result[0].plots[0], Plot::new(at(8), 6.0));
    }

    #[test]
    fn test_last_returns_latest_member_verbatim() {
        // Physically unordered input
        let s = series("req", &[(8, 3.0), (2, 1.0), (4, 2.0)]);
        let result = consolidate_series(&[s], at(0), at(10), 1, ConsolidationType::Last).unwrap();

        assert_eq!(result[0].plots[0], Plot::new(at(8), 3.0));
    }

    #[test]
    fn test_max_and_min_ignore_nan() {
        let s = series("temp", &[(1, f64::NAN), (2, 5.0), (3, f64::NAN), (4, -1.0), (5, 3.0)]);

        let max = consolidate_series(&[s.clone()], at(0), at(10), 1, ConsolidationType::Max).unwrap();
        assert_eq!(max[0].plots[0], Plot::new(at(2), 5.0));

        let min = consolidate_series(&[s], at(0), at(10), 1, ConsolidationType::Min).unwrap();
        assert_eq!(min[0].plots[0], Plot::new(at(4), -1.0));
    }

    #[test]
    fn test_empty_bucket_uses_bucket_start() {
        let s = series("temp", &[(1, 1.0), (2, 2.0), (35, 3.0), (36, 4.0)]);
        let result = consolidate_series(&[s], at(0), at(40), 4, ConsolidationType::Average).unwrap();

        assert!(result[0].plots[1].is_nan());
        assert_eq!(result[0].plots[1].time, at(10));
        assert!(result[0].plots[2].is_nan());
        assert_eq!(result[0].plots[2].time, at(20));
    }

    #[test]
    fn test_output_order_matches_input_order() {
        let a = series("a", &[(0, 1.0)]);
        let b = series("b", &[(0, 2.0)]);
        let c = series("c", &[(0, 3.0)]);
        let result = consolidate_series(&[a, b, c], at(0), at(10), 1, ConsolidationType::Average).unwrap();

        let names: Vec<_> = result.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_consolidation_is_deterministic() {
        let s = series("cpu", &[(0, 1.0), (7, f64::NAN), (13, 2.5), (21, 8.0), (33, 0.0)]);

        let first = consolidate_series(&[s.clone()], at(0), at(40), 3, ConsolidationType::Average).unwrap();
        let second = consolidate_series(&[s], at(0), at(40), 3, ConsolidationType::Average).unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    fn raw_series() -> impl Strategy<Value = Vec<(i64, Option<f64>)>> {
        prop::collection::vec((0i64..1000, prop::option::of(-1e6f64..1e6)), 0..200)
    }

    fn build(points: &[(i64, Option<f64>)]) -> Series {
        Series::with_plots(
            "prop",
            points
                .iter()
                .map(|&(t, v)| Plot::new(at(t), v.unwrap_or(f64::NAN)))
                .collect(),
        )
    }

    proptest! {
        #[test]
        fn prop_bucket_count(points in raw_series(), sample in 1usize..300) {
            let s = build(&points);
            let result = consolidate_series(&[s], at(0), at(1000), sample, ConsolidationType::Average).unwrap();

            let expected = if !points.is_empty() && points.len() < sample { points.len() } else { sample };
            prop_assert_eq!(result[0].len(), expected);
        }

        #[test]
        fn prop_average_within_member_bounds(points in raw_series(), sample in 1usize..50) {
            let s = build(&points);
            let result = consolidate_series(&[s.clone()], at(0), at(1000), sample, ConsolidationType::Average).unwrap();
            let buckets = result[0].len() as i64;
            let step = 1_000_000_000_000i64 / buckets;

            for (index, plot) in result[0].plots.iter().enumerate() {
                let members: Vec<f64> = s.plots.iter()
                    .filter(|p| {
                        let offset = (p.time - at(0)).num_nanoseconds().unwrap();
                        offset / step == index as i64
                    })
                    .map(|p| p.value)
                    .filter(|v| !v.is_nan())
                    .collect();

                if members.is_empty() {
                    prop_assert!(plot.is_nan());
                } else {
                    let min = members.iter().cloned().fold(f64::INFINITY, f64::min);
                    let max = members.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    let tolerance = 1e-9 * max.abs().max(min.abs()).max(1.0);
                    prop_assert!(plot.value >= min - tolerance && plot.value <= max + tolerance);
                }
            }
        }
    }
}
