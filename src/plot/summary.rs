use super::{supersedes, Series, Value};
use std::cmp::Ordering;

pub const SUMMARY_MIN: &str = "min";
pub const SUMMARY_MAX: &str = "max";
pub const SUMMARY_AVG: &str = "avg";
pub const SUMMARY_LAST: &str = "last";

impl Series {
    /// Computes min/max/avg/last and the requested percentiles into `summary`.
    pub fn summarize(&mut self, percentiles: &[f64]) {
        let mut min = Value::NAN;
        let mut max = Value::NAN;
        let mut total = 0.0;
        let mut valid = 0usize;

        for plot in &self.plots {
            if supersedes(plot.value, min, Ordering::Less) {
                min = plot.value;
            }

            if supersedes(plot.value, max, Ordering::Greater) {
                max = plot.value;
            }

            if !plot.is_nan() {
                total += plot.value;
                valid += 1;
            }
        }

        if let Some(last) = self.plots.last() {
            self.summary.insert(SUMMARY_LAST.to_string(), last.value);
        }

        self.summary.insert(SUMMARY_MIN.to_string(), min);
        self.summary.insert(SUMMARY_MAX.to_string(), max);
        // 0/0 yields NaN when no valid point exists
        self.summary
            .insert(SUMMARY_AVG.to_string(), total / valid as Value);

        if !percentiles.is_empty() {
            self.percentiles(percentiles);
        }
    }

    /// Stores the closest-ranks percentile estimates into `summary`.
    pub fn percentiles(&mut self, percentiles: &[f64]) {
        let mut set: Vec<Value> = self
            .plots
            .iter()
            .filter(|plot| !plot.is_nan())
            .map(|plot| plot.value)
            .collect();

        if set.is_empty() || percentiles.is_empty() {
            return;
        }

        set.sort_by(|a, b| a.total_cmp(b));

        for &p in percentiles {
            self.summary.insert(percentile_key(p), percentile(&set, p));
        }
    }
}

pub fn percentile_key(p: f64) -> String {
    if p.fract() == 0.0 {
        format!("{:.0}th", p)
    } else {
        format!("{:.2}th", p)
    }
}

/// Linear interpolation between closest ranks over an ascending, non-empty set.
pub fn percentile(sorted: &[Value], p: f64) -> Value {
    let size = sorted.len();
    let rank = (p / 100.0) * (size + 1) as f64;

    if rank < 1.0 {
        return sorted[0];
    } else if rank - 1.0 >= size as f64 {
        return sorted[size - 1];
    }

    let rank_int = rank.trunc() as usize;
    if rank_int >= size {
        return sorted[size - 1];
    }

    let rank_frac = rank - rank_int as f64;
    let lower = sorted[rank_int - 1];

    lower + rank_frac * (sorted[rank_int] - lower)
}
