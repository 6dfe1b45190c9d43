use crate::error::{PlotError, PlotResult};
use chrono::{DateTime, Days, Duration, Months, Utc};

/// Applies a range expression such as `-1y 3h 126s` or `3d 1h 6m` to `reference`.
///
/// Supported units are `y`, `mo`, `d`, `h`, `m` and `s`. A leading `-` negates
/// every chunk of the expression. Calendar units are applied before the
/// fixed-length ones.
pub fn apply_range(reference: DateTime<Utc>, range: &str) -> PlotResult<DateTime<Utc>> {
    let trimmed = range.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    if body.trim().is_empty() {
        return Err(PlotError::InvalidRange(range.to_string()));
    }

    let mut months: u32 = 0;
    let mut days: u64 = 0;
    let mut seconds: i64 = 0;

    for chunk in body.split_whitespace() {
        let split = chunk
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| PlotError::InvalidRange(range.to_string()))?;
        let (digits, unit) = chunk.split_at(split);
        let amount: u32 = digits
            .parse()
            .map_err(|_| PlotError::InvalidRange(range.to_string()))?;

        match unit {
            "y" => months = months.saturating_add(amount.saturating_mul(12)),
            "mo" => months = months.saturating_add(amount),
            "d" => days += u64::from(amount),
            "h" => seconds += i64::from(amount) * 3600,
            "m" => seconds += i64::from(amount) * 60,
            "s" => seconds += i64::from(amount),
            _ => return Err(PlotError::InvalidRange(range.to_string())),
        }
    }

    let shifted = if negative {
        reference
            .checked_sub_months(Months::new(months))
            .and_then(|t| t.checked_sub_days(Days::new(days)))
            .and_then(|t| t.checked_sub_signed(Duration::seconds(seconds)))
    } else {
        reference
            .checked_add_months(Months::new(months))
            .and_then(|t| t.checked_add_days(Days::new(days)))
            .and_then(|t| t.checked_add_signed(Duration::seconds(seconds)))
    };

    shifted.ok_or_else(|| PlotError::InvalidRange(range.to_string()))
}

/// Renders a duration as a range expression, e.g. `-1d 3h 2m 6s`.
pub fn duration_to_range(duration: Duration) -> String {
    let total = duration.num_seconds();
    if total == 0 {
        return "0s".to_string();
    }

    let mut remaining = total.unsigned_abs();
    let mut chunks = Vec::new();
    for (unit, size) in [("d", 86_400u64), ("h", 3_600), ("m", 60), ("s", 1)] {
        let count = remaining / size;
        remaining %= size;
        if count > 0 {
            chunks.push(format!("{}{}", count, unit));
        }
    }

    let rendered = chunks.join(" ");
    if total < 0 {
        format!("-{}", rendered)
    } else {
        rendered
    }
}
