//! Small numeric helpers shared by the cleaning and analysis stages.
//!
//! Inputs are already-parsed finite values; every helper returns `None` on empty input so the
//! caller decides whether that is an error or a default.

use std::collections::HashMap;

use crate::types::Value;

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub(crate) fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

/// Median of already sorted values; even counts average the two middle values.
pub(crate) fn median_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    Some(if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    })
}

pub(crate) fn median(values: &[f64]) -> Option<f64> {
    median_sorted(&sorted(values))
}

/// Population standard deviation (divisor `n`).
pub(crate) fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Value at `floor(n * fraction)` of sorted values, clamped to the last index.
pub(crate) fn quantile_floor(sorted: &[f64], fraction: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((sorted.len() as f64 * fraction).floor() as usize).min(sorted.len() - 1);
    Some(sorted[idx])
}

/// Most frequent non-missing value; ties go to the value seen first.
pub(crate) fn mode<'a, I>(values: I) -> Option<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    // key -> (count, first position, representative)
    let mut counts: HashMap<String, (usize, usize, &'a Value)> = HashMap::new();
    for (pos, v) in values.into_iter().filter(|v| !v.is_missing()).enumerate() {
        counts.entry(v.group_key()).or_insert((0, pos, v)).0 += 1;
    }
    counts
        .into_values()
        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|(_, _, v)| v.clone())
}

pub(crate) fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_handles_odd_and_even_counts() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn population_std_divides_by_n() {
        let std = population_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((std - 2.0).abs() < 1e-12);
    }

    #[test]
    fn quantile_floor_indexes_sorted_values() {
        let s = sorted(&[100.0, 1.0, 3.0, 2.0, 4.0]);
        assert_eq!(quantile_floor(&s, 0.25), Some(2.0));
        assert_eq!(quantile_floor(&s, 0.75), Some(4.0));
        assert_eq!(quantile_floor(&s, 1.0), Some(100.0));
    }

    #[test]
    fn mode_breaks_ties_on_first_seen() {
        let values = vec![
            Value::text("b"),
            Value::Missing,
            Value::text("a"),
            Value::text("a"),
            Value::text("b"),
            Value::text("c"),
        ];
        assert_eq!(mode(&values), Some(Value::text("b")));

        let values = vec![Value::Number(1.0), Value::Number(2.0), Value::Number(2.0)];
        assert_eq!(mode(&values), Some(Value::Number(2.0)));
        assert_eq!(mode(&[Value::Missing]), None);
    }

    #[test]
    fn round4_keeps_four_decimals() {
        assert_eq!(round4(1.234_56), 1.2346);
        assert_eq!(round4(-0.000_04), -0.0);
    }
}
