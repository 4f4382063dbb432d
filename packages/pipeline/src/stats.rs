//! Small descriptive statistics used by the aggregation stages.

use std::collections::BTreeMap;

/// Median of the given values; the mean of the middle two for even counts.
#[must_use]
pub fn median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(f64::midpoint(sorted[mid - 1], sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}

/// Largest of the given values.
#[must_use]
pub fn max(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .reduce(f64::max)
}

/// Most frequent value; ties go to the value seen first.
#[must_use]
pub fn mode<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    // value -> (count, first position)
    let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for (position, value) in values.into_iter().enumerate() {
        counts.entry(value).or_insert((0, position)).0 += 1;
    }

    counts
        .into_iter()
        .min_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_b.cmp(count_a).then(first_a.cmp(first_b))
        })
        .map(|(value, _)| value)
}

/// Percentile of pre-sorted data with linear interpolation between the
/// two nearest ranks.
///
/// # Panics
///
/// Panics if `sorted` is empty.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    assert!(!sorted.is_empty(), "percentile of empty data");
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
