//! Range-filter metadata for numeric map point attributes.
//!
//! Each configured attribute gets min/max, a suggested default range, a
//! histogram (linear or logarithmic), and display hints.

use std::collections::BTreeMap;

use building_map_pipeline_models::{
    HistogramBin, MapPoint, MetricFormat, MetricSpec, MetricSummary, ValueType,
};

use crate::stats::percentile;

/// `max / positive_min` ratio at or above which log bins are preferred.
pub const DEFAULT_LOG_THRESHOLD: f64 = 25.0;

/// Samples needed before the suggested range uses percentiles.
const PERCENTILE_MIN_SAMPLES: usize = 20;

const MIN_BINS: usize = 6;
const MAX_BINS: usize = 24;

/// The attributes summarized when no configuration is given.
#[must_use]
pub fn default_metric_specs() -> Vec<MetricSpec> {
    vec![
        MetricSpec {
            format: MetricFormat::Currency,
            unit: Some("$".to_string()),
            step: Some(5000.0),
            attr: Some("value-land".to_string()),
            bins: Some(24),
            ..MetricSpec::new("value_land", "Assessed land value")
        },
        MetricSpec {
            format: MetricFormat::Currency,
            unit: Some("$".to_string()),
            step: Some(5000.0),
            attr: Some("value-bldg".to_string()),
            bins: Some(24),
            ..MetricSpec::new("value_bldg", "Assessed building value")
        },
        MetricSpec {
            format: MetricFormat::Ratio,
            step: Some(0.05),
            decimals: Some(2),
            attr: Some("value-ratio".to_string()),
            bins: Some(18),
            ..MetricSpec::new("bldg_land_ratio", "Building / Land ratio")
        },
        MetricSpec {
            value_type: ValueType::Int,
            step: Some(1.0),
            attr: Some("units".to_string()),
            bins: Some(18),
            force_log: true,
            ..MetricSpec::new("units", "Units")
        },
    ]
}

/// Reads a numeric attribute of a map point by name.
#[must_use]
pub fn metric_value(point: &MapPoint, column: &str) -> Option<f64> {
    match column {
        "units" => point.units,
        "year_built" => point.year_built,
        "n_issues" => point.n_issues,
        "value_land" => point.value_land,
        "value_bldg" => point.value_bldg,
        "bldg_land_ratio" => point.bldg_land_ratio,
        "member_count" => Some(f64::from(point.member_count)),
        "member_count_all" => Some(f64::from(point.member_count_all)),
        "member_share_building" => Some(point.member_share_building),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Equal-width histogram over `[lo, hi]`; the last bin includes `hi`.
/// A zero-width range is widened by 0.5 on each side.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn histogram(values: &[f64], bins: usize) -> (Vec<u64>, Vec<f64>) {
    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let span = hi - lo;
    let mut edges: Vec<f64> = (0..=bins)
        .map(|i| lo + span * (i as f64) / (bins as f64))
        .collect();
    edges[bins] = hi;

    let mut counts = vec![0_u64; bins];
    for &value in values {
        let mut index = (((value - lo) / span) * bins as f64) as usize;
        index = index.min(bins - 1);
        if value < edges[index] && index > 0 {
            index -= 1;
        } else if index + 1 < bins && value >= edges[index + 1] {
            index += 1;
        }
        counts[index] += 1;
    }

    (counts, edges)
}

/// Bins `values` in log space. Non-positive samples land in the first bin,
/// whose left edge is the true minimum.
fn log_histogram(values: &[f64], bins: usize, min: f64, max: f64) -> (Vec<u64>, Vec<f64>) {
    let logs: Vec<f64> = values.iter().filter(|v| **v > 0.0).map(|v| v.ln()).collect();
    let non_positive = (values.len() - logs.len()) as u64;

    let (mut counts, log_edges) = histogram(&logs, bins);
    counts[0] += non_positive;

    let mut edges: Vec<f64> = log_edges.into_iter().map(f64::exp).collect();
    edges[0] = min;
    edges[bins] = max;
    (counts, edges)
}

/// Summarizes one attribute. `None` when there are no samples.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn summarize_metric(values: &[f64], spec: &MetricSpec) -> Option<MetricSummary> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    let min_positive = sorted.iter().copied().find(|v| *v > 0.0);

    let bins = spec
        .bins
        .unwrap_or_else(|| ((sorted.len() as f64).sqrt() as usize).clamp(MIN_BINS, MAX_BINS))
        .max(1);

    let can_use_log = min_positive.is_some_and(|positive| max > positive);
    let use_log = can_use_log
        && (spec.force_log
            || spec.use_log.unwrap_or_else(|| {
                spec.value_type != ValueType::Int
                    && (spec.format == MetricFormat::Currency
                        || min_positive.is_some_and(|positive| {
                            max / positive >= spec.log_threshold.unwrap_or(DEFAULT_LOG_THRESHOLD)
                        }))
            }));

    let (counts, edges) = if use_log {
        log_histogram(&sorted, bins, min, max)
    } else {
        histogram(&sorted, bins)
    };

    let (mut suggested_min, mut suggested_max) = if sorted.len() >= PERCENTILE_MIN_SAMPLES {
        (percentile(&sorted, 5.0), percentile(&sorted, 95.0))
    } else {
        (min, max)
    };
    suggested_min = suggested_min.min(max).max(min);
    suggested_max = suggested_max.max(min).min(max);
    if suggested_min >= suggested_max {
        suggested_min = min;
        suggested_max = max;
    }

    let span = max - min;
    let step = spec
        .step
        .unwrap_or_else(|| match spec.value_type {
            ValueType::Int => 1.0,
            ValueType::Float if span > 0.0 => span / 200.0,
            ValueType::Float if max > 0.0 => max / 200.0,
            ValueType::Float => 0.01,
        });
    let step = if step > 0.0 {
        step
    } else if spec.value_type == ValueType::Int {
        1.0
    } else {
        0.01
    };

    let bins: Vec<HistogramBin> = counts
        .iter()
        .enumerate()
        .map(|(i, &count)| HistogramBin {
            start: edges[i],
            end: edges[i + 1],
            count,
        })
        .collect();

    Some(MetricSummary {
        label: spec.label.clone(),
        min,
        max,
        suggested_min,
        suggested_max,
        step,
        max_count: counts.iter().copied().max().unwrap_or(0),
        bins,
        format: spec.format,
        unit: spec.unit.clone(),
        value_type: spec.value_type,
        decimals: spec.decimals.unwrap_or(match spec.value_type {
            ValueType::Int => 0,
            ValueType::Float => 2,
        }),
        attr: spec
            .attr
            .clone()
            .unwrap_or_else(|| spec.column.replace('_', "-")),
        min_positive,
        use_log,
    })
}

/// Summaries keyed by attribute, plus the display order of the attributes
/// that had data.
#[must_use]
pub fn build_building_metrics(
    points: &[MapPoint],
    specs: &[MetricSpec],
) -> (BTreeMap<String, MetricSummary>, Vec<String>) {
    let mut metrics = BTreeMap::new();
    let mut order = Vec::new();

    for spec in specs {
        let values: Vec<f64> = points
            .iter()
            .filter_map(|p| metric_value(p, &spec.column))
            .collect();
        match summarize_metric(&values, spec) {
            Some(summary) => {
                order.push(spec.column.clone());
                metrics.insert(spec.column.clone(), summary);
            }
            None => log::debug!("No values for metric '{}'; skipping", spec.column),
        }
    }

    (metrics, order)
}
