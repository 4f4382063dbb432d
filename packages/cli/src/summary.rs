//! Plain-text summaries of a cached result.

use std::fmt::Write as _;

use building_map_pipeline::PipelineResult;
use building_map_pipeline::owners::summarize_owners;
use building_map_pipeline_models::{MetricFormat, MetricSummary};

/// Owner groups listed in the summary.
const TOP_OWNERS: usize = 15;

/// Prints the dataset and owner summaries to stdout.
pub fn print_summary(result: &PipelineResult) {
    print!("{}", render_summary(result));
}

fn render_summary(result: &PipelineResult) -> String {
    let mut out = String::new();
    let totals = &result.filter_config.dataset_totals;

    let _ = writeln!(out, "Dataset");
    let _ = writeln!(out, "  Buildings:          {}", totals.buildings);
    let _ = writeln!(out, "  Units:              {}", totals.units);
    let _ = writeln!(out, "  Members:            {}", totals.members);
    let _ = writeln!(out, "  Member buildings:   {}", totals.member_buildings);
    let _ = writeln!(out, "  Blocks:             {}", result.blocks.len());

    if !result.filter_config.neighbourhoods.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Local areas");
        for area in &result.filter_config.neighbourhoods {
            let _ = writeln!(
                out,
                "  {:<28} {:>6} buildings {:>8} units",
                area.name, area.count, area.units
            );
        }
    }

    let metrics = &result.filter_config.building_metrics;
    if !result.filter_config.building_metric_order.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Metrics");
        for column in &result.filter_config.building_metric_order {
            let Some(metric) = metrics.get(column) else {
                continue;
            };
            let _ = writeln!(
                out,
                "  {:<28} {:>14} .. {:<14} {} {}, {} {} bins",
                metric.label,
                format_metric_value(metric, metric.min),
                format_metric_value(metric, metric.max),
                metric.format,
                metric.value_type.as_ref(),
                metric.bins.len(),
                if metric.use_log { "log" } else { "linear" },
            );
        }
    }

    let owners = summarize_owners(&result.points);
    if !owners.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Top owner groups");
        for owner in owners.iter().take(TOP_OWNERS) {
            let _ = writeln!(
                out,
                "  {:<32} {:>5} bldgs {:>7.0} units {:>5.1}% with members {:>6.2} members/100 units",
                owner.owner_group,
                owner.buildings,
                owner.total_units,
                owner.share_bldgs * 100.0,
                owner.members_per_100_units
            );
        }
    }

    out
}

fn format_metric_value(metric: &MetricSummary, value: f64) -> String {
    let decimals = metric.decimals as usize;
    match metric.format {
        MetricFormat::Currency => {
            format!("{}{value:.0}", metric.unit.as_deref().unwrap_or("$"))
        }
        MetricFormat::Ratio | MetricFormat::Number => {
            let text = format!("{value:.decimals$}");
            match &metric.unit {
                Some(unit) => format!("{text} {unit}"),
                None => text,
            }
        }
    }
}
