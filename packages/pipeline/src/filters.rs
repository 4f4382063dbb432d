//! Dataset-level filter metadata: bounds, neighbourhood counts, and totals.

use std::collections::BTreeMap;

use building_map_pipeline_models::{
    Bounds, DatasetTotals, FilterConfig, MapPoint, MetricSpec, NeighbourhoodCount,
};
use chrono::{DateTime, Utc};

use crate::blocks::Block;
use crate::membership::{Membership, default_updated_since};
use crate::metrics::build_building_metrics;

/// Extent and mean position of the points.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn dataset_bounds(points: &[MapPoint]) -> Option<Bounds> {
    if points.is_empty() {
        return None;
    }

    let mut bounds = Bounds {
        lat_min: f64::INFINITY,
        lat_max: f64::NEG_INFINITY,
        lon_min: f64::INFINITY,
        lon_max: f64::NEG_INFINITY,
        center_lat: 0.0,
        center_lon: 0.0,
    };
    for point in points {
        bounds.lat_min = bounds.lat_min.min(point.lat);
        bounds.lat_max = bounds.lat_max.max(point.lat);
        bounds.lon_min = bounds.lon_min.min(point.lon);
        bounds.lon_max = bounds.lon_max.max(point.lon);
        bounds.center_lat += point.lat;
        bounds.center_lon += point.lon;
    }
    let n = points.len() as f64;
    bounds.center_lat /= n;
    bounds.center_lon /= n;

    Some(bounds)
}

/// Point and unit counts per local area, most points first. Ties keep
/// alphabetical order.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn neighbourhood_counts(points: &[MapPoint]) -> Vec<NeighbourhoodCount> {
    let mut areas: BTreeMap<&str, (u64, f64)> = BTreeMap::new();
    for point in points {
        let entry = areas.entry(point.local_area.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += point.units.unwrap_or(0.0);
    }

    let mut counts: Vec<NeighbourhoodCount> = areas
        .into_iter()
        .map(|(name, (count, units))| NeighbourhoodCount {
            name: name.to_string(),
            count,
            units: units.round() as i64,
        })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Building, member, and unit totals.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn dataset_totals(points: &[MapPoint]) -> DatasetTotals {
    DatasetTotals {
        buildings: points.len() as u64,
        members: points.iter().map(|p| u64::from(p.member_count)).sum(),
        units: points.iter().filter_map(|p| p.units).sum::<f64>() as i64,
        member_buildings: points.iter().filter(|p| p.has_member).count() as u64,
    }
}

/// Everything the interactive filters need.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn build_filter_config(
    points: &[MapPoint],
    blocks: &[Block],
    membership: &Membership,
    metric_specs: &[MetricSpec],
    now: DateTime<Utc>,
) -> FilterConfig {
    let (building_metrics, building_metric_order) = build_building_metrics(points, metric_specs);
    let (updated_year_min, updated_year_max) = membership.year_range();

    FilterConfig {
        membership_years: membership.year_counts(),
        top_tags: membership.top_tags(),
        default_updated_since: default_updated_since(now),
        updated_year_min,
        updated_year_max,
        building_metrics,
        building_metric_order,
        neighbourhoods: neighbourhood_counts(points),
        bounds: dataset_bounds(points),
        dataset_totals: dataset_totals(points),
        blocks_total_units_max: blocks
            .iter()
            .map(|b| b.stats.total_units)
            .fold(0.0, f64::max)
            .trunc() as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(area: &str, lat: f64, lon: f64, units: Option<f64>, members: u32) -> MapPoint {
        MapPoint {
            b_id: 0,
            addr_key: String::new(),
            address: String::new(),
            lat,
            lon,
            units,
            year_built: None,
            n_issues: None,
            value_land: None,
            value_bldg: None,
            bldg_land_ratio: None,
            owner_group: "(Unknown)".to_string(),
            owner_key: "unknown".to_string(),
            member_count: members,
            member_count_all: members,
            has_member: members > 0,
            member_share_building: 0.0,
            local_area: area.to_string(),
            block_id: None,
            members_payload: Vec::new(),
        }
    }

    fn sample() -> Vec<MapPoint> {
        vec![
            point("West End", 49.0, -123.0, Some(10.4), 2),
            point("Kitsilano", 50.0, -124.0, None, 0),
            point("West End", 48.0, -122.0, Some(5.3), 1),
        ]
    }

    #[test]
    fn computes_bounds() {
        let bounds = dataset_bounds(&sample()).unwrap();
        assert_eq!((bounds.lat_min, bounds.lat_max), (48.0, 50.0));
        assert_eq!((bounds.lon_min, bounds.lon_max), (-124.0, -122.0));
        assert!((bounds.center_lat - 49.0).abs() < 1e-12);
        assert!((bounds.center_lon - -123.0).abs() < 1e-12);
        assert!(dataset_bounds(&[]).is_none());
    }

    #[test]
    fn counts_neighbourhoods() {
        let counts = neighbourhood_counts(&sample());
        assert_eq!(counts[0].name, "West End");
        assert_eq!(counts[0].count, 2);
        assert_eq!(counts[0].units, 16);
        assert_eq!(counts[1].name, "Kitsilano");
        assert_eq!(counts[1].units, 0);
    }

    #[test]
    fn totals() {
        let totals = dataset_totals(&sample());
        assert_eq!(
            totals,
            DatasetTotals {
                buildings: 3,
                members: 3,
                units: 15,
                member_buildings: 2,
            }
        );
    }
}
