//! Owner group summaries over map points.

use std::collections::BTreeMap;

use building_map_pipeline_models::{MapPoint, OwnerSummary};

/// Aggregates map points per owner group, largest holdings first (by
/// total units, then building count).
#[must_use]
pub fn summarize_owners(points: &[MapPoint]) -> Vec<OwnerSummary> {
    let mut groups: BTreeMap<(&str, &str), OwnerSummary> = BTreeMap::new();
    for point in points {
        let summary = groups
            .entry((point.owner_group.as_str(), point.owner_key.as_str()))
            .or_insert_with(|| OwnerSummary {
                owner_group: point.owner_group.clone(),
                owner_key: point.owner_key.clone(),
                buildings: 0,
                total_units: 0.0,
                member_buildings: 0,
                total_members: 0,
                share_bldgs: 0.0,
                members_per_100_units: 0.0,
            });
        summary.buildings += 1;
        summary.total_units += point.units.unwrap_or(0.0);
        summary.total_members += point.member_count;
        if point.has_member {
            summary.member_buildings += 1;
        }
    }

    let mut summaries: Vec<OwnerSummary> = groups
        .into_values()
        .map(|mut summary| {
            summary.share_bldgs =
                f64::from(summary.member_buildings) / f64::from(summary.buildings);
            summary.members_per_100_units = if summary.total_units > 0.0 {
                f64::from(summary.total_members) / summary.total_units * 100.0
            } else {
                0.0
            };
            summary
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.total_units
            .total_cmp(&a.total_units)
            .then(b.buildings.cmp(&a.buildings))
    });
    summaries
}
