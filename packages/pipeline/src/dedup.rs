//! Address-level deduplication.
//!
//! Collapses every group of enriched building rows that share an address key
//! into one [`MapPoint`]. Rows without coordinates leave the dataset here.

use std::collections::BTreeMap;

use building_map_address::{UNKNOWN, clean_owner_label, sanitize_owner};
use building_map_pipeline_models::MapPoint;

use crate::membership::{EnrichedBuildingRow, member_share};
use crate::stats::{max, median, mode};

/// Groups rows by key in first-appearance order.
fn group_by_key(rows: &[EnrichedBuildingRow]) -> Vec<(&str, Vec<&EnrichedBuildingRow>)> {
    let mut positions: BTreeMap<&str, usize> = BTreeMap::new();
    let mut groups: Vec<(&str, Vec<&EnrichedBuildingRow>)> = Vec::new();
    for row in rows {
        let key = row.row.key.as_str();
        if let Some(&position) = positions.get(key) {
            groups[position].1.push(row);
        } else {
            positions.insert(key, groups.len());
            groups.push((key, vec![row]));
        }
    }
    groups
}

/// Collapses one address group. `None` if no row has both coordinates.
fn collapse(key: &str, group: &[&EnrichedBuildingRow]) -> Option<MapPoint> {
    let lat = group.iter().find_map(|r| r.row.lat)?;
    let lon = group.iter().find_map(|r| r.row.lon)?;
    let numbers = || group.iter().map(|r| r.row.numbers);

    let address = mode(group.iter().filter_map(|r| r.row.address.as_deref()))
        .unwrap_or_default()
        .to_string();

    let units = max(numbers().filter_map(|n| n.units));
    let value_land = median(numbers().filter_map(|n| n.value_land));
    let value_bldg = median(numbers().filter_map(|n| n.value_bldg));
    let bldg_land_ratio = median(numbers().filter_map(|n| n.bldg_land_ratio)).or_else(|| {
        match (value_bldg, value_land) {
            (Some(bldg), Some(land)) if land != 0.0 => Some(bldg / land),
            _ => None,
        }
    });

    let owner_labels: Vec<String> = group
        .iter()
        .filter_map(|r| r.row.owner.as_deref())
        .map(|owner| clean_owner_label(Some(owner)))
        .collect();
    let owner_group = clean_owner_label(Some(
        mode(owner_labels.iter().map(String::as_str)).unwrap_or(UNKNOWN),
    ));

    let local_area = mode(
        group
            .iter()
            .map(|r| r.row.local_area.as_str())
            .filter(|area| !area.is_empty() && *area != UNKNOWN),
    )
    .unwrap_or(UNKNOWN)
    .to_string();

    let member_count = group.iter().map(|r| r.member_count).max().unwrap_or(0);
    let member_count_all = group
        .iter()
        .map(|r| r.member_count_all)
        .max()
        .unwrap_or(0)
        .max(member_count);

    Some(MapPoint {
        b_id: 0,
        addr_key: key.to_string(),
        address,
        lat,
        lon,
        units,
        year_built: median(numbers().filter_map(|n| n.year_built)),
        n_issues: max(numbers().filter_map(|n| n.n_issues)),
        value_land,
        value_bldg,
        bldg_land_ratio,
        owner_key: sanitize_owner(&owner_group),
        owner_group,
        member_count,
        member_count_all,
        has_member: member_count > 0,
        member_share_building: member_share(member_count, units),
        local_area,
        block_id: None,
        members_payload: group
            .iter()
            .map(|r| &r.members_payload)
            .find(|payload| !payload.is_empty())
            .cloned()
            .unwrap_or_default(),
    })
}

/// One map point per address key with coordinates. `b_id` is the output
/// position.
#[must_use]
pub fn deduplicate_buildings(rows: &[EnrichedBuildingRow]) -> Vec<MapPoint> {
    let groups = group_by_key(rows);
    let collapsed = groups.iter().filter(|(_, group)| group.len() > 1).count();
    if collapsed > 0 {
        log::info!("Collapsed {collapsed} duplicate address groups");
    }

    let points: Vec<MapPoint> = groups
        .iter()
        .filter_map(|(key, group)| collapse(key, group))
        .enumerate()
        .map(|(b_id, point)| MapPoint { b_id, ..point })
        .collect();

    let dropped = groups.len() - points.len();
    if dropped > 0 {
        log::warn!("Dropped {dropped} address groups without coordinates");
    }

    points
}
