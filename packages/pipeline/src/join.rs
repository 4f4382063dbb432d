//! Building to address matching.
//!
//! Buildings are matched to civic addresses by primary key, then by
//! alternate key. Rows still without coordinates fall back to the address
//! on the same normalized street with the nearest civic number.

use std::collections::BTreeMap;

use building_map_address::{UNKNOWN, parse_number, split_address_key};

use crate::addresses::AddressRecord;
use crate::buildings::{BuildingRow, RawNumbers};

/// Unmatched addresses listed in the coverage log.
const UNMATCHED_SAMPLE: usize = 10;

/// How a building row got its coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Primary key matched an address with coordinates.
    Exact,
    /// Coordinates came (at least partly) from the alternate key.
    Alternate,
    /// Coordinates came from the nearest civic number on the same street.
    NearestCivic,
    /// No coordinates could be found.
    Unmatched,
}

/// Coerced numeric attributes of a building row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BuildingNumbers {
    /// Residential units.
    pub units: Option<f64>,
    /// Year built.
    pub year_built: Option<f64>,
    /// Assessed land value.
    pub value_land: Option<f64>,
    /// Assessed building value.
    pub value_bldg: Option<f64>,
    /// Building-to-land value ratio.
    pub bldg_land_ratio: Option<f64>,
    /// Reported issues.
    pub n_issues: Option<f64>,
}

impl From<&RawNumbers> for BuildingNumbers {
    fn from(raw: &RawNumbers) -> Self {
        Self {
            units: parse_number(raw.units.as_deref()),
            year_built: parse_number(raw.year_built.as_deref()),
            value_land: parse_number(raw.value_land.as_deref()),
            value_bldg: parse_number(raw.value_bldg.as_deref()),
            bldg_land_ratio: parse_number(raw.bldg_land_ratio.as_deref()),
            n_issues: parse_number(raw.n_issues.as_deref()),
        }
    }
}

/// A building row after the address join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedBuildingRow {
    /// Free-form address.
    pub address: Option<String>,
    /// Primary key.
    pub key: String,
    /// Alternate key.
    pub alt_key: String,
    /// Local area after reconciliation.
    pub local_area: String,
    /// Raw owner group value.
    pub owner: Option<String>,
    /// Latitude.
    pub lat: Option<f64>,
    /// Longitude.
    pub lon: Option<f64>,
    /// How the coordinates were found.
    pub match_kind: MatchKind,
    /// Coerced numeric attributes.
    pub numbers: BuildingNumbers,
}

impl JoinedBuildingRow {
    /// Whether both coordinates are known.
    #[must_use]
    pub const fn has_coordinates(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }
}

/// Joins buildings to addresses.
///
/// Never fails: unmatched rows are returned with missing coordinates and
/// only reduce coverage.
#[must_use]
pub fn join_buildings_addresses(
    buildings: &[BuildingRow],
    addresses: &[AddressRecord],
) -> Vec<JoinedBuildingRow> {
    let lookup = address_lookup(addresses);
    let streets = street_groups(addresses);

    let joined: Vec<JoinedBuildingRow> = buildings
        .iter()
        .map(|building| join_row(building, &lookup, &streets))
        .collect();

    log_coverage(&joined);
    joined
}

/// First address record per non-empty key.
fn address_lookup(addresses: &[AddressRecord]) -> BTreeMap<&str, &AddressRecord> {
    let mut lookup = BTreeMap::new();
    for record in addresses.iter().filter(|r| !r.key.is_empty()) {
        lookup.entry(record.key.as_str()).or_insert(record);
    }
    lookup
}

/// Address records with coordinates grouped by normalized street, in
/// source order.
fn street_groups(addresses: &[AddressRecord]) -> BTreeMap<&str, Vec<&AddressRecord>> {
    let mut groups: BTreeMap<&str, Vec<&AddressRecord>> = BTreeMap::new();
    for record in addresses.iter().filter(|r| r.has_coordinates()) {
        if let Some(street) = record.street_norm.as_deref() {
            groups.entry(street).or_default().push(record);
        }
    }
    groups
}

fn join_row(
    building: &BuildingRow,
    lookup: &BTreeMap<&str, &AddressRecord>,
    streets: &BTreeMap<&str, Vec<&AddressRecord>>,
) -> JoinedBuildingRow {
    let primary = lookup.get(building.key.as_str()).copied();
    let alternate = lookup.get(building.alt_key.as_str()).copied();

    let mut lat = primary.and_then(|r| r.lat);
    let mut lon = primary.and_then(|r| r.lon);
    let mut match_kind = MatchKind::Exact;
    if lat.is_none() || lon.is_none() {
        lat = lat.or_else(|| alternate.and_then(|r| r.lat));
        lon = lon.or_else(|| alternate.and_then(|r| r.lon));
        match_kind = MatchKind::Alternate;
    }

    let address_area = primary
        .and_then(|r| r.area.as_deref())
        .or_else(|| alternate.and_then(|r| r.area.as_deref()));
    let mut local_area = building.local_area.clone();
    if local_area == UNKNOWN
        && let Some(area) = address_area
    {
        local_area = area.to_string();
    }

    if lat.is_none() || lon.is_none() {
        match nearest_civic(&building.key, streets) {
            Some(candidate) => {
                lat = candidate.lat;
                lon = candidate.lon;
                match_kind = MatchKind::NearestCivic;
                if local_area == UNKNOWN
                    && let Some(area) = &candidate.area
                {
                    local_area.clone_from(area);
                }
            }
            None => match_kind = MatchKind::Unmatched,
        }
    }

    JoinedBuildingRow {
        address: building.address.clone(),
        key: building.key.clone(),
        alt_key: building.alt_key.clone(),
        local_area,
        owner: building.owner.clone(),
        lat,
        lon,
        match_kind,
        numbers: BuildingNumbers::from(&building.numbers),
    }
}

/// Picks the address on the key's street whose civic number is closest to
/// the key's. Equal distances keep the earlier record; a key without a
/// numeric civic number takes the street's first record.
fn nearest_civic<'a>(
    key: &str,
    streets: &BTreeMap<&str, Vec<&'a AddressRecord>>,
) -> Option<&'a AddressRecord> {
    let (civic, street) = split_address_key(key)?;
    let candidates = streets.get(street)?;

    let Some(target) = civic else {
        return candidates.first().copied();
    };

    let mut best: Option<(f64, &AddressRecord)> = None;
    for candidate in candidates {
        let Some(number) = candidate.civic_number else {
            continue;
        };
        let distance = (number - target).abs();
        if best.is_none_or(|(best_distance, _)| distance < best_distance) {
            best = Some((distance, candidate));
        }
    }

    best.map(|(_, record)| record)
        .or_else(|| candidates.first().copied())
}

#[allow(clippy::cast_precision_loss)]
fn log_coverage(joined: &[JoinedBuildingRow]) {
    if joined.is_empty() {
        return;
    }

    let fallback = joined
        .iter()
        .filter(|r| r.match_kind == MatchKind::NearestCivic)
        .count();
    if fallback > 0 {
        log::info!("Nearest civic number fallback matched {fallback} building rows");
    }

    let unmatched: Vec<&JoinedBuildingRow> =
        joined.iter().filter(|r| !r.has_coordinates()).collect();
    if unmatched.is_empty() {
        return;
    }

    let pct = unmatched.len() as f64 / joined.len() as f64 * 100.0;
    log::warn!(
        "{} of {} building rows ({pct:.1}%) have no coordinates and will be dropped",
        unmatched.len(),
        joined.len()
    );
    let sample: Vec<&str> = unmatched
        .iter()
        .filter_map(|r| r.address.as_deref())
        .take(UNMATCHED_SAMPLE)
        .collect();
    if !sample.is_empty() {
        log::warn!("Unmatched addresses (sample): {}", sample.join("; "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(civic: Option<f64>, street: &str, lat: f64, lon: f64, area: Option<&str>) -> AddressRecord {
        let street_norm = building_map_address::normalize_street(street);
        let key = civic.map_or_else(
            || street_norm.clone(),
            |c| format!("{} {street_norm}", building_map_address::format_civic_number(c)),
        );
        AddressRecord {
            civic_number: civic,
            street: Some(street.to_string()),
            lat: Some(lat),
            lon: Some(lon),
            street_norm: Some(street_norm),
            key,
            area: area.map(str::to_string),
        }
    }

    fn building(address: &str, area: &str) -> BuildingRow {
        let key = building_map_address::address_key(address);
        BuildingRow {
            address: Some(address.to_string()),
            local_area: area.to_string(),
            alt_key: key.clone(),
            key,
            owner: None,
            numbers: RawNumbers {
                units: Some("4".to_string()),
                year_built: Some("not a year".to_string()),
                ..RawNumbers::default()
            },
        }
    }

    #[test]
    fn exact_match_uses_first_seen_address() {
        let addresses = [
            address(Some(100.0), "Pine St", 1.0, 2.0, None),
            address(Some(100.0), "Pine Street", 9.0, 9.0, None),
        ];
        let joined = join_buildings_addresses(&[building("100 Pine Street", "A")], &addresses);
        assert_eq!(joined[0].match_kind, MatchKind::Exact);
        assert_eq!((joined[0].lat, joined[0].lon), (Some(1.0), Some(2.0)));
    }

    #[test]
    fn coerces_numbers() {
        let addresses = [address(Some(1.0), "Oak St", 1.0, 2.0, None)];
        let joined = join_buildings_addresses(&[building("1 Oak St", "A")], &addresses);
        assert_eq!(joined[0].numbers.units, Some(4.0));
        assert_eq!(joined[0].numbers.year_built, None);
        assert_eq!(joined[0].numbers.value_land, None);
    }

    #[test]
    fn alternate_key_fills_gaps() {
        let mut row = building("12 Oak Av", "A");
        row.alt_key = "14 oak ave".to_string();
        let addresses = [address(Some(14.0), "Oak Avenue", 3.0, 4.0, None)];
        let joined = join_buildings_addresses(&[row], &addresses);
        assert_eq!(joined[0].match_kind, MatchKind::Alternate);
        assert_eq!((joined[0].lat, joined[0].lon), (Some(3.0), Some(4.0)));
    }

    #[test]
    fn unknown_area_takes_address_area() {
        let addresses = [address(Some(1.0), "Oak St", 1.0, 2.0, Some("Fairview"))];
        let joined = join_buildings_addresses(
            &[building("1 Oak St", UNKNOWN), building("1 Oak St", "Mount Pleasant")],
            &addresses,
        );
        assert_eq!(joined[0].local_area, "Fairview");
        assert_eq!(joined[1].local_area, "Mount Pleasant");
    }

    #[test]
    fn nearest_civic_fallback() {
        let addresses = [
            address(Some(110.0), "Pine St", 5.0, 5.0, None),
            address(Some(102.0), "Pine St", 1.0, 2.0, Some("West End")),
            address(Some(300.0), "Oak St", 9.0, 9.0, None),
        ];
        let joined = join_buildings_addresses(&[building("100 Pine Street", UNKNOWN)], &addresses);
        assert_eq!(joined[0].match_kind, MatchKind::NearestCivic);
        assert_eq!((joined[0].lat, joined[0].lon), (Some(1.0), Some(2.0)));
        assert_eq!(joined[0].local_area, "West End");
    }

    #[test]
    fn nearest_civic_ties_keep_input_order() {
        let addresses = [
            address(Some(98.0), "Pine St", 1.0, 1.0, None),
            address(Some(102.0), "Pine St", 2.0, 2.0, None),
        ];
        let joined = join_buildings_addresses(&[building("100 Pine St", "A")], &addresses);
        assert_eq!(joined[0].lat, Some(1.0));
    }

    #[test]
    fn no_street_group_stays_unmatched() {
        let addresses = [address(Some(102.0), "Pine St", 1.0, 2.0, None)];
        let joined = join_buildings_addresses(&[building("100 Elm St", "A")], &addresses);
        assert_eq!(joined[0].match_kind, MatchKind::Unmatched);
        assert!(!joined[0].has_coordinates());
    }

    #[test]
    fn empty_keys_never_match() {
        let mut blank = address(None, "", 1.0, 2.0, None);
        blank.key = String::new();
        blank.street_norm = None;
        let mut row = building("", "A");
        row.address = None;
        let joined = join_buildings_addresses(&[row], &[blank]);
        assert!(!joined[0].has_coordinates());
    }
}
