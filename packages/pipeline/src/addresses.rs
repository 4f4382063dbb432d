//! Address table preparation.
//!
//! Turns raw civic address rows into [`AddressRecord`]s carrying parsed
//! coordinates and the join key shared with the building table.

use building_map_address::{address_key, format_civic_number, normalize_street, parse_lat_lon, parse_number};
use building_map_table::Table;

use crate::PipelineError;

/// Columns the address source must provide.
pub const ADDRESS_COLUMNS: [&str; 3] = ["civic_number", "std_street", "geo_point_2d"];

/// One prepared civic address.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressRecord {
    /// Numeric civic number, possibly fractional.
    pub civic_number: Option<f64>,
    /// Street name as written.
    pub street: Option<String>,
    /// Parsed latitude.
    pub lat: Option<f64>,
    /// Parsed longitude.
    pub lon: Option<f64>,
    /// Normalized street, if a street is present.
    pub street_norm: Option<String>,
    /// Join key.
    pub key: String,
    /// Local area label carried by the address source, if any.
    pub area: Option<String>,
}

impl AddressRecord {
    /// Whether both coordinates parsed.
    #[must_use]
    pub const fn has_coordinates(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }
}

/// Prepares every row of the address table.
///
/// Unparseable coordinates and civic numbers become `None`.
///
/// # Errors
///
/// Returns [`PipelineError::Table`] if a required column is missing.
pub fn prepare_addresses(table: &Table) -> Result<Vec<AddressRecord>, PipelineError> {
    table.require_columns(&ADDRESS_COLUMNS)?;

    let civic_col = table.column_index("civic_number");
    let street_col = table.column_index("std_street");
    let point_col = table.column_index("geo_point_2d");
    let area_cols: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| name.contains("local_area"))
        .map(|(index, _)| index)
        .collect();

    let records: Vec<AddressRecord> = table
        .rows()
        .map(|row| {
            let civic_number = parse_number(row.at(civic_col));
            let street = row.at(street_col).map(str::to_string);
            let coords = parse_lat_lon(row.at(point_col));
            let area = area_cols
                .iter()
                .find_map(|index| row.at(Some(*index)))
                .map(str::to_string);

            AddressRecord {
                key: record_key(civic_number, street.as_deref()),
                street_norm: street.as_deref().map(normalize_street),
                civic_number,
                street,
                lat: coords.map(|(lat, _)| lat),
                lon: coords.map(|(_, lon)| lon),
                area,
            }
        })
        .collect();

    let unparsed = records.iter().filter(|r| !r.has_coordinates()).count();
    if unparsed > 0 {
        log::warn!(
            "{unparsed} of {} address rows have no parseable coordinates",
            records.len()
        );
    }

    Ok(records)
}

fn record_key(civic_number: Option<f64>, street: Option<&str>) -> String {
    match (civic_number, street) {
        (_, None) => address_key(""),
        (None, Some(street)) => address_key(street),
        (Some(civic), Some(street)) => {
            address_key(&format!("{} {street}", format_civic_number(civic)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> Table {
        Table::from_strs(
            "Addresses CSV",
            &["civic_number", "std_street", "geo_point_2d", "local_area_name"],
            rows,
        )
    }

    #[test]
    fn prepares_key_and_coordinates() {
        let records =
            prepare_addresses(&table(&[&["100", "Pine Street", "49.28, -123.12", "West End"]]))
                .unwrap();
        let record = &records[0];
        assert_eq!(record.key, "100 pine st");
        assert_eq!(record.street_norm.as_deref(), Some("pine st"));
        assert_eq!(record.lat, Some(49.28));
        assert_eq!(record.lon, Some(-123.12));
        assert_eq!(record.area.as_deref(), Some("West End"));
    }

    #[test]
    fn unparseable_values_are_missing() {
        let records = prepare_addresses(&table(&[&["abc", "Pine St", "nowhere", ""]])).unwrap();
        let record = &records[0];
        assert_eq!(record.civic_number, None);
        assert_eq!(record.key, "pine st");
        assert!(!record.has_coordinates());
        assert_eq!(record.area, None);
    }

    #[test]
    fn overflowing_coordinates_are_missing() {
        let point = format!("{}, -123.1", "9".repeat(400));
        let records =
            prepare_addresses(&table(&[&["100", "Pine St", point.as_str(), ""]])).unwrap();
        assert!(!records[0].has_coordinates());
        assert_eq!(records[0].lat, None);
    }

    #[test]
    fn missing_street_gives_empty_key() {
        let records = prepare_addresses(&table(&[&["12", "", "1,2", ""]])).unwrap();
        assert_eq!(records[0].key, "");
        assert_eq!(records[0].street_norm, None);
    }

    #[test]
    fn missing_columns_are_fatal() {
        let err = prepare_addresses(&Table::from_strs("Addresses CSV", &["civic_number"], &[]))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Addresses CSV"), "{message}");
        assert!(message.contains("geo_point_2d"), "{message}");
        assert!(message.contains("std_street"), "{message}");
    }
}
