//! Building selection.
//!
//! Filters raw building rows to the requested local areas, derives their
//! primary and alternate address keys, and reads the owner group through a
//! column resolved at runtime.

use building_map_address::{UNKNOWN, address_key};
use building_map_table::{ColumnAccessor, Table};

use crate::PipelineError;

/// Columns the building source must provide.
pub const BUILDING_COLUMNS: [&str; 2] = ["local_area", "address"];

/// Owner columns probed in priority order.
pub const OWNER_CANDIDATES: [&str; 5] = [
    "bsns_group",
    "business_group",
    "owner_group",
    "owner",
    "ownership_group",
];

/// Fragments matched against column names when no candidate exists.
const OWNER_FRAGMENTS: [&str; 2] = ["group", "owner"];

/// Raw numeric cells, coerced during the join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawNumbers {
    /// Residential units.
    pub units: Option<String>,
    /// Year built.
    pub year_built: Option<String>,
    /// Assessed land value.
    pub value_land: Option<String>,
    /// Assessed building value.
    pub value_bldg: Option<String>,
    /// Building-to-land value ratio.
    pub bldg_land_ratio: Option<String>,
    /// Reported issues.
    pub n_issues: Option<String>,
}

/// One selected building row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildingRow {
    /// Free-form address.
    pub address: Option<String>,
    /// Local area, `(Unknown)` when blank.
    pub local_area: String,
    /// Key derived from `address`.
    pub key: String,
    /// Key derived from `primary_address`, or `key` when absent.
    pub alt_key: String,
    /// Raw owner group value.
    pub owner: Option<String>,
    /// Numeric cells.
    pub numbers: RawNumbers,
}

/// Output of [`select_buildings`].
#[derive(Debug, Clone)]
pub struct BuildingSelection {
    /// Selected rows in source order.
    pub rows: Vec<BuildingRow>,
    /// How the owner value was located.
    pub owner: ColumnAccessor,
}

/// Selects building rows, optionally restricted to `allowed_areas`
/// (case-insensitive).
///
/// # Errors
///
/// Returns [`PipelineError::Table`] if a required column is missing.
pub fn select_buildings(
    table: &Table,
    allowed_areas: Option<&[String]>,
) -> Result<BuildingSelection, PipelineError> {
    table.require_columns(&BUILDING_COLUMNS)?;

    let owner = ColumnAccessor::resolve(table, &OWNER_CANDIDATES, &OWNER_FRAGMENTS, UNKNOWN);
    match owner.column_name() {
        Some(name) => log::debug!("Using '{name}' as the owner group column"),
        None => log::warn!("No owner column found in {}; owners default to {UNKNOWN}", table.label()),
    }

    let allowed: Option<Vec<String>> =
        allowed_areas.map(|areas| areas.iter().map(|a| a.trim().to_lowercase()).collect());

    let area_col = table.column_index("local_area");
    let address_col = table.column_index("address");
    let primary_col = table.column_index("primary_address");
    let cols = [
        table.column_index("units"),
        table.column_index("year_built"),
        table.column_index("value_land"),
        table.column_index("value_bldg"),
        table.column_index("bldg_land_ratio"),
        table.column_index("n_issues"),
    ];

    let mut rows = Vec::new();
    for row in table.rows() {
        let local_area = row.at(area_col).unwrap_or(UNKNOWN).to_string();
        if let Some(allowed) = &allowed
            && !allowed.contains(&local_area.to_lowercase())
        {
            continue;
        }

        let address = row.at(address_col).map(str::to_string);
        let key = address_key(address.as_deref().unwrap_or_default());
        let alt_key = row
            .at(primary_col)
            .map_or_else(|| key.clone(), address_key);
        let text = |index: Option<usize>| row.at(index).map(str::to_string);

        rows.push(BuildingRow {
            owner: owner.get(&row).map(str::to_string),
            numbers: RawNumbers {
                units: text(cols[0]),
                year_built: text(cols[1]),
                value_land: text(cols[2]),
                value_bldg: text(cols[3]),
                bldg_land_ratio: text(cols[4]),
                n_issues: text(cols[5]),
            },
            address,
            local_area,
            key,
            alt_key,
        });
    }

    if let Some(areas) = allowed_areas {
        log::info!(
            "Selected {} of {} building rows in {} local area(s)",
            rows.len(),
            table.len(),
            areas.len()
        );
    }

    Ok(BuildingSelection { rows, owner })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buildings() -> Table {
        Table::from_strs(
            "Buildings CSV",
            &["local_area", "address", "primary_address", "bsns_group", "units"],
            &[
                &["West End", "100 Pine Street", "", "['Acme']", "10"],
                &["", "12 Oak Av", "14 Oak Avenue", "", ""],
                &["Kitsilano", "5 Elm Rd", "", "Beta", "3"],
            ],
        )
    }

    #[test]
    fn derives_keys() {
        let selection = select_buildings(&buildings(), None).unwrap();
        let rows = &selection.rows;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].key, "100 pine st");
        assert_eq!(rows[0].alt_key, "100 pine st");
        assert_eq!(rows[1].key, "12 oak ave");
        assert_eq!(rows[1].alt_key, "14 oak ave");
        assert_eq!(rows[0].numbers.units.as_deref(), Some("10"));
    }

    #[test]
    fn fills_unknown_area() {
        let selection = select_buildings(&buildings(), None).unwrap();
        assert_eq!(selection.rows[1].local_area, UNKNOWN);
    }

    #[test]
    fn filters_areas_case_insensitively() {
        let allowed = vec!["west end".to_string(), "KITSILANO".to_string()];
        let selection = select_buildings(&buildings(), Some(&allowed)).unwrap();
        let areas: Vec<&str> = selection.rows.iter().map(|r| r.local_area.as_str()).collect();
        assert_eq!(areas, vec!["West End", "Kitsilano"]);
    }

    #[test]
    fn resolves_owner_column() {
        let selection = select_buildings(&buildings(), None).unwrap();
        assert_eq!(selection.owner.column_name(), Some("bsns_group"));
        assert_eq!(selection.rows[0].owner.as_deref(), Some("['Acme']"));
        assert_eq!(selection.rows[1].owner, None);
    }

    #[test]
    fn synthesizes_unknown_owner() {
        let table = Table::from_strs("Buildings CSV", &["local_area", "address"], &[&["A", "1 Main St"]]);
        let selection = select_buildings(&table, None).unwrap();
        assert_eq!(selection.owner.column_name(), None);
        assert_eq!(selection.rows[0].owner.as_deref(), Some(UNKNOWN));
    }

    #[test]
    fn missing_address_column_is_fatal() {
        let table = Table::from_strs("Buildings CSV", &["local_area"], &[]);
        assert!(select_buildings(&table, None).is_err());
    }
}
