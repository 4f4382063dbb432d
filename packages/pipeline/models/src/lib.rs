#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Output types of the building map pipeline.
//!
//! These are the records handed to the rendering side and written to the
//! preprocessed cache: one [`MapPoint`] per physical building, one
//! [`BlockRecord`] per neighborhood block, and the [`FilterConfig`] that
//! drives the interactive filters.

use std::collections::BTreeMap;

use building_map_spatial::BoundingBox;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Projection of one membership export row, kept on the map point for
/// client-side filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipProjection {
    /// Tags parsed from the comma-separated tag list.
    pub tags: Vec<String>,
    /// Last update timestamp in ISO 8601, if parseable.
    pub updated_at: Option<String>,
    /// Whether any tag is exactly `member` (case-insensitive).
    pub has_member_tag: bool,
    /// Most recent `membership-YYYY` year among the tags.
    pub latest_membership_year: Option<i32>,
    /// Whether the row counts toward active membership by default.
    pub is_active_default: bool,
}

/// One physical building on the map.
///
/// Unique per address key. Coordinates are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    /// Synthetic id (output row position).
    pub b_id: usize,
    /// Normalized address key shared by every source row of this building.
    pub addr_key: String,
    /// Display address (most frequent spelling in the group).
    pub address: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Residential units (maximum across duplicate rows).
    pub units: Option<f64>,
    /// Median year built.
    pub year_built: Option<f64>,
    /// Reported issue count (maximum across duplicate rows).
    pub n_issues: Option<f64>,
    /// Median assessed land value.
    pub value_land: Option<f64>,
    /// Median assessed building value.
    pub value_bldg: Option<f64>,
    /// Building-to-land value ratio.
    pub bldg_land_ratio: Option<f64>,
    /// Cleaned owner group label.
    pub owner_group: String,
    /// URL/attribute-safe owner key.
    pub owner_key: String,
    /// Active member count.
    pub member_count: u32,
    /// All-time member count (never below `member_count`).
    pub member_count_all: u32,
    /// Whether the building has at least one active member.
    pub has_member: bool,
    /// Active members per unit, capped at 1.
    pub member_share_building: f64,
    /// Neighborhood / local area label.
    pub local_area: String,
    /// Containing block, if any.
    pub block_id: Option<usize>,
    /// Membership rows recorded at this address.
    pub members_payload: Vec<MembershipProjection>,
}

/// Aggregate statistics for one block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockStats {
    /// Buildings assigned to the block.
    pub buildings: u32,
    /// Sum of known unit counts.
    pub total_units: f64,
    /// Median year built of the assigned buildings.
    pub median_year_built: Option<f64>,
    /// Buildings with at least one active member.
    pub member_buildings: u32,
    /// Sum of active members.
    pub total_members: u32,
    /// `member_buildings / buildings`, or 0 for empty blocks.
    pub member_share: f64,
}

/// Serializable form of a block, with its geometry as `GeoJSON`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Synthetic id assigned in parse order.
    pub block_id: usize,
    /// Block outline.
    pub geom_geojson: geojson::Geometry,
    /// Remaining source columns, passed through untouched.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Aggregates over the buildings in this block.
    #[serde(flatten)]
    pub stats: BlockStats,
}

/// Display format of a building metric.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricFormat {
    /// Dollar amounts.
    Currency,
    /// Unitless ratios.
    Ratio,
    /// Plain numbers.
    #[default]
    Number,
}

/// Numeric type of a building metric.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValueType {
    /// Whole numbers, stepped by 1.
    Int,
    /// Real numbers.
    #[default]
    Float,
}

/// Configuration for summarizing one numeric [`MapPoint`] attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Attribute name (`value_land`, `value_bldg`, `bldg_land_ratio`,
    /// `units`).
    pub column: String,
    /// Human-readable label.
    pub label: String,
    /// Display format.
    #[serde(default)]
    pub format: MetricFormat,
    /// Unit symbol (e.g. `$`).
    #[serde(default)]
    pub unit: Option<String>,
    /// Numeric type.
    #[serde(default, rename = "type")]
    pub value_type: ValueType,
    /// Slider step; derived from the data when absent.
    #[serde(default)]
    pub step: Option<f64>,
    /// Decimal places; 0 for integers, 2 otherwise when absent.
    #[serde(default)]
    pub decimals: Option<u32>,
    /// Markup attribute name; derived from `column` when absent.
    #[serde(default)]
    pub attr: Option<String>,
    /// Explicit bin count; `clamp(sqrt(n), 6, 24)` when absent.
    #[serde(default)]
    pub bins: Option<usize>,
    /// Use logarithmic bins whenever the data allows it.
    #[serde(default)]
    pub force_log: bool,
    /// Explicit log-scale override.
    #[serde(default)]
    pub use_log: Option<bool>,
    /// `max / positive_min` ratio at or above which log bins are used.
    #[serde(default)]
    pub log_threshold: Option<f64>,
}

impl MetricSpec {
    /// Creates a spec with every optional setting unset.
    #[must_use]
    pub fn new(column: &str, label: &str) -> Self {
        Self {
            column: column.to_string(),
            label: label.to_string(),
            format: MetricFormat::Number,
            unit: None,
            value_type: ValueType::Float,
            step: None,
            decimals: None,
            attr: None,
            bins: None,
            force_log: false,
            use_log: None,
            log_threshold: None,
        }
    }
}

/// One histogram bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    /// Left edge.
    pub start: f64,
    /// Right edge.
    pub end: f64,
    /// Samples falling in the bin.
    pub count: u64,
}

/// Range-filter metadata for one numeric attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Human-readable label.
    pub label: String,
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
    /// Default lower handle position.
    pub suggested_min: f64,
    /// Default upper handle position.
    pub suggested_max: f64,
    /// Slider step.
    pub step: f64,
    /// Histogram bins, left to right.
    pub bins: Vec<HistogramBin>,
    /// Largest bin count.
    pub max_count: u64,
    /// Display format.
    pub format: MetricFormat,
    /// Unit symbol.
    pub unit: Option<String>,
    /// Numeric type.
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Decimal places for display.
    pub decimals: u32,
    /// Markup attribute name.
    pub attr: String,
    /// Smallest strictly positive sample.
    pub min_positive: Option<f64>,
    /// Whether the bins are logarithmic.
    pub use_log: bool,
}

/// Count of membership rows whose latest membership year is `year`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearCount {
    /// Membership year.
    pub year: i32,
    /// Rows with that year.
    pub count: u64,
}

/// A membership tag and how many rows carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    /// Tag text as written in the export.
    pub name: String,
    /// Number of occurrences.
    pub count: u64,
}

/// Building and unit counts for one neighborhood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighbourhoodCount {
    /// Local area label.
    pub name: String,
    /// Map points in the area.
    pub count: u64,
    /// Rounded sum of known units.
    pub units: i64,
}

/// Geographic extent of the map points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Southernmost latitude.
    pub lat_min: f64,
    /// Northernmost latitude.
    pub lat_max: f64,
    /// Westernmost longitude.
    pub lon_min: f64,
    /// Easternmost longitude.
    pub lon_max: f64,
    /// Mean latitude.
    pub center_lat: f64,
    /// Mean longitude.
    pub center_lon: f64,
}

impl Bounds {
    /// The bounds as a box, without the center.
    #[must_use]
    pub const fn to_bbox(&self) -> BoundingBox {
        BoundingBox {
            lon_min: self.lon_min,
            lat_min: self.lat_min,
            lon_max: self.lon_max,
            lat_max: self.lat_max,
        }
    }
}

/// Dataset-wide totals shown in the filter panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetTotals {
    /// Map points.
    pub buildings: u64,
    /// Active members.
    pub members: u64,
    /// Known units (truncated).
    pub units: i64,
    /// Buildings with at least one active member.
    pub member_buildings: u64,
}

/// Everything the interactive filters need that is computed up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Most recent membership years first (at most 8).
    pub membership_years: Vec<YearCount>,
    /// Most common membership-related tags (at most 12).
    pub top_tags: Vec<TagCount>,
    /// Default "updated since" cutoff (one year before the run).
    pub default_updated_since: NaiveDate,
    /// Earliest membership year seen.
    pub updated_year_min: Option<i32>,
    /// Latest membership year seen.
    pub updated_year_max: Option<i32>,
    /// Range-filter metadata keyed by attribute name.
    pub building_metrics: BTreeMap<String, MetricSummary>,
    /// Preferred display order of `building_metrics`.
    pub building_metric_order: Vec<String>,
    /// Per-neighborhood counts, most buildings first.
    pub neighbourhoods: Vec<NeighbourhoodCount>,
    /// Extent of the map points, if any.
    pub bounds: Option<Bounds>,
    /// Dataset-wide totals.
    pub dataset_totals: DatasetTotals,
    /// Largest per-block unit total.
    pub blocks_total_units_max: i64,
}

/// Aggregates for one owner group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerSummary {
    /// Cleaned owner label.
    pub owner_group: String,
    /// Sanitized owner key.
    pub owner_key: String,
    /// Buildings held.
    pub buildings: u32,
    /// Sum of known units.
    pub total_units: f64,
    /// Buildings with at least one active member.
    pub member_buildings: u32,
    /// Sum of active members.
    pub total_members: u32,
    /// `member_buildings / buildings`.
    pub share_bldgs: f64,
    /// Active members per 100 units.
    pub members_per_100_units: f64,
}

/// Data-quality counters from one run. Never fatal; logged and reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQuality {
    /// Building rows after area filtering.
    pub buildings_total: u64,
    /// Building rows with no local area.
    pub local_area_unknown: u64,
    /// Building rows after the address join.
    pub address_match_total: u64,
    /// Joined rows with coordinates.
    pub address_match_with_coordinates: u64,
    /// Joined rows without coordinates.
    pub address_match_without_coordinates: u64,
    /// Rows that needed the nearest-civic-number fallback.
    pub address_match_nearest_civic: u64,
    /// Distinct address keys among rows with coordinates.
    pub address_unique_matched: u64,
    /// Output map points.
    pub map_points: u64,
    /// Rows with coordinates merged into another row with the same key.
    pub duplicate_addresses_collapsed: u64,
    /// Map points still without a local area.
    pub local_area_unknown_after_enrichment: u64,
    /// Block geometries that failed to parse.
    pub blocks_unparseable: u64,
}

/// Raw input sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    /// Building rows.
    pub buildings_raw: u64,
    /// Address rows.
    pub addresses_raw: u64,
    /// Block rows.
    pub blocks_raw: u64,
    /// Membership rows.
    pub members_raw: u64,
}

/// Run metadata not persisted in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetadata {
    /// Configured bounding box.
    pub bbox: Option<BoundingBox>,
    /// Bounding box actually used to select blocks.
    pub blocks_bbox: Option<BoundingBox>,
    /// Raw input sizes.
    pub record_counts: RecordCounts,
    /// Quality counters.
    pub data_quality: DataQuality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_spec_reads_type_field() {
        let spec: MetricSpec = serde_json::from_str(
            r#"{"column":"units","label":"Units","type":"int","format":"number","force_log":true}"#,
        )
        .unwrap();
        assert_eq!(spec.value_type, ValueType::Int);
        assert!(spec.force_log);
        assert_eq!(spec.bins, None);
    }

    #[test]
    fn formats_display_as_snake_case() {
        assert_eq!(MetricFormat::Currency.to_string(), "currency");
        assert_eq!("ratio".parse::<MetricFormat>().unwrap(), MetricFormat::Ratio);
        assert_eq!(ValueType::Int.as_ref(), "int");
    }

    #[test]
    fn block_record_flattens_stats() {
        let record = BlockRecord {
            block_id: 3,
            geom_geojson: geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
                vec![0.0, 0.0],
                vec![1.0, 0.0],
                vec![1.0, 1.0],
                vec![0.0, 0.0],
            ]])),
            attributes: BTreeMap::new(),
            stats: BlockStats {
                buildings: 2,
                ..BlockStats::default()
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["buildings"], 2);
        assert_eq!(json["block_id"], 3);
        let back: BlockRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
