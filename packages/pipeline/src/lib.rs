#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Building map data pipeline.
//!
//! Reconciles building records, civic addresses, neighborhood blocks, and a
//! membership export into one deduplicated, geo-referenced [`MapPoint`] per
//! physical building, plus per-block aggregates and filter metadata.
//!
//! Stages run strictly in sequence, each producing a new value from the
//! previous one:
//!
//! 1. [`addresses::prepare_addresses`]
//! 2. [`buildings::select_buildings`]
//! 3. [`join::join_buildings_addresses`]
//! 4. [`membership::prepare_membership`] and [`membership::attach_membership`]
//! 5. [`dedup::deduplicate_buildings`]
//! 6. [`blocks::parse_blocks`], [`blocks::assign_blocks`], [`blocks::aggregate_blocks`]
//! 7. [`filters::build_filter_config`]
//!
//! Missing columns are fatal. Data-quality gaps (unparseable coordinates,
//! unmatched addresses, bad geometries) are logged and counted in
//! [`DataQuality`], never raised.

pub mod addresses;
pub mod blocks;
pub mod buildings;
pub mod cache;
pub mod dedup;
pub mod filters;
pub mod join;
pub mod membership;
pub mod metrics;
pub mod owners;
pub mod progress;
pub mod stats;

use std::collections::BTreeSet;
use std::path::PathBuf;

use building_map_address::UNKNOWN;
use building_map_pipeline_models::{
    DataQuality, FilterConfig, MapPoint, MetricSpec, PipelineMetadata, RecordCounts,
};
use building_map_spatial::BoundingBox;
use building_map_table::{Table, TableError};
use thiserror::Error;

pub use blocks::Block;
pub use progress::{NullProgress, PipelineContext, ProgressCallback, null_progress};

/// Steps reported by [`run_pipeline`].
pub const PIPELINE_STEPS: u64 = 9;

/// Degrees added around the point bounds when selecting blocks.
pub const BLOCKS_BBOX_BUFFER: f64 = 0.001;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A source table could not be loaded or lacks required columns.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Cache serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Cache file I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Some cache files are missing.
    #[error("Cache in {dir} is incomplete; missing {missing:?}")]
    IncompleteCache {
        /// Cache directory.
        dir: String,
        /// Missing file names.
        missing: Vec<String>,
    },

    /// A cached block geometry is not a polygon.
    #[error("Cached block {block_id} has an unreadable geometry")]
    InvalidCachedGeometry {
        /// Offending block.
        block_id: usize,
    },
}

/// The four source tables.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    /// Building records.
    pub buildings: Table,
    /// Civic addresses.
    pub addresses: Table,
    /// Neighborhood blocks.
    pub blocks: Table,
    /// Membership export.
    pub members: Table,
}

/// CSV paths of the four sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPaths {
    /// Building records.
    pub buildings: PathBuf,
    /// Civic addresses.
    pub addresses: PathBuf,
    /// Neighborhood blocks.
    pub blocks: PathBuf,
    /// Membership export.
    pub members: PathBuf,
}

impl PipelineInputs {
    /// Reads all four sources from CSV.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Table`] if a file cannot be read or parsed.
    pub fn load(paths: &InputPaths) -> Result<Self, PipelineError> {
        use building_map_table::csv::read_table;

        Ok(Self {
            buildings: read_table(&paths.buildings, "Buildings CSV")?,
            addresses: read_table(&paths.addresses, "Addresses CSV")?,
            blocks: read_table(&paths.blocks, "Blocks CSV")?,
            members: read_table(&paths.members, "Members CSV")?,
        })
    }

    /// Raw row counts.
    #[must_use]
    pub fn record_counts(&self) -> RecordCounts {
        RecordCounts {
            buildings_raw: self.buildings.len() as u64,
            addresses_raw: self.addresses.len() as u64,
            blocks_raw: self.blocks.len() as u64,
            members_raw: self.members.len() as u64,
        }
    }
}

/// Run options.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Area of interest for block selection.
    pub bbox: Option<BoundingBox>,
    /// Local areas to keep; all when `None`.
    pub local_areas: Option<Vec<String>>,
    /// Attributes to summarize for range filters.
    pub metrics: Vec<MetricSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bbox: None,
            local_areas: None,
            metrics: metrics::default_metric_specs(),
        }
    }
}

/// What the pipeline hands to rendering, and what the cache stores.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    /// One point per physical building.
    pub points: Vec<MapPoint>,
    /// Blocks with aggregates.
    pub blocks: Vec<Block>,
    /// Filter metadata.
    pub filter_config: FilterConfig,
}

/// A pipeline result with run metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    /// The result.
    pub result: PipelineResult,
    /// Counts and quality signals from this run.
    pub metadata: PipelineMetadata,
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Runs every stage over already-loaded tables.
///
/// # Errors
///
/// Returns [`PipelineError::Table`] if a source lacks a required column.
#[allow(clippy::too_many_lines)]
pub fn run_pipeline(
    inputs: &PipelineInputs,
    config: &PipelineConfig,
    ctx: &PipelineContext,
) -> Result<PipelineRun, PipelineError> {
    ctx.begin(PIPELINE_STEPS);
    let record_counts = inputs.record_counts();
    log::info!(
        "Loaded datasets: buildings {}, addresses {}, blocks {}, membership rows {}",
        record_counts.buildings_raw,
        record_counts.addresses_raw,
        record_counts.blocks_raw,
        record_counts.members_raw
    );
    ctx.report_step("Loaded source tables");

    let address_records = addresses::prepare_addresses(&inputs.addresses)?;
    ctx.report_step("Prepared address coordinates");

    if let Some(areas) = &config.local_areas {
        log::info!("Filtering to local areas: {}", areas.join(", "));
    }
    let selection = buildings::select_buildings(&inputs.buildings, config.local_areas.as_deref())?;
    let mut quality = DataQuality {
        buildings_total: selection.rows.len() as u64,
        local_area_unknown: selection
            .rows
            .iter()
            .filter(|r| r.local_area == UNKNOWN)
            .count() as u64,
        ..DataQuality::default()
    };
    if quality.local_area_unknown > 0 {
        log::warn!(
            "Local area missing for {} of {} buildings ({:.1}%)",
            quality.local_area_unknown,
            quality.buildings_total,
            percent(quality.local_area_unknown, quality.buildings_total)
        );
    }
    ctx.report_step("Selected target buildings");

    let joined = join::join_buildings_addresses(&selection.rows, &address_records);
    quality.address_match_total = joined.len() as u64;
    quality.address_match_with_coordinates =
        joined.iter().filter(|r| r.has_coordinates()).count() as u64;
    quality.address_match_without_coordinates =
        quality.address_match_total - quality.address_match_with_coordinates;
    quality.address_match_nearest_civic = joined
        .iter()
        .filter(|r| r.match_kind == join::MatchKind::NearestCivic)
        .count() as u64;
    quality.address_unique_matched = joined
        .iter()
        .filter(|r| r.has_coordinates())
        .map(|r| r.key.as_str())
        .collect::<BTreeSet<_>>()
        .len() as u64;
    if quality.address_match_total > 0 {
        log::info!(
            "Address match coverage: {}/{} ({:.1}%) buildings matched to coordinates",
            quality.address_match_with_coordinates,
            quality.address_match_total,
            percent(quality.address_match_with_coordinates, quality.address_match_total)
        );
    } else {
        log::info!("Address match coverage: no building records after filtering");
    }
    ctx.report_step("Matched buildings with addresses");

    let membership = membership::prepare_membership(&inputs.members, ctx.now());
    let enriched = membership::attach_membership(joined, &membership);
    ctx.report_step("Merged membership metrics");

    let points = dedup::deduplicate_buildings(&enriched);
    quality.map_points = points.len() as u64;
    quality.duplicate_addresses_collapsed = quality
        .address_match_with_coordinates
        .saturating_sub(quality.map_points);
    quality.local_area_unknown_after_enrichment =
        points.iter().filter(|p| p.local_area == UNKNOWN).count() as u64;
    log::info!(
        "Deduplicated to {} map points ({} rows merged, {} unmatched dropped, {} without local area)",
        quality.map_points,
        quality.duplicate_addresses_collapsed,
        quality.address_match_without_coordinates,
        quality.local_area_unknown_after_enrichment
    );
    ctx.report_step("Deduplicated building points");

    let blocks_bbox = filters::dataset_bounds(&points).map_or(config.bbox, |bounds| {
        let dynamic = bounds.to_bbox().expand(BLOCKS_BBOX_BUFFER);
        Some(config.bbox.map_or(dynamic, |bbox| bbox.union(&dynamic)))
    });
    let parsed = blocks::parse_blocks(&inputs.blocks, blocks_bbox.as_ref())?;
    quality.blocks_unparseable = parsed.unparseable;
    ctx.report_step("Parsed block geometries");

    let points = blocks::assign_blocks(points, &parsed.blocks);
    let blocks = blocks::aggregate_blocks(parsed.blocks, &points);
    ctx.report_step("Aggregated block statistics");

    let filter_config =
        filters::build_filter_config(&points, &blocks, &membership, &config.metrics, ctx.now());
    ctx.report_step("Prepared filter metadata");
    ctx.finish("Data stage complete");

    Ok(PipelineRun {
        result: PipelineResult {
            points,
            blocks,
            filter_config,
        },
        metadata: PipelineMetadata {
            bbox: config.bbox,
            blocks_bbox,
            record_counts,
            data_quality: quality,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{DateTime, TimeZone, Utc};
    use geo::{Intersects, Point};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn block_geom(x0: f64, y0: f64, x1: f64, y1: f64) -> String {
        format!(
            r#"{{"type":"Polygon","coordinates":[[[{x0},{y0}],[{x1},{y0}],[{x1},{y1}],[{x0},{y1}],[{x0},{y0}]]]}}"#
        )
    }

    fn inputs() -> PipelineInputs {
        let west = block_geom(-123.20, 49.20, -123.10, 49.30);
        let east = block_geom(-123.10, 49.20, -123.00, 49.30);

        PipelineInputs {
            buildings: Table::from_strs(
                "Buildings CSV",
                &["local_area", "address", "bsns_group", "units", "year_built", "value_land", "value_bldg"],
                &[
                    &["West End", "100 Pine St", "['Acme']", "4", "1960", "100", "300"],
                    &["West End", "100 Pine Street", "Acme", "10", "1970", "200", "500"],
                    &["West End", "100 Pine Street", "Other", "", "", "", ""],
                    &["", "12 Oak Ave", "Beta", "6", "1990", "", ""],
                    &["Kitsilano", "5 Nowhere Rd", "Gamma", "1", "", "", ""],
                ],
            ),
            addresses: Table::from_strs(
                "Addresses CSV",
                &["civic_number", "std_street", "geo_point_2d", "local_area"],
                &[
                    &["102", "Pine Street", "49.25, -123.15", "West End"],
                    &["12", "Oak Avenue", "49.26, -123.05", "Fairview"],
                    &["7", "Elm Street", "not a point", ""],
                ],
            ),
            blocks: Table::from_strs(
                "Blocks CSV",
                &["block_name", "geom"],
                &[&["west", west.as_str()], &["east", east.as_str()], &["bad", "{}"]],
            ),
            members: Table::from_strs(
                "Members CSV",
                &["full_address", "tag_list", "updated_at"],
                &[
                    &["100 Pine Street", "member, membership-2024", "2024-05-01T10:00:00Z"],
                    &["100 pine st", "member", ""],
                    &["100 Pine St", "membership-2019", "2024-05-20"],
                    &["12 Oak Ave", "membership-2019", ""],
                ],
            ),
        }
    }

    fn run() -> PipelineRun {
        run_pipeline(&inputs(), &PipelineConfig::default(), &PipelineContext::silent(now())).unwrap()
    }

    #[test]
    fn duplicate_spellings_collapse_to_one_point() {
        let run = run();
        let pine: Vec<&MapPoint> = run
            .result
            .points
            .iter()
            .filter(|p| p.addr_key == "100 pine st")
            .collect();
        assert_eq!(pine.len(), 1);
        let point = pine[0];
        assert_eq!(point.owner_group, "Acme");
        assert_eq!(point.owner_key, "acme");
        assert_eq!(point.units, Some(10.0));
        assert_eq!(point.year_built, Some(1965.0));
        assert_eq!(point.value_land, Some(150.0));
    }

    #[test]
    fn nearest_civic_number_supplies_coordinates() {
        let run = run();
        let point = run
            .result
            .points
            .iter()
            .find(|p| p.addr_key == "100 pine st")
            .unwrap();
        assert_eq!((point.lat, point.lon), (49.25, -123.15));
        assert_eq!(run.metadata.data_quality.address_match_nearest_civic, 3);
    }

    #[test]
    fn year_tag_without_member_tag_is_not_active() {
        let run = run();
        let oak = run.result.points.iter().find(|p| p.addr_key == "12 oak ave").unwrap();
        assert_eq!(oak.member_count, 0);
        assert_eq!(oak.member_count_all, 1);
        assert!(!oak.has_member);
        assert!(!oak.members_payload[0].has_member_tag);

        let pine = run.result.points.iter().find(|p| p.addr_key == "100 pine st").unwrap();
        assert_eq!(pine.member_count, 2);
        assert_eq!(pine.member_count_all, 3);
    }

    #[test]
    fn output_invariants_hold() {
        let run = run();
        let points = &run.result.points;

        for point in points {
            assert!(point.member_count <= point.member_count_all);
            assert!((0.0..=1.0).contains(&point.member_share_building));
            assert!(point.lat.is_finite() && point.lon.is_finite());
        }

        let keys: BTreeSet<&str> = points.iter().map(|p| p.addr_key.as_str()).collect();
        assert_eq!(keys.len(), points.len());
        assert_eq!(
            keys.len() as u64,
            run.metadata.data_quality.address_unique_matched
        );

        let ids: Vec<usize> = points.iter().map(|p| p.b_id).collect();
        assert_eq!(ids, (0..points.len()).collect::<Vec<_>>());
    }

    #[test]
    fn unmatched_street_is_dropped() {
        let run = run();
        assert!(run.result.points.iter().all(|p| p.addr_key != "5 nowhere rd"));
        assert_eq!(run.result.points.len(), 2);
        assert_eq!(run.metadata.data_quality.address_match_without_coordinates, 1);
    }

    #[test]
    fn area_reconciled_from_addresses() {
        let run = run();
        let oak = run.result.points.iter().find(|p| p.addr_key == "12 oak ave").unwrap();
        assert_eq!(oak.local_area, "Fairview");
        assert_eq!(run.metadata.data_quality.local_area_unknown, 1);
        assert_eq!(run.metadata.data_quality.local_area_unknown_after_enrichment, 0);
    }

    #[test]
    fn points_are_assigned_to_containing_blocks() {
        let run = run();
        let blocks = &run.result.blocks;
        assert_eq!(blocks.len(), 2);
        assert_eq!(run.metadata.data_quality.blocks_unparseable, 1);

        for point in &run.result.points {
            let id = point.block_id.expect("every point lies in a block");
            let block = blocks.iter().find(|b| b.block_id == id).unwrap();
            assert!(block.polygon.intersects(&Point::new(point.lon, point.lat)));
        }

        assert_eq!(blocks[0].stats.buildings, 1);
        assert_eq!(blocks[0].stats.member_buildings, 1);
        assert_eq!(blocks[1].stats.buildings, 1);
        assert_eq!(blocks[1].stats.total_members, 0);
    }

    #[test]
    fn configured_bbox_is_unioned_with_point_bounds() {
        let config = PipelineConfig {
            bbox: Some(BoundingBox {
                lon_min: -123.5,
                lat_min: 49.0,
                lon_max: -123.4,
                lat_max: 49.1,
            }),
            ..PipelineConfig::default()
        };
        let run = run_pipeline(&inputs(), &config, &PipelineContext::silent(now())).unwrap();
        let bbox = run.metadata.blocks_bbox.unwrap();
        assert!((bbox.lon_min - -123.5).abs() < 1e-12);
        assert!((bbox.lat_max - 49.261).abs() < 1e-9);
        assert_eq!(run.result.blocks.len(), 2);
    }

    #[test]
    fn filter_config_summarizes_dataset() {
        let run = run();
        let filters = &run.result.filter_config;
        assert_eq!(filters.dataset_totals.buildings, 2);
        assert_eq!(filters.dataset_totals.members, 2);
        assert_eq!(filters.dataset_totals.units, 16);
        assert_eq!(filters.dataset_totals.member_buildings, 1);
        assert_eq!(filters.membership_years[0].year, 2024);
        assert_eq!(filters.updated_year_min, Some(2019));
        assert!(filters.building_metric_order.contains(&"units".to_string()));
        let units = &filters.building_metrics["units"];
        assert_eq!(units.bins.iter().map(|b| b.count).sum::<u64>(), 2);
        assert_eq!(filters.blocks_total_units_max, 10);
        assert!(filters.bounds.is_some());
    }

    #[test]
    fn local_area_filter_restricts_buildings() {
        let config = PipelineConfig {
            local_areas: Some(vec!["kitsilano".to_string()]),
            ..PipelineConfig::default()
        };
        let run = run_pipeline(&inputs(), &config, &PipelineContext::silent(now())).unwrap();
        assert_eq!(run.metadata.data_quality.buildings_total, 1);
        assert!(run.result.points.is_empty());
        assert!(run.result.filter_config.bounds.is_none());
    }

    #[test]
    fn missing_required_column_aborts() {
        let mut inputs = inputs();
        inputs.addresses = Table::from_strs("Addresses CSV", &["civic_number", "std_street"], &[]);
        let err = run_pipeline(&inputs, &PipelineConfig::default(), &PipelineContext::silent(now()))
            .unwrap_err();
        assert!(err.to_string().contains("geo_point_2d"));
    }
}
