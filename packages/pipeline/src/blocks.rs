//! Block parsing, point assignment, and per-block aggregation.

use std::collections::BTreeMap;

use building_map_pipeline_models::{BlockRecord, BlockStats, MapPoint};
use building_map_spatial::{
    BlockIndex, BoundingBox, geometry_to_multipolygon, multipolygon_to_geometry,
    parse_geojson_to_multipolygon,
};
use building_map_table::Table;
use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};

use crate::PipelineError;
use crate::stats::median;

/// Column holding each block's `GeoJSON` geometry.
pub const GEOMETRY_COLUMN: &str = "geom";

/// A neighborhood block.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Sequential id in parse order.
    pub block_id: usize,
    /// Block outline.
    pub polygon: MultiPolygon<f64>,
    /// Non-geometry source columns.
    pub attributes: BTreeMap<String, String>,
    /// Aggregates over assigned map points.
    pub stats: BlockStats,
}

impl Block {
    /// Serializable form with a `GeoJSON` geometry.
    #[must_use]
    pub fn to_record(&self) -> BlockRecord {
        BlockRecord {
            block_id: self.block_id,
            geom_geojson: multipolygon_to_geometry(&self.polygon),
            attributes: self.attributes.clone(),
            stats: self.stats.clone(),
        }
    }

    /// Rebuilds a block from its serialized form.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidCachedGeometry`] if the geometry is
    /// not a polygon or multipolygon.
    pub fn from_record(record: BlockRecord) -> Result<Self, PipelineError> {
        let polygon = geometry_to_multipolygon(&record.geom_geojson).ok_or(
            PipelineError::InvalidCachedGeometry {
                block_id: record.block_id,
            },
        )?;

        Ok(Self {
            block_id: record.block_id,
            polygon,
            attributes: record.attributes,
            stats: record.stats,
        })
    }
}

/// Blocks parsed from the source table.
#[derive(Debug, Clone, Default)]
pub struct ParsedBlocks {
    /// Retained blocks, ids assigned in order.
    pub blocks: Vec<Block>,
    /// Rows whose geometry could not be parsed.
    pub unparseable: u64,
    /// Rows dropped by the bounding box.
    pub outside_bbox: u64,
}

/// Parses block geometries, keeping those whose bounds intersect `bbox`.
///
/// Unparseable geometries are skipped and counted.
///
/// # Errors
///
/// Returns [`PipelineError::Table`] if the geometry column is missing.
pub fn parse_blocks(table: &Table, bbox: Option<&BoundingBox>) -> Result<ParsedBlocks, PipelineError> {
    table.require_columns(&[GEOMETRY_COLUMN])?;
    let geom_col = table.column_index(GEOMETRY_COLUMN);

    let mut parsed = ParsedBlocks::default();
    for row in table.rows() {
        let Some(polygon) = row.at(geom_col).and_then(parse_geojson_to_multipolygon) else {
            parsed.unparseable += 1;
            continue;
        };
        if let Some(bbox) = bbox
            && !bbox.intersects(&polygon)
        {
            parsed.outside_bbox += 1;
            continue;
        }

        let attributes = table
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| name.as_str() != GEOMETRY_COLUMN)
            .filter_map(|(index, name)| {
                row.at(Some(index))
                    .map(|value| (name.clone(), value.to_string()))
            })
            .collect();

        parsed.blocks.push(Block {
            block_id: parsed.blocks.len(),
            polygon,
            attributes,
            stats: BlockStats::default(),
        });
    }

    if parsed.unparseable > 0 {
        log::warn!(
            "Skipped {} of {} block rows with unparseable geometry",
            parsed.unparseable,
            table.len()
        );
    }
    log::info!(
        "Parsed {} blocks ({} outside the bounding box)",
        parsed.blocks.len(),
        parsed.outside_bbox
    );

    Ok(parsed)
}

/// Assigns each point the id of the block containing it (boundary
/// inclusive), or `None`.
#[must_use]
pub fn assign_blocks(points: Vec<MapPoint>, blocks: &[Block]) -> Vec<MapPoint> {
    let index = BlockIndex::new(blocks.iter().map(|b| (b.block_id, b.polygon.clone())));

    let points: Vec<MapPoint> = points
        .into_iter()
        .map(|point| MapPoint {
            block_id: index.locate(point.lon, point.lat),
            ..point
        })
        .collect();

    let assigned = points.iter().filter(|p| p.block_id.is_some()).count();
    log::info!("Assigned {assigned} of {} map points to blocks", points.len());
    points
}

/// Recomputes every block's statistics from the points assigned to it.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn aggregate_blocks(blocks: Vec<Block>, points: &[MapPoint]) -> Vec<Block> {
    let mut members: BTreeMap<usize, Vec<&MapPoint>> = BTreeMap::new();
    for point in points {
        if let Some(block_id) = point.block_id {
            members.entry(block_id).or_default().push(point);
        }
    }

    blocks
        .into_iter()
        .map(|block| {
            let assigned = members.get(&block.block_id).map_or(&[][..], Vec::as_slice);
            let buildings = assigned.len() as u32;
            let member_buildings = assigned.iter().filter(|p| p.member_count > 0).count() as u32;

            let stats = BlockStats {
                buildings,
                total_units: assigned.iter().filter_map(|p| p.units).sum(),
                median_year_built: median(assigned.iter().filter_map(|p| p.year_built)),
                member_buildings,
                total_members: assigned.iter().map(|p| p.member_count).sum(),
                member_share: if buildings > 0 {
                    f64::from(member_buildings) / f64::from(buildings)
                } else {
                    0.0
                },
            };

            Block { stats, ..block }
        })
        .collect()
}

/// The blocks as a `GeoJSON` feature collection with their statistics as
/// properties.
#[must_use]
pub fn blocks_feature_collection(blocks: &[Block]) -> FeatureCollection {
    let features = blocks
        .iter()
        .map(|block| {
            let mut properties = JsonObject::new();
            properties.insert("block_id".to_string(), JsonValue::from(block.block_id));
            for (name, value) in &block.attributes {
                properties.insert(name.clone(), JsonValue::from(value.as_str()));
            }
            if let Ok(JsonValue::Object(stats)) = serde_json::to_value(&block.stats) {
                properties.extend(stats);
            }

            Feature {
                bbox: None,
                geometry: Some(multipolygon_to_geometry(&block.polygon)),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
