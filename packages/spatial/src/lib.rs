#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index for block attribution.
//!
//! Builds an R-tree over block polygons and provides point-in-polygon
//! lookups that treat the polygon boundary as inside. Also owns the
//! `GeoJSON` parsing used to load block geometries and write them back out.

pub mod bbox;
pub mod geometry;

use geo::{Intersects, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};

pub use bbox::{BoundingBox, BoundingBoxParseError};
pub use geometry::{
    compute_envelope, geometry_to_multipolygon, multipolygon_to_geometry,
    parse_geojson_to_multipolygon,
};

/// A block polygon stored in the R-tree with its id.
struct BlockEntry {
    block_id: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for BlockEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial index over block polygons.
///
/// Blocks may overlap; lookups resolve to the lowest block id among the
/// polygons containing the point.
pub struct BlockIndex {
    blocks: RTree<BlockEntry>,
}

impl BlockIndex {
    /// Builds the index from `(block_id, polygon)` pairs.
    #[must_use]
    pub fn new(blocks: impl IntoIterator<Item = (usize, MultiPolygon<f64>)>) -> Self {
        let entries: Vec<BlockEntry> = blocks
            .into_iter()
            .map(|(block_id, polygon)| BlockEntry {
                block_id,
                envelope: compute_envelope(&polygon),
                polygon,
            })
            .collect();

        log::debug!("Indexing {} block polygons", entries.len());

        Self {
            blocks: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.size()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.size() == 0
    }

    /// Look up the block containing a point (boundary inclusive).
    ///
    /// Candidates whose envelope contains the point are tested in block-id
    /// order; the first polygon containing or touching the point wins.
    #[must_use]
    pub fn locate(&self, lon: f64, lat: f64) -> Option<usize> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }

        let point = geo::Point::new(lon, lat);
        let query_env = AABB::from_point([lon, lat]);

        let mut candidates: Vec<&BlockEntry> = self
            .blocks
            .locate_in_envelope_intersecting(&query_env)
            .collect();
        candidates.sort_by_key(|entry| entry.block_id);

        candidates
            .into_iter()
            .find(|entry| entry.polygon.intersects(&point))
            .map(|entry| entry.block_id)
    }
}
