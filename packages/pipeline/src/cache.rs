//! On-disk cache of a pipeline result.
//!
//! The cache is three pretty-printed JSON files in one directory. It is
//! either complete or treated as absent; there is no partial invalidation.

use std::path::Path;

use building_map_pipeline_models::{BlockRecord, FilterConfig, MapPoint};

use crate::blocks::Block;
use crate::{PipelineError, PipelineResult};

/// Map points file.
pub const POINTS_FILE: &str = "building_points.json";
/// Blocks file, geometries as `GeoJSON`.
pub const BLOCKS_FILE: &str = "blocks.json";
/// Filter configuration file.
pub const FILTERS_FILE: &str = "filter_config.json";

const CACHE_FILES: [&str; 3] = [POINTS_FILE, BLOCKS_FILE, FILTERS_FILE];

/// Whether every cache file exists in `dir`.
#[must_use]
pub fn cache_exists(dir: &Path) -> bool {
    CACHE_FILES.iter().all(|name| dir.join(name).is_file())
}

/// Writes `result` to `dir`, creating the directory if needed.
///
/// # Errors
///
/// Returns [`PipelineError`] if the directory or a file cannot be written.
pub fn write_cache(result: &PipelineResult, dir: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(dir)?;

    let blocks: Vec<BlockRecord> = result.blocks.iter().map(Block::to_record).collect();
    std::fs::write(dir.join(POINTS_FILE), serde_json::to_string_pretty(&result.points)?)?;
    std::fs::write(dir.join(BLOCKS_FILE), serde_json::to_string_pretty(&blocks)?)?;
    std::fs::write(
        dir.join(FILTERS_FILE),
        serde_json::to_string_pretty(&result.filter_config)?,
    )?;

    log::info!(
        "Cached {} map points and {} blocks in {}",
        result.points.len(),
        result.blocks.len(),
        dir.display()
    );
    Ok(())
}

/// Loads a cached result from `dir`, re-parsing block geometries.
///
/// # Errors
///
/// Returns [`PipelineError::IncompleteCache`] if a cache file is missing,
/// or a JSON/geometry error if a file is unreadable.
pub fn load_cache(dir: &Path) -> Result<PipelineResult, PipelineError> {
    let missing: Vec<String> = CACHE_FILES
        .iter()
        .filter(|name| !dir.join(name).is_file())
        .map(|name| (*name).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::IncompleteCache {
            dir: dir.display().to_string(),
            missing,
        });
    }

    let points: Vec<MapPoint> =
        serde_json::from_str(&std::fs::read_to_string(dir.join(POINTS_FILE))?)?;
    let records: Vec<BlockRecord> =
        serde_json::from_str(&std::fs::read_to_string(dir.join(BLOCKS_FILE))?)?;
    let filter_config: FilterConfig =
        serde_json::from_str(&std::fs::read_to_string(dir.join(FILTERS_FILE))?)?;

    let blocks = records
        .into_iter()
        .map(Block::from_record)
        .collect::<Result<Vec<_>, _>>()?;

    log::info!(
        "Loaded {} map points and {} blocks from {}",
        points.len(),
        blocks.len(),
        dir.display()
    );

    Ok(PipelineResult {
        points,
        blocks,
        filter_config,
    })
}
