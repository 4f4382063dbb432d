//! Stage runner: produces or reuses the cached pipeline result.

use std::path::Path;

use building_map_cli_utils::{IndicatifProgress, MultiProgress};
use building_map_pipeline::blocks::blocks_feature_collection;
use building_map_pipeline::cache::{cache_exists, load_cache, write_cache};
use building_map_pipeline::{
    PIPELINE_STEPS, PipelineContext, PipelineError, PipelineInputs, PipelineResult, run_pipeline,
};
use chrono::Utc;

use crate::config::{Settings, Stage};
use crate::summary;

/// Blocks exported as a standalone `GeoJSON` layer next to the cache.
pub const BLOCKS_GEOJSON_FILE: &str = "blocks.geojson";

/// Runs the selected stage.
///
/// # Errors
///
/// Returns an error if the inputs cannot be loaded, the pipeline fails, or
/// the cache cannot be read or written.
pub fn run(settings: &Settings, multi: &MultiProgress) -> Result<(), PipelineError> {
    match settings.stage {
        Stage::Data => {
            let result = prepare_data(settings, multi)?;
            log::info!(
                "Data ready: {} map points, {} blocks",
                result.points.len(),
                result.blocks.len()
            );
        }
        Stage::Summary => {
            let result = load_cache(&settings.data_dir)?;
            summary::print_summary(&result);
        }
    }
    Ok(())
}

/// Returns the cached result when available, otherwise runs the pipeline
/// and refreshes the cache.
fn prepare_data(settings: &Settings, multi: &MultiProgress) -> Result<PipelineResult, PipelineError> {
    if !settings.force && cache_exists(&settings.data_dir) {
        log::info!(
            "Using cached data from {} (pass --force to rebuild)",
            settings.data_dir.display()
        );
        return load_cache(&settings.data_dir);
    }

    let start = std::time::Instant::now();
    let inputs = PipelineInputs::load(&settings.paths)?;

    let progress = IndicatifProgress::steps_bar(multi, "Preparing data", PIPELINE_STEPS);
    let ctx = PipelineContext::new(progress, Utc::now());
    let run = run_pipeline(&inputs, &settings.pipeline, &ctx)?;

    let quality = &run.metadata.data_quality;
    log::info!(
        "Matched {} of {} buildings with coordinates ({} via nearest civic number)",
        quality.address_match_with_coordinates,
        quality.buildings_total,
        quality.address_match_nearest_civic
    );

    write_cache(&run.result, &settings.data_dir)?;
    write_blocks_geojson(&run.result, &settings.data_dir)?;

    log::info!("Pipeline complete in {:.1}s", start.elapsed().as_secs_f64());
    Ok(run.result)
}

fn write_blocks_geojson(result: &PipelineResult, dir: &Path) -> Result<(), PipelineError> {
    let collection = blocks_feature_collection(&result.blocks);
    let path = dir.join(BLOCKS_GEOJSON_FILE);
    std::fs::write(&path, serde_json::to_string(&collection)?)?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use building_map_pipeline::{InputPaths, PipelineConfig};

    use super::*;

    const BUILDINGS: &str = "\
address,local_area,bsns_group,units,year_built,n_issues,value_land,value_bldg,bldg_land_ratio
100 Pine St,West End,Acme Holdings,12,1960,1,1000000,500000,
";
    const ADDRESSES: &str = "\
civic_number,std_street,geo_point_2d
100,Pine St,\"49.2800, -123.1300\"
";
    const BLOCKS: &str = "\
geom,name
\"{\"\"type\"\":\"\"Polygon\"\",\"\"coordinates\"\":[[[-123.14,49.27],[-123.12,49.27],[-123.12,49.29],[-123.14,49.29],[-123.14,49.27]]]}\",Block A
";
    const MEMBERS: &str = "\
address,tag_list,updated_at
100 Pine St,\"member, membership-2030\",2030-01-01
";

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn settings(dir: &Path, stage: Stage) -> Settings {
        Settings {
            paths: InputPaths {
                buildings: write(dir, "buildings.csv", BUILDINGS),
                addresses: write(dir, "addresses.csv", ADDRESSES),
                blocks: write(dir, "blocks.csv", BLOCKS),
                members: write(dir, "members.csv", MEMBERS),
            },
            pipeline: PipelineConfig::default(),
            data_dir: dir.join("cache"),
            stage,
            force: false,
            verbose: false,
        }
    }

    #[test]
    fn data_stage_writes_and_reuses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let multi = MultiProgress::new();
        let settings = settings(dir.path(), Stage::Data);

        let first = prepare_data(&settings, &multi).unwrap();
        assert_eq!(first.points.len(), 1);
        assert_eq!(first.points[0].block_id, Some(0));
        assert!(cache_exists(&settings.data_dir));
        assert!(settings.data_dir.join(BLOCKS_GEOJSON_FILE).is_file());

        std::fs::remove_file(&settings.paths.buildings).unwrap();
        let cached = prepare_data(&settings, &multi).unwrap();
        assert_eq!(cached, first);
    }

    #[test]
    fn force_reruns_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let multi = MultiProgress::new();
        let mut settings = settings(dir.path(), Stage::Data);
        prepare_data(&settings, &multi).unwrap();

        settings.force = true;
        std::fs::remove_file(&settings.paths.buildings).unwrap();
        assert!(prepare_data(&settings, &multi).is_err());
    }

    #[test]
    fn summary_stage_requires_cache() {
        let dir = tempfile::tempdir().unwrap();
        let multi = MultiProgress::new();
        let settings = settings(dir.path(), Stage::Summary);
        assert!(matches!(
            run(&settings, &multi),
            Err(PipelineError::IncompleteCache { .. })
        ));
    }
}
