//! Command-line settings merged with an optional config file.
//!
//! A TOML or JSON file supplies defaults for any option. Keys may sit at
//! the top level or inside `[paths]` / `[options]` tables; `[options]` wins
//! over `[paths]`, which wins over the top level. Anything given on the
//! command line wins over the file.

use std::path::{Path, PathBuf};

use building_map_pipeline::metrics::default_metric_specs;
use building_map_pipeline::{InputPaths, PipelineConfig};
use building_map_pipeline_models::{MetricFormat, MetricSpec};
use building_map_spatial::{BoundingBox, BoundingBoxParseError};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use thiserror::Error;

/// Default cache directory.
pub const DEFAULT_DATA_DIR: &str = ".preprocessed";

/// Errors resolving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Config path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// TOML syntax or schema error.
    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or schema error.
    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// The config file extension is neither TOML nor JSON.
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// Input paths missing from both the command line and the config.
    #[error("Missing required paths (supply via CLI or config): {}", .0.join(", "))]
    MissingPaths(Vec<String>),

    /// The bounding box string is malformed.
    #[error(transparent)]
    Bbox(#[from] BoundingBoxParseError),

    /// A `--metric` entry names an unknown display format.
    #[error("Invalid metric format in '{entry}': {source}")]
    MetricFormat {
        /// The rejected `COLUMN:FORMAT` entry.
        entry: String,
        /// Underlying error.
        source: strum::ParseError,
    },
}

/// Which part of the toolchain to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Run the pipeline (or reuse the cache) and write the cache.
    #[default]
    Data,
    /// Print dataset and owner summaries from the cache.
    Summary,
}

/// Command-line arguments.
#[derive(Debug, Default, Parser)]
#[command(name = "building_map", about = "Building membership map data pipeline")]
pub struct Cli {
    /// Optional TOML/JSON config file with argument defaults
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Buildings CSV
    #[arg(long)]
    pub buildings: Option<PathBuf>,
    /// Civic addresses CSV (`civic_number`, `std_street`, `geo_point_2d`)
    #[arg(long)]
    pub addresses: Option<PathBuf>,
    /// Block outlines CSV (with a `geom` `GeoJSON` column)
    #[arg(long)]
    pub blocks: Option<PathBuf>,
    /// Membership export CSV (with an address column)
    #[arg(long)]
    pub members: Option<PathBuf>,
    /// Area of interest as `lon_min,lat_min,lon_max,lat_max`
    #[arg(long)]
    pub bbox: Option<String>,
    /// Local area to include (repeat for multiple)
    #[arg(long = "local-area")]
    pub local_area: Vec<String>,
    /// Attribute to summarize as `COLUMN[:FORMAT]` (repeat for multiple;
    /// replaces the configured metric list)
    #[arg(long = "metric")]
    pub metric: Vec<String>,
    /// Directory to read/write preprocessed data (default: .preprocessed)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Which stage to run
    #[arg(long, value_enum)]
    pub stage: Option<Stage>,
    /// Rerun the pipeline even if a cache exists
    #[arg(long)]
    pub force: bool,
    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum BboxValue {
    Text(String),
    Values([f64; 4]),
}

impl BboxValue {
    fn resolve(self) -> Result<BoundingBox, BoundingBoxParseError> {
        match self {
            Self::Text(text) => text.parse(),
            Self::Values([lon_min, lat_min, lon_max, lat_max]) => Ok(BoundingBox {
                lon_min,
                lat_min,
                lon_max,
                lat_max,
            }),
        }
    }
}

/// One layer of config values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct ConfigValues {
    buildings: Option<PathBuf>,
    addresses: Option<PathBuf>,
    blocks: Option<PathBuf>,
    #[serde(alias = "vtu")]
    members: Option<PathBuf>,
    bbox: Option<BboxValue>,
    local_area: Option<OneOrMany>,
    data_dir: Option<PathBuf>,
    stage: Option<Stage>,
    force: Option<bool>,
    verbose: Option<bool>,
}

impl ConfigValues {
    /// Fills unset values from `fallback`.
    fn or(self, fallback: Self) -> Self {
        Self {
            buildings: self.buildings.or(fallback.buildings),
            addresses: self.addresses.or(fallback.addresses),
            blocks: self.blocks.or(fallback.blocks),
            members: self.members.or(fallback.members),
            bbox: self.bbox.or(fallback.bbox),
            local_area: self.local_area.or(fallback.local_area),
            data_dir: self.data_dir.or(fallback.data_dir),
            stage: self.stage.or(fallback.stage),
            force: self.force.or(fallback.force),
            verbose: self.verbose.or(fallback.verbose),
        }
    }
}

/// Contents of a config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileConfig {
    #[serde(flatten)]
    top: ConfigValues,
    #[serde(default)]
    paths: ConfigValues,
    #[serde(default)]
    options: ConfigValues,
    /// Metric overrides; replace the defaults entirely when present.
    #[serde(default)]
    metrics: Option<Vec<MetricSpec>>,
}

impl FileConfig {
    /// Parses a config from text, choosing the format by file extension.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the format is unsupported or the text
    /// does not parse.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match extension.as_deref() {
            Some("toml" | "tml") => Ok(toml::from_str(text)?),
            Some("json") => Ok(serde_json::from_str(text)?),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn values(self) -> (ConfigValues, Option<Vec<MetricSpec>>) {
        (self.options.or(self.paths).or(self.top), self.metrics)
    }
}

/// Fully resolved run settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Source CSVs.
    pub paths: InputPaths,
    /// Pipeline options.
    pub pipeline: PipelineConfig,
    /// Cache directory.
    pub data_dir: PathBuf,
    /// Stage to run.
    pub stage: Stage,
    /// Ignore an existing cache.
    pub force: bool,
    /// Debug logging.
    pub verbose: bool,
}

impl Settings {
    /// Merges command-line arguments over `file`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingPaths`] if any input path is unset,
    /// [`ConfigError::Bbox`] if the bounding box does not parse, or
    /// [`ConfigError::MetricFormat`] if a `--metric` format is unknown.
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let (values, metrics) = file.values();

        let buildings = cli.buildings.or(values.buildings);
        let addresses = cli.addresses.or(values.addresses);
        let blocks = cli.blocks.or(values.blocks);
        let members = cli.members.or(values.members);
        let (Some(buildings), Some(addresses), Some(blocks), Some(members)) =
            (buildings.clone(), addresses.clone(), blocks.clone(), members.clone())
        else {
            let missing = [
                ("buildings", buildings.is_none()),
                ("addresses", addresses.is_none()),
                ("blocks", blocks.is_none()),
                ("members", members.is_none()),
            ]
            .into_iter()
            .filter(|(_, missing)| *missing)
            .map(|(name, _)| name.to_string())
            .collect();
            return Err(ConfigError::MissingPaths(missing));
        };

        let bbox = match cli.bbox {
            Some(text) => Some(text.parse()?),
            None => values.bbox.map(BboxValue::resolve).transpose()?,
        };

        let local_areas = if cli.local_area.is_empty() {
            values.local_area.map(OneOrMany::into_vec)
        } else {
            Some(cli.local_area)
        };

        let metrics = metrics.unwrap_or_else(default_metric_specs);
        let metrics = if cli.metric.is_empty() {
            metrics
        } else {
            select_metrics(&cli.metric, &metrics)?
        };

        Ok(Self {
            paths: InputPaths {
                buildings,
                addresses,
                blocks,
                members,
            },
            pipeline: PipelineConfig {
                bbox,
                local_areas,
                metrics,
            },
            data_dir: cli
                .data_dir
                .or(values.data_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            stage: cli.stage.or(values.stage).unwrap_or_default(),
            force: cli.force || values.force.unwrap_or(false),
            verbose: cli.verbose || values.verbose.unwrap_or(false),
        })
    }
}

/// Builds the metric list from `COLUMN[:FORMAT]` entries. Columns already
/// in `known` keep their settings; others start from bare defaults.
fn select_metrics(
    entries: &[String],
    known: &[MetricSpec],
) -> Result<Vec<MetricSpec>, ConfigError> {
    entries
        .iter()
        .map(|entry| {
            let (column, format) = match entry.split_once(':') {
                Some((column, format)) => (column.trim(), Some(format.trim())),
                None => (entry.trim(), None),
            };
            let mut spec = known
                .iter()
                .find(|spec| spec.column == column)
                .cloned()
                .unwrap_or_else(|| MetricSpec::new(column, column));
            if let Some(format) = format {
                spec.format = format
                    .parse::<MetricFormat>()
                    .map_err(|source| ConfigError::MetricFormat {
                        entry: entry.clone(),
                        source,
                    })?;
            }
            Ok(spec)
        })
        .collect()
}
