#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the building map toolchain.
//!
//! The `data` stage reconciles the source tables into map points, blocks,
//! and filter metadata and caches them under the data directory. The
//! `summary` stage prints dataset and owner-group summaries from that
//! cache.
//!
//! Uses `indicatif-log-bridge` (via [`building_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod config;
mod pipeline;
mod summary;

use clap::Parser;

use crate::config::{Cli, FileConfig, Settings};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(cli, file)?;

    let multi = building_map_cli_utils::init_logger(settings.verbose);

    pipeline::run(&settings, &multi)?;

    Ok(())
}
