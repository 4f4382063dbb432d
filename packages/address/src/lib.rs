#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Address normalization for the building map pipeline.
//!
//! Buildings, civic addresses, and membership exports come from independent
//! sources that spell the same address differently. Everything here is pure
//! and deterministic so the derived keys can be used to join the three
//! tables.

pub mod coords;
pub mod normalize;
pub mod owner;

pub use coords::{parse_lat_lon, parse_number};
pub use normalize::{address_key, format_civic_number, normalize_street, split_address_key};
pub use owner::{clean_owner_label, sanitize_owner};

/// Sentinel label for missing area and owner values.
pub const UNKNOWN: &str = "(Unknown)";
