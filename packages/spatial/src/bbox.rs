//! Longitude/latitude bounding boxes.

use std::str::FromStr;

use geo::{BoundingRect, MultiPolygon};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error parsing a `lon_min,lat_min,lon_max,lat_max` string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid bounding box '{input}': expected lon_min,lat_min,lon_max,lat_max")]
pub struct BoundingBoxParseError {
    /// The rejected input.
    pub input: String,
}

/// An axis-aligned box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western edge.
    pub lon_min: f64,
    /// Southern edge.
    pub lat_min: f64,
    /// Eastern edge.
    pub lon_max: f64,
    /// Northern edge.
    pub lat_max: f64,
}

impl BoundingBox {
    /// Smallest box containing both boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            lon_min: self.lon_min.min(other.lon_min),
            lat_min: self.lat_min.min(other.lat_min),
            lon_max: self.lon_max.max(other.lon_max),
            lat_max: self.lat_max.max(other.lat_max),
        }
    }

    /// Grows the box by `buffer` degrees on every side.
    #[must_use]
    pub fn expand(&self, buffer: f64) -> Self {
        Self {
            lon_min: self.lon_min - buffer,
            lat_min: self.lat_min - buffer,
            lon_max: self.lon_max + buffer,
            lat_max: self.lat_max + buffer,
        }
    }

    /// Whether the polygon's bounding rectangle overlaps this box
    /// (edges touching counts as overlap).
    #[must_use]
    pub fn intersects(&self, mp: &MultiPolygon<f64>) -> bool {
        let Some(rect) = mp.bounding_rect() else {
            return false;
        };
        !(rect.max().x < self.lon_min
            || rect.min().x > self.lon_max
            || rect.max().y < self.lat_min
            || rect.min().y > self.lat_max)
    }
}

impl FromStr for BoundingBox {
    type Err = BoundingBoxParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || BoundingBoxParseError {
            input: s.to_string(),
        };
        let values: Vec<f64> = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| err())?;

        let [lon_min, lat_min, lon_max, lat_max] = values[..] else {
            return Err(err());
        };

        Ok(Self {
            lon_min,
            lat_min,
            lon_max,
            lat_max,
        })
    }
}
