//! `GeoJSON` block geometry parsing and serialization.

use geo::{BoundingRect, MultiPolygon};
use geojson::GeoJson;
use rstar::AABB;

/// Parses a `GeoJSON` string into a [`MultiPolygon`].
///
/// Accepts a bare `Polygon`/`MultiPolygon` geometry or a `Feature` wrapping
/// one. Returns `None` for anything else (including non-polygonal
/// geometries), so callers can skip and count them.
#[must_use]
pub fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geojson: GeoJson = geojson_str.trim().parse().ok()?;
    let geometry = match geojson {
        GeoJson::Geometry(geom) => geom,
        GeoJson::Feature(feature) => feature.geometry?,
        GeoJson::FeatureCollection(_) => return None,
    };
    geometry_to_multipolygon(&geometry)
}

/// Converts a parsed `GeoJSON` geometry into a [`MultiPolygon`].
#[must_use]
pub fn geometry_to_multipolygon(geometry: &geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.clone().try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) if !mp.0.is_empty() => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Serializes a [`MultiPolygon`] back to a `GeoJSON` geometry.
///
/// Single-polygon blocks are written as `Polygon` so a re-parse yields the
/// same shape. Interior rings are preserved.
#[must_use]
pub fn multipolygon_to_geometry(mp: &MultiPolygon<f64>) -> geojson::Geometry {
    let value = match mp.0.as_slice() {
        [polygon] => geojson::Value::from(polygon),
        _ => geojson::Value::from(mp),
    };
    geojson::Geometry::new(value)
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
#[must_use]
pub fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str =
        r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#;

    #[test]
    fn parses_polygon() {
        let mp = parse_geojson_to_multipolygon(SQUARE).unwrap();
        assert_eq!(mp.0.len(), 1);
    }

    #[test]
    fn parses_feature_wrapper() {
        let feature = format!(r#"{{"type":"Feature","properties":{{}},"geometry":{SQUARE}}}"#);
        assert!(parse_geojson_to_multipolygon(&feature).is_some());
    }

    #[test]
    fn rejects_points_and_garbage() {
        assert!(parse_geojson_to_multipolygon(r#"{"type":"Point","coordinates":[0,0]}"#).is_none());
        assert!(parse_geojson_to_multipolygon("not json").is_none());
        assert!(parse_geojson_to_multipolygon("").is_none());
    }

    #[test]
    fn geometry_round_trips() {
        let with_hole = r#"{"type":"MultiPolygon","coordinates":[
            [[[0,0],[4,0],[4,4],[0,4],[0,0]],[[1,1],[2,1],[2,2],[1,2],[1,1]]],
            [[[10,10],[11,10],[11,11],[10,10]]]
        ]}"#;
        let mp = parse_geojson_to_multipolygon(with_hole).unwrap();
        let geometry = multipolygon_to_geometry(&mp);
        let back = geometry_to_multipolygon(&geometry).unwrap();
        assert_eq!(back, mp);
        assert_eq!(back.0[0].interiors().len(), 1);
    }

    #[test]
    fn single_polygon_serializes_as_polygon() {
        let mp = parse_geojson_to_multipolygon(SQUARE).unwrap();
        let geometry = multipolygon_to_geometry(&mp);
        assert!(matches!(geometry.value, geojson::Value::Polygon(_)));
    }

    #[test]
    fn computes_envelope() {
        let mp = parse_geojson_to_multipolygon(SQUARE).unwrap();
        let env = compute_envelope(&mp);
        assert_eq!(env.lower(), [0.0, 0.0]);
        assert_eq!(env.upper(), [1.0, 1.0]);
    }
}
