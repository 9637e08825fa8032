//! Boundary simplification

use crate::error::{AnalogueError, Result};
use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{Intersects, Line, LineString, MultiPolygon, Polygon, Simplify};
use geojson::{Feature, FeatureCollection, Geometry};

/// Geometry kinds accepted as a city boundary
pub fn is_polygonal(geometry: &Geometry) -> bool {
    matches!(
        geometry.value,
        geojson::Value::Polygon(_) | geojson::Value::MultiPolygon(_)
    )
}

pub fn kind_name(geometry: &Geometry) -> &'static str {
    match geometry.value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Halvings of the tolerance tried before giving up on simplifying a shape
const MAX_REFINEMENTS: usize = 4;

/// Simplify a Polygon/MultiPolygon so that no vertex moves further than `tolerance`.
///
/// Douglas-Peucker with `tolerance` as the distance bound. When the result
/// crosses itself the tolerance is halved and the shape retried; after
/// [`MAX_REFINEMENTS`] attempts the shape is kept as received.
/// Returns `Ok(None)` when nothing of the shape survives.
pub fn simplify_boundary(geometry: &Geometry, tolerance: f64) -> Result<Option<FeatureCollection>> {
    let shape: geo::Geometry<f64> = geo::Geometry::try_from(geometry.clone())?;

    let simplified = match shape {
        geo::Geometry::Polygon(poly) => {
            match simplify_polygons(vec![poly], tolerance).into_iter().next() {
                Some(poly) => geojson::Value::from(&poly),
                None => return Ok(None),
            }
        }
        geo::Geometry::MultiPolygon(multi) => {
            let kept = simplify_polygons(multi.0, tolerance);
            if kept.is_empty() {
                return Ok(None);
            }
            geojson::Value::from(&MultiPolygon::new(kept))
        }
        _ => {
            return Err(AnalogueError::Geometry {
                message: format!("expected Polygon or MultiPolygon, got {}", kind_name(geometry)),
            });
        }
    };

    Ok(Some(single_feature(Geometry::new(simplified))))
}

fn simplify_polygons(polygons: Vec<Polygon<f64>>, tolerance: f64) -> Vec<Polygon<f64>> {
    let mut epsilon = tolerance;
    for _ in 0..MAX_REFINEMENTS {
        let candidate: Vec<Polygon<f64>> = polygons
            .iter()
            .filter_map(|poly| simplify_polygon(poly, epsilon))
            .collect();
        if is_simple(&candidate) {
            return candidate;
        }
        tracing::debug!(
            "Simplified boundary self-intersects at {}, retrying at {}",
            epsilon,
            epsilon / 2.0
        );
        epsilon /= 2.0;
    }
    tracing::warn!("Could not simplify boundary without self-intersection; keeping it as is");
    polygons
}

/// `None` when the exterior collapses; collapsed holes are dropped
fn simplify_polygon(poly: &Polygon<f64>, epsilon: f64) -> Option<Polygon<f64>> {
    let exterior = poly.exterior().simplify(&epsilon);
    if exterior.0.len() < 4 {
        return None;
    }
    let interiors = poly
        .interiors()
        .iter()
        .map(|ring| ring.simplify(&epsilon))
        .filter(|ring| ring.0.len() >= 4)
        .collect();
    Some(Polygon::new(exterior, interiors))
}

/// No ring crosses itself and no two rings meet
fn is_simple(polygons: &[Polygon<f64>]) -> bool {
    let rings: Vec<&LineString<f64>> = polygons
        .iter()
        .flat_map(|poly| std::iter::once(poly.exterior()).chain(poly.interiors()))
        .collect();

    rings.iter().all(|ring| ring_is_simple(ring))
        && rings
            .iter()
            .enumerate()
            .all(|(i, a)| rings[i + 1..].iter().all(|b| !a.intersects(*b)))
}

fn ring_is_simple(ring: &LineString<f64>) -> bool {
    let segments: Vec<Line<f64>> = ring.lines().collect();
    let n = segments.len();
    for i in 0..n {
        for j in i + 1..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segments[i], segments[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => return false,
            }
        }
    }
    true
}

fn single_feature(geometry: Geometry) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: vec![Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }],
        foreign_members: None,
    }
}
