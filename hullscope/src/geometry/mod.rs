//! Geometry values exchanged with the geometry engine.
//!
//! The analysis never interprets geometry itself. Feature geometries arrive
//! from a layer query, are filtered against the visible [`Extent`], and are
//! then handed to a [`GeometryEngine`] which produces new polygons. Every
//! polygon carries an opaque [`EngineHandle`] assigned by the engine that
//! produced it; the pipeline passes handles through untouched.
//!
//! # Coordinate convention
//!
//! All coordinates are WGS84 degrees expressed as [`LatLng`]. Adapters that
//! talk to x/y based libraries (see [`GeoEngine`]) do the axis swap at their
//! boundary.

mod engine;
mod geo_engine;
mod timed;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use engine::{AreaUnit, BoxFuture, GeometryEngine, GeometryOp, GeometryOpError, LengthUnit};
pub use geo_engine::{
    GeoEngine, DEFAULT_CIRCLE_SEGMENTS, MAX_CIRCLE_SEGMENTS, MIN_CIRCLE_SEGMENTS,
};
pub use timed::TimedEngine;

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees, positive north.
    pub lat: f64,
    /// Longitude in degrees, positive east.
    pub lng: f64,
}

impl LatLng {
    /// Create a new position.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lat_hem = if self.lat >= 0.0 { 'N' } else { 'S' };
        let lng_hem = if self.lng >= 0.0 { 'E' } else { 'W' };
        write!(
            f,
            "{:.4}°{} {:.4}°{}",
            self.lat.abs(),
            lat_hem,
            self.lng.abs(),
            lng_hem
        )
    }
}

/// Axis-aligned visible extent of the render surface.
///
/// Containment is inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    /// Southernmost latitude.
    pub min_lat: f64,
    /// Northernmost latitude.
    pub max_lat: f64,
    /// Westernmost longitude.
    pub min_lng: f64,
    /// Easternmost longitude.
    pub max_lng: f64,
}

impl Extent {
    /// Create a new extent.
    pub fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    /// Extent covering the whole globe.
    pub fn world() -> Self {
        Self::new(-90.0, 90.0, -180.0, 180.0)
    }

    /// Whether a position lies inside the extent.
    pub fn contains_point(&self, point: &LatLng) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lng >= self.min_lng
            && point.lng <= self.max_lng
    }

    /// Whether a geometry lies entirely inside the extent.
    ///
    /// Polygons are contained when every vertex of every exterior ring is.
    pub fn contains(&self, geometry: &Geometry) -> bool {
        match geometry {
            Geometry::Point(point) => self.contains_point(point),
            Geometry::Polygon(polygon) => {
                !polygon.parts().is_empty()
                    && polygon
                        .parts()
                        .iter()
                        .flat_map(|part| part.exterior.iter())
                        .all(|vertex| self.contains_point(vertex))
            }
        }
    }

    /// Center of the extent.
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// Opaque identifier for a polygon produced by a geometry engine.
///
/// Engines use it to trace their own outputs; nothing else reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EngineHandle(pub u64);

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One connected piece of a polygon: an exterior ring and its holes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolygonPart {
    /// Outer boundary.
    pub exterior: Vec<LatLng>,
    /// Holes cut out of the exterior.
    pub interiors: Vec<Vec<LatLng>>,
}

impl PolygonPart {
    /// Create a part without holes.
    pub fn new(exterior: Vec<LatLng>) -> Self {
        Self {
            exterior,
            interiors: Vec::new(),
        }
    }
}

/// An immutable, possibly multi-part polygon.
///
/// Cloning is cheap; parts are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    handle: EngineHandle,
    parts: Arc<[PolygonPart]>,
}

impl Polygon {
    /// Create a polygon tagged with an engine handle.
    pub fn new(handle: EngineHandle, parts: Vec<PolygonPart>) -> Self {
        Self {
            handle,
            parts: parts.into(),
        }
    }

    /// A polygon carrying only a handle, for engines that keep geometry
    /// on their side.
    pub fn opaque(handle: EngineHandle) -> Self {
        Self::new(handle, Vec::new())
    }

    /// The engine handle this polygon was tagged with.
    pub fn handle(&self) -> EngineHandle {
        self.handle
    }

    /// Polygon parts.
    pub fn parts(&self) -> &[PolygonPart] {
        &self.parts
    }

    /// Total number of exterior vertices across all parts.
    pub fn vertex_count(&self) -> usize {
        self.parts.iter().map(|part| part.exterior.len()).sum()
    }
}

/// The closed set of geometries the analysis handles.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// A single position (feature locations).
    Point(LatLng),
    /// An area (engine outputs, polygon features).
    Polygon(Polygon),
}

impl Geometry {
    /// Shorthand for a point geometry.
    pub fn point(lat: f64, lng: f64) -> Self {
        Geometry::Point(LatLng::new(lat, lng))
    }

    /// The polygon, if this geometry is one.
    pub fn as_polygon(&self) -> Option<&Polygon> {
        match self {
            Geometry::Polygon(polygon) => Some(polygon),
            Geometry::Point(_) => None,
        }
    }
}

impl From<LatLng> for Geometry {
    fn from(point: LatLng) -> Self {
        Geometry::Point(point)
    }
}

impl From<Polygon> for Geometry {
    fn from(polygon: Polygon) -> Self {
        Geometry::Polygon(polygon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iceland() -> Extent {
        Extent::new(63.0, 67.0, -25.0, -13.0)
    }

    #[test]
    fn test_extent_contains_point_inside() {
        assert!(iceland().contains(&Geometry::point(64.0, -19.0)));
    }

    #[test]
    fn test_extent_contains_is_inclusive_on_edges() {
        let extent = iceland();
        assert!(extent.contains(&Geometry::point(63.0, -25.0)));
        assert!(extent.contains(&Geometry::point(67.0, -13.0)));
    }

    #[test]
    fn test_extent_excludes_point_outside() {
        assert!(!iceland().contains(&Geometry::point(60.0, -19.0)));
        assert!(!iceland().contains(&Geometry::point(64.0, -10.0)));
    }

    #[test]
    fn test_extent_contains_polygon_only_when_all_vertices_inside() {
        let inside = Polygon::new(
            EngineHandle(1),
            vec![PolygonPart::new(vec![
                LatLng::new(64.0, -20.0),
                LatLng::new(64.5, -19.0),
                LatLng::new(64.0, -18.0),
            ])],
        );
        let straddling = Polygon::new(
            EngineHandle(2),
            vec![PolygonPart::new(vec![
                LatLng::new(64.0, -20.0),
                LatLng::new(68.0, -19.0),
                LatLng::new(64.0, -18.0),
            ])],
        );

        assert!(iceland().contains(&inside.into()));
        assert!(!iceland().contains(&straddling.into()));
    }

    #[test]
    fn test_extent_rejects_empty_polygon() {
        let empty = Polygon::opaque(EngineHandle(3));
        assert!(!iceland().contains(&Geometry::Polygon(empty)));
    }

    #[test]
    fn test_extent_center() {
        let center = iceland().center();
        assert!((center.lat - 65.0).abs() < 1e-9);
        assert!((center.lng + 19.0).abs() < 1e-9);
    }

    #[test]
    fn test_polygon_clone_shares_parts() {
        let polygon = Polygon::new(
            EngineHandle(7),
            vec![PolygonPart::new(vec![LatLng::new(0.0, 0.0); 4])],
        );
        let clone = polygon.clone();
        assert_eq!(clone.handle(), EngineHandle(7));
        assert_eq!(clone.vertex_count(), 4);
        assert!(std::ptr::eq(polygon.parts(), clone.parts()));
    }

    #[test]
    fn test_latlng_display() {
        assert_eq!(LatLng::new(65.0, -18.5).to_string(), "65.0000°N 18.5000°W");
    }
}
