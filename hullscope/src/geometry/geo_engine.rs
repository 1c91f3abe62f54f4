//! Geometry engine backed by the `geo` crate.
//!
//! Buffers are built from geodesic destination points around each input
//! vertex and merged with `geo`'s boolean union. Hulls and areas delegate to
//! `geo::ConvexHull` and `geo::GeodesicArea`. Work runs on tokio's blocking
//! pool so the event loop stays responsive while a large union is computed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use geo::algorithm::orient::{Direction, Orient};
use geo::{
    BooleanOps, ConvexHull, Coord, GeodesicArea, GeodesicDestination, LineString, MultiPolygon,
};
use tracing::trace;

use super::engine::{AreaUnit, BoxFuture, GeometryEngine, GeometryOp, GeometryOpError, LengthUnit};
use super::{EngineHandle, Geometry, LatLng, Polygon, PolygonPart};

/// Default number of segments used to approximate a buffer circle.
pub const DEFAULT_CIRCLE_SEGMENTS: usize = 64;

/// Fewest segments per buffer circle.
pub const MIN_CIRCLE_SEGMENTS: usize = 8;

/// Most segments per buffer circle.
pub const MAX_CIRCLE_SEGMENTS: usize = 1024;

/// `GeometryEngine` implementation on top of `geo`.
#[derive(Debug)]
pub struct GeoEngine {
    /// Segments per buffer circle.
    segments: usize,

    /// Source of engine handles for produced polygons.
    next_handle: Arc<AtomicU64>,
}

impl Default for GeoEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CIRCLE_SEGMENTS)
    }
}

impl GeoEngine {
    /// Create an engine approximating buffer circles with `segments` sides.
    ///
    /// `segments` is clamped to
    /// [`MIN_CIRCLE_SEGMENTS`]..=[`MAX_CIRCLE_SEGMENTS`].
    pub fn new(segments: usize) -> Self {
        Self {
            segments: segments.clamp(MIN_CIRCLE_SEGMENTS, MAX_CIRCLE_SEGMENTS),
            next_handle: Arc::new(AtomicU64::new(1)),
        }
    }

    fn allocate(next_handle: &AtomicU64) -> EngineHandle {
        EngineHandle(next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Run CPU-bound work on the blocking pool.
    async fn offload<T, F>(op: GeometryOp, work: F) -> Result<T, GeometryOpError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, GeometryOpError> + Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| GeometryOpError::rejected(op, format!("worker failed: {}", e)))?
    }
}

impl GeometryEngine for GeoEngine {
    fn geodesic_buffer<'a>(
        &'a self,
        geometries: &'a [Geometry],
        distance: f64,
        unit: LengthUnit,
        union_results: bool,
    ) -> BoxFuture<'a, Result<Vec<Polygon>, GeometryOpError>> {
        let inputs = geometries.to_vec();
        let segments = self.segments;
        let next_handle = Arc::clone(&self.next_handle);

        Box::pin(Self::offload(GeometryOp::Buffer, move || {
            if !distance.is_finite() || distance <= 0.0 {
                return Err(GeometryOpError::UnsupportedInput {
                    op: GeometryOp::Buffer,
                    reason: format!("buffer distance {}", distance),
                });
            }
            let radius_m = distance * unit.meters();

            let buffers: Vec<MultiPolygon<f64>> = inputs
                .iter()
                .map(|geometry| buffer_geometry(geometry, radius_m, segments))
                .collect();

            trace!(
                inputs = inputs.len(),
                radius_m,
                union_results,
                "Computing geodesic buffer"
            );

            if union_results {
                let mut iter = buffers.into_iter();
                let Some(first) = iter.next() else {
                    return Ok(Vec::new());
                };
                let merged = iter.fold(first, |acc, next| acc.union(&next));
                Ok(vec![from_geo(Self::allocate(&next_handle), &merged)])
            } else {
                Ok(buffers
                    .iter()
                    .map(|buffer| from_geo(Self::allocate(&next_handle), buffer))
                    .collect())
            }
        }))
    }

    fn geodesic_area<'a>(
        &'a self,
        polygon: &'a Polygon,
        unit: AreaUnit,
    ) -> BoxFuture<'a, Result<f64, GeometryOpError>> {
        // Geodesic area assumes counter-clockwise exteriors.
        let shape = to_geo(polygon).orient(Direction::Default);

        Box::pin(Self::offload(GeometryOp::Area, move || {
            Ok(shape.geodesic_area_unsigned() / unit.square_meters())
        }))
    }

    fn convex_hull<'a>(
        &'a self,
        polygon: &'a Polygon,
        union_results: bool,
    ) -> BoxFuture<'a, Result<Polygon, GeometryOpError>> {
        let shape = to_geo(polygon);
        let next_handle = Arc::clone(&self.next_handle);

        Box::pin(Self::offload(GeometryOp::ConvexHull, move || {
            if shape.0.is_empty() {
                return Err(GeometryOpError::UnsupportedInput {
                    op: GeometryOp::ConvexHull,
                    reason: "an empty polygon".to_string(),
                });
            }

            let hull = if union_results {
                MultiPolygon::new(vec![shape.convex_hull()])
            } else {
                MultiPolygon::new(shape.0.iter().map(|part| part.convex_hull()).collect())
            };

            Ok(from_geo(Self::allocate(&next_handle), &hull))
        }))
    }
}

/// Buffer a single geometry into a (possibly multi-part) polygon.
fn buffer_geometry(geometry: &Geometry, radius_m: f64, segments: usize) -> MultiPolygon<f64> {
    match geometry {
        Geometry::Point(center) => MultiPolygon::new(vec![circle(center, radius_m, segments)]),
        Geometry::Polygon(polygon) => {
            let shape = to_geo(polygon);
            polygon
                .parts()
                .iter()
                .flat_map(|part| part.exterior.iter())
                .map(|vertex| MultiPolygon::new(vec![circle(vertex, radius_m, segments)]))
                .fold(shape, |acc, disc| acc.union(&disc))
        }
    }
}

/// Approximate a geodesic circle, wound counter-clockwise.
fn circle(center: &LatLng, radius_m: f64, segments: usize) -> geo::Polygon<f64> {
    let origin = geo::Point::new(center.lng, center.lat);
    let ring: Vec<Coord<f64>> = (0..segments)
        .rev()
        .map(|i| {
            let bearing = 360.0 * i as f64 / segments as f64;
            let vertex = origin.geodesic_destination(bearing, radius_m);
            Coord {
                x: vertex.x(),
                y: vertex.y(),
            }
        })
        .collect();

    geo::Polygon::new(LineString::from(ring), vec![])
}

fn ring_to_geo(ring: &[LatLng]) -> LineString<f64> {
    ring.iter()
        .map(|p| Coord { x: p.lng, y: p.lat })
        .collect()
}

fn ring_from_geo(ring: &LineString<f64>) -> Vec<LatLng> {
    ring.coords().map(|c| LatLng::new(c.y, c.x)).collect()
}

fn to_geo(polygon: &Polygon) -> MultiPolygon<f64> {
    MultiPolygon::new(
        polygon
            .parts()
            .iter()
            .map(|part| {
                geo::Polygon::new(
                    ring_to_geo(&part.exterior),
                    part.interiors.iter().map(|r| ring_to_geo(r)).collect(),
                )
            })
            .collect(),
    )
}

fn from_geo(handle: EngineHandle, shape: &MultiPolygon<f64>) -> Polygon {
    let parts = shape
        .0
        .iter()
        .map(|poly| PolygonPart {
            exterior: ring_from_geo(poly.exterior()),
            interiors: poly.interiors().iter().map(ring_from_geo).collect(),
        })
        .collect();
    Polygon::new(handle, parts)
}
