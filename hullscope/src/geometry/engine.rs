//! The asynchronous geometry engine interface.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use super::{Geometry, Polygon};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Linear units accepted by buffer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    Meters,
    Kilometers,
}

impl LengthUnit {
    /// Number of meters in one unit.
    pub fn meters(self) -> f64 {
        match self {
            LengthUnit::Meters => 1.0,
            LengthUnit::Kilometers => 1_000.0,
        }
    }
}

/// Area units accepted by area operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaUnit {
    SquareMeters,
    SquareKilometers,
}

impl AreaUnit {
    /// Number of square meters in one unit.
    pub fn square_meters(self) -> f64 {
        match self {
            AreaUnit::SquareMeters => 1.0,
            AreaUnit::SquareKilometers => 1_000_000.0,
        }
    }
}

/// Identifies an engine operation in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryOp {
    Buffer,
    Area,
    ConvexHull,
}

impl fmt::Display for GeometryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeometryOp::Buffer => "geodesic buffer",
            GeometryOp::Area => "geodesic area",
            GeometryOp::ConvexHull => "convex hull",
        };
        f.write_str(name)
    }
}

/// Errors raised by geometry engine operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryOpError {
    /// The engine rejected the operation.
    #[error("{op} failed: {reason}")]
    Rejected { op: GeometryOp, reason: String },

    /// The operation returned no geometry where one was required.
    #[error("{0} returned no geometry")]
    EmptyResult(GeometryOp),

    /// The input geometry is not supported by the operation.
    #[error("{op} does not accept {reason}")]
    UnsupportedInput { op: GeometryOp, reason: String },

    /// The engine did not answer in time.
    #[error("{op} timed out after {timeout:?}")]
    TimedOut { op: GeometryOp, timeout: Duration },
}

impl GeometryOpError {
    /// Shorthand for a rejection.
    pub fn rejected(op: GeometryOp, reason: impl Into<String>) -> Self {
        GeometryOpError::Rejected {
            op,
            reason: reason.into(),
        }
    }
}

/// Asynchronous geometry engine.
///
/// Implementations own the actual algorithms. Every call may fail; the
/// pipeline treats a failure as fatal to the current analysis run only.
///
/// # Dyn Compatibility
///
/// Methods return [`BoxFuture`] so engines can be shared as
/// `Arc<dyn GeometryEngine>` and wrapped by decorators such as
/// [`TimedEngine`](super::TimedEngine).
pub trait GeometryEngine: Send + Sync {
    /// Buffer `geometries` by `distance` along the ellipsoid.
    ///
    /// With `union_results` set, overlapping buffers are merged and the
    /// first returned polygon is the unioned result.
    fn geodesic_buffer<'a>(
        &'a self,
        geometries: &'a [Geometry],
        distance: f64,
        unit: LengthUnit,
        union_results: bool,
    ) -> BoxFuture<'a, Result<Vec<Polygon>, GeometryOpError>>;

    /// Geodesic area of `polygon`.
    fn geodesic_area<'a>(
        &'a self,
        polygon: &'a Polygon,
        unit: AreaUnit,
    ) -> BoxFuture<'a, Result<f64, GeometryOpError>>;

    /// Convex hull of `polygon`, merged across its parts when
    /// `union_results` is set.
    fn convex_hull<'a>(
        &'a self,
        polygon: &'a Polygon,
        union_results: bool,
    ) -> BoxFuture<'a, Result<Polygon, GeometryOpError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_factors() {
        assert_eq!(LengthUnit::Kilometers.meters(), 1_000.0);
        assert_eq!(LengthUnit::Meters.meters(), 1.0);
        assert_eq!(AreaUnit::SquareKilometers.square_meters(), 1_000_000.0);
    }

    #[test]
    fn test_error_display() {
        let err = GeometryOpError::rejected(GeometryOp::Buffer, "self-intersection");
        assert_eq!(err.to_string(), "geodesic buffer failed: self-intersection");

        let err = GeometryOpError::EmptyResult(GeometryOp::ConvexHull);
        assert_eq!(err.to_string(), "convex hull returned no geometry");

        let err = GeometryOpError::TimedOut {
            op: GeometryOp::Area,
            timeout: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "geodesic area timed out after 2s");
    }
}
