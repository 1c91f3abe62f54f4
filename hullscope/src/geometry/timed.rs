//! Timeout decorator for geometry engines.
//!
//! Engines may never answer. `TimedEngine` bounds every call with an optional
//! deadline and maps expiry to [`GeometryOpError::TimedOut`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::engine::{AreaUnit, BoxFuture, GeometryEngine, GeometryOp, GeometryOpError, LengthUnit};
use super::{Geometry, Polygon};

/// Decorator applying a per-operation timeout to another engine.
pub struct TimedEngine {
    /// The wrapped engine.
    inner: Arc<dyn GeometryEngine>,

    /// Deadline per call. `None` waits indefinitely.
    timeout: Option<Duration>,
}

impl TimedEngine {
    /// Wrap `inner`, bounding each call by `timeout`.
    pub fn new(inner: Arc<dyn GeometryEngine>, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }

    /// The configured per-call deadline.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn bounded<T>(
        &self,
        op: GeometryOp,
        call: impl Future<Output = Result<T, GeometryOpError>>,
    ) -> Result<T, GeometryOpError> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| GeometryOpError::TimedOut { op, timeout })?,
            None => call.await,
        }
    }
}

impl GeometryEngine for TimedEngine {
    fn geodesic_buffer<'a>(
        &'a self,
        geometries: &'a [Geometry],
        distance: f64,
        unit: LengthUnit,
        union_results: bool,
    ) -> BoxFuture<'a, Result<Vec<Polygon>, GeometryOpError>> {
        Box::pin(self.bounded(
            GeometryOp::Buffer,
            self.inner
                .geodesic_buffer(geometries, distance, unit, union_results),
        ))
    }

    fn geodesic_area<'a>(
        &'a self,
        polygon: &'a Polygon,
        unit: AreaUnit,
    ) -> BoxFuture<'a, Result<f64, GeometryOpError>> {
        Box::pin(self.bounded(GeometryOp::Area, self.inner.geodesic_area(polygon, unit)))
    }

    fn convex_hull<'a>(
        &'a self,
        polygon: &'a Polygon,
        union_results: bool,
    ) -> BoxFuture<'a, Result<Polygon, GeometryOpError>> {
        Box::pin(self.bounded(
            GeometryOp::ConvexHull,
            self.inner.convex_hull(polygon, union_results),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::EngineHandle;

    /// Engine whose calls take a fixed amount of (virtual) time.
    struct SlowEngine {
        delay: Duration,
    }

    impl GeometryEngine for SlowEngine {
        fn geodesic_buffer<'a>(
            &'a self,
            _geometries: &'a [Geometry],
            _distance: f64,
            _unit: LengthUnit,
            _union_results: bool,
        ) -> BoxFuture<'a, Result<Vec<Polygon>, GeometryOpError>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                Ok(vec![Polygon::opaque(EngineHandle(1))])
            })
        }

        fn geodesic_area<'a>(
            &'a self,
            _polygon: &'a Polygon,
            _unit: AreaUnit,
        ) -> BoxFuture<'a, Result<f64, GeometryOpError>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                Ok(42.0)
            })
        }

        fn convex_hull<'a>(
            &'a self,
            polygon: &'a Polygon,
            _union_results: bool,
        ) -> BoxFuture<'a, Result<Polygon, GeometryOpError>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                Ok(polygon.clone())
            })
        }
    }

    fn slow(delay_ms: u64) -> Arc<dyn GeometryEngine> {
        Arc::new(SlowEngine {
            delay: Duration::from_millis(delay_ms),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_within_deadline_passes_through() {
        let engine = TimedEngine::new(slow(50), Some(Duration::from_millis(100)));
        let area = engine
            .geodesic_area(&Polygon::opaque(EngineHandle(1)), AreaUnit::SquareKilometers)
            .await;
        assert_eq!(area, Ok(42.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_past_deadline_times_out() {
        let engine = TimedEngine::new(slow(500), Some(Duration::from_millis(100)));
        let result = engine
            .convex_hull(&Polygon::opaque(EngineHandle(1)), true)
            .await;
        assert_eq!(
            result,
            Err(GeometryOpError::TimedOut {
                op: GeometryOp::ConvexHull,
                timeout: Duration::from_millis(100),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_timeout_waits_indefinitely() {
        let engine = TimedEngine::new(slow(60_000), None);
        let geometries = [Geometry::point(64.0, -19.0)];
        let result = engine
            .geodesic_buffer(&geometries, 30.0, LengthUnit::Kilometers, true)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
    }
}
