//! Bridges a render surface and the application's view state.
//!
//! # Data flow
//!
//! ```text
//!  ViewStateReader ──(read once)──► SurfaceOptions ──► RenderSurfaceFactory
//!                                                            │
//!                                                            ▼
//!  ViewStateWriter ◄──(forwarder task)── ViewChange ◄── RenderSurface
//! ```
//!
//! State is read exactly once, when the surface is built. After that the
//! only edge is surface → state.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use super::state::{ViewChange, ViewProperty, ViewStateReader, ViewStateWriter};
use super::surface::{
    ContainerAnchor, MapModel, RenderInitError, RenderSurface, RenderSurfaceFactory,
    SurfaceOptions,
};

/// Event emitted once the surface has finished its asynchronous setup.
#[derive(Clone)]
pub struct ViewCreated {
    /// The ready surface.
    pub surface: Arc<dyn RenderSurface>,
}

impl std::fmt::Debug for ViewCreated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewCreated").finish_non_exhaustive()
    }
}

/// Receives the single [`ViewCreated`] event.
///
/// `recv` consumes the receiver, so the event can only be observed once.
#[derive(Debug)]
pub struct ViewCreatedReceiver {
    rx: oneshot::Receiver<Result<ViewCreated, RenderInitError>>,
}

impl ViewCreatedReceiver {
    /// Wait for the surface to become ready.
    pub async fn recv(self) -> Result<ViewCreated, RenderInitError> {
        self.rx.await.unwrap_or_else(|_| {
            Err(RenderInitError::NotReady(
                "surface dropped before becoming ready".to_string(),
            ))
        })
    }
}

/// Owns the render surface and the view-state writer for one session.
pub struct ViewCoordinator {
    /// The one surface created for this coordinator.
    surface: Arc<dyn RenderSurface>,

    /// Reader handed out to observers.
    view_state: ViewStateReader,

    /// Pending readiness event, until taken.
    view_created: Option<ViewCreatedReceiver>,
}

impl ViewCoordinator {
    /// Create the render surface and wire view state to it.
    ///
    /// The surface is seeded from the writer's current state. Readiness is
    /// awaited in the background and reported through
    /// [`take_view_created`](Self::take_view_created); renderer change
    /// notifications are forwarded into `writer` until the surface closes
    /// its watch channel.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `RenderInitError` if the anchor or map model is unavailable or
    /// the factory refuses to build a surface.
    pub fn initialize(
        factory: &dyn RenderSurfaceFactory,
        container: ContainerAnchor,
        map: Option<MapModel>,
        writer: ViewStateWriter,
    ) -> Result<Self, RenderInitError> {
        if !container.is_available() {
            return Err(RenderInitError::MissingAnchor);
        }
        let map = map.ok_or(RenderInitError::MissingMapModel)?;

        let view_state = writer.reader();
        let seed = view_state.current();
        let options = SurfaceOptions::seeded(container, map, &seed);

        info!(
            container = %options.container,
            zoom = seed.zoom,
            center = %seed.center,
            rotation = seed.rotation,
            "Creating render surface"
        );
        let surface = factory.create(options)?;

        let (created_tx, created_rx) = oneshot::channel();
        let ready_surface = Arc::clone(&surface);
        tokio::spawn(async move {
            let result = ready_surface.when_ready().await.map(|()| ViewCreated {
                surface: Arc::clone(&ready_surface),
            });
            match &result {
                Ok(_) => debug!("Render surface ready"),
                Err(e) => warn!(error = %e, "Render surface failed to become ready"),
            }
            // Receiver may already be gone; nothing else to notify
            let _ = created_tx.send(result);
        });

        let changes = surface.watch_view(&ViewProperty::ALL);
        tokio::spawn(forward_view_changes(changes, writer));

        Ok(Self {
            surface,
            view_state,
            view_created: Some(ViewCreatedReceiver { rx: created_rx }),
        })
    }

    /// Take the readiness receiver. Returns `None` after the first call.
    pub fn take_view_created(&mut self) -> Option<ViewCreatedReceiver> {
        self.view_created.take()
    }

    /// The surface created by this coordinator.
    pub fn surface(&self) -> Arc<dyn RenderSurface> {
        Arc::clone(&self.surface)
    }

    /// A reader for the mirrored view state.
    pub fn view_state(&self) -> ViewStateReader {
        self.view_state.clone()
    }
}

/// Mirror renderer changes into view state until the surface closes the watch.
async fn forward_view_changes(
    mut changes: mpsc::UnboundedReceiver<ViewChange>,
    writer: ViewStateWriter,
) {
    debug!("View coordinator watching zoom, center, rotation");

    while let Some(change) = changes.recv().await {
        if writer.apply(&change) {
            trace!(
                property = change.property.name(),
                new_value = ?change.new_value,
                old_value = ?change.old_value,
                "View state updated from renderer"
            );
        }
    }

    debug!("View watch closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LatLng;
    use crate::memory::{MemorySurfaceFactory, SurfaceScript};
    use crate::view::{view_state_channel, ViewState, ViewValue};
    use std::time::Duration;

    fn map() -> MapModel {
        MapModel::new("dark-gray", Vec::new())
    }

    #[tokio::test]
    async fn test_rejects_missing_anchor() {
        let factory = MemorySurfaceFactory::new();
        let (writer, _reader) = view_state_channel(ViewState::default());

        let result =
            ViewCoordinator::initialize(&factory, ContainerAnchor::new(""), Some(map()), writer);

        assert!(matches!(result, Err(RenderInitError::MissingAnchor)));
        assert_eq!(factory.created_count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_missing_map_model() {
        let factory = MemorySurfaceFactory::new();
        let (writer, _reader) = view_state_channel(ViewState::default());

        let result =
            ViewCoordinator::initialize(&factory, ContainerAnchor::new("mapView"), None, writer);

        assert!(matches!(result, Err(RenderInitError::MissingMapModel)));
    }

    #[tokio::test]
    async fn test_propagates_factory_error() {
        let factory =
            MemorySurfaceFactory::with_script(SurfaceScript::RejectCreate("no gpu".to_string()));
        let (writer, _reader) = view_state_channel(ViewState::default());

        let result = ViewCoordinator::initialize(
            &factory,
            ContainerAnchor::new("mapView"),
            Some(map()),
            writer,
        );

        assert!(matches!(result, Err(RenderInitError::Backend(_))));
    }

    #[tokio::test]
    async fn test_surface_seeded_from_view_state() {
        let factory = MemorySurfaceFactory::new();
        let initial = ViewState {
            zoom: 9.0,
            center: LatLng::new(64.1, -21.9),
            rotation: 45.0,
        };
        let (writer, _reader) = view_state_channel(initial);

        let _coordinator = ViewCoordinator::initialize(
            &factory,
            ContainerAnchor::new("mapView"),
            Some(map()),
            writer,
        )
        .unwrap();

        let options = factory.last_options().unwrap();
        assert_eq!(options.zoom, 9.0);
        assert_eq!(options.center, LatLng::new(64.1, -21.9));
        assert_eq!(options.rotation, 45.0);
        assert_eq!(factory.created_count(), 1);
    }

    #[tokio::test]
    async fn test_view_created_emitted_once() {
        let factory = MemorySurfaceFactory::new();
        let (writer, _reader) = view_state_channel(ViewState::default());

        let mut coordinator = ViewCoordinator::initialize(
            &factory,
            ContainerAnchor::new("mapView"),
            Some(map()),
            writer,
        )
        .unwrap();

        let receiver = coordinator.take_view_created().unwrap();
        let created = receiver.recv().await.unwrap();
        assert!(Arc::ptr_eq(&created.surface, &coordinator.surface()));
        assert!(coordinator.take_view_created().is_none());
    }

    #[tokio::test]
    async fn test_view_created_reports_readiness_failure() {
        let factory = MemorySurfaceFactory::with_script(SurfaceScript::FailReady(
            "style failed to load".to_string(),
        ));
        let (writer, _reader) = view_state_channel(ViewState::default());

        let mut coordinator = ViewCoordinator::initialize(
            &factory,
            ContainerAnchor::new("mapView"),
            Some(map()),
            writer,
        )
        .unwrap();

        let result = coordinator.take_view_created().unwrap().recv().await;
        assert!(matches!(result, Err(RenderInitError::NotReady(_))));
    }

    #[tokio::test]
    async fn test_renderer_changes_flow_into_view_state() {
        let factory = MemorySurfaceFactory::new();
        let (writer, _reader) = view_state_channel(ViewState::default());

        let coordinator = ViewCoordinator::initialize(
            &factory,
            ContainerAnchor::new("mapView"),
            Some(map()),
            writer,
        )
        .unwrap();
        let surface = factory.last_surface().unwrap();
        let mut state = coordinator.view_state();

        surface.user_zoom(7.5);
        let updated = tokio::time::timeout(Duration::from_secs(1), state.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.zoom, 7.5);

        surface.user_rotate(90.0);
        let updated = tokio::time::timeout(Duration::from_secs(1), state.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.rotation, 90.0);
    }

    #[tokio::test]
    async fn test_state_writes_never_reach_the_renderer() {
        let factory = MemorySurfaceFactory::new();
        let (writer, _reader) = view_state_channel(ViewState::default());

        let coordinator = ViewCoordinator::initialize(
            &factory,
            ContainerAnchor::new("mapView"),
            Some(map()),
            writer,
        )
        .unwrap();
        let surface = factory.last_surface().unwrap();
        let mut state = coordinator.view_state();

        surface.user_pan(LatLng::new(63.9, -22.6));
        tokio::time::timeout(Duration::from_secs(1), state.changed())
            .await
            .unwrap()
            .unwrap();

        // Only the user's pan was emitted; mirroring it produced no echo
        assert_eq!(surface.emitted_changes(), 1);
        assert_eq!(
            surface.view(),
            ViewState {
                center: LatLng::new(63.9, -22.6),
                ..ViewState::default()
            }
        );
        assert!(matches!(
            surface.last_change().map(|c| c.new_value),
            Some(ViewValue::Center(_))
        ));
        assert_eq!(factory.created_count(), 1);
    }
}
