//! The map view: viewport state, the render surface interface, and the
//! coordinator that joins them.

mod coordinator;
mod state;
mod surface;

pub use coordinator::{ViewCoordinator, ViewCreated, ViewCreatedReceiver};
pub use state::{
    view_state_channel, ViewChange, ViewProperty, ViewState, ViewStateReader, ViewStateWriter,
    ViewValue,
};
pub use surface::{
    ContainerAnchor, MapModel, RenderInitError, RenderSurface, RenderSurfaceFactory,
    SurfaceOptions,
};
