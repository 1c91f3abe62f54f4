//! Viewport state with a single, explicit writer.
//!
//! The renderer owns the viewport; application code only mirrors it. The
//! mirror is a `tokio::sync::watch` channel split into two halves:
//!
//! - [`ViewStateWriter`]: not `Clone`, moved into the
//!   [`ViewCoordinator`](crate::view::ViewCoordinator). Only renderer change
//!   notifications flow through it.
//! - [`ViewStateReader`]: cloneable, read-only. Used once to seed the renderer
//!   and by anyone who wants to observe the viewport.
//!
//! Nothing that holds a reader can push state into the renderer, so a
//! renderer → state → renderer loop cannot be expressed.

use tokio::sync::watch;

use crate::geometry::LatLng;

/// Mirror of the renderer's zoom, center and rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    /// Zoom level.
    pub zoom: f64,
    /// Map center.
    pub center: LatLng,
    /// Rotation in degrees.
    pub rotation: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        // South-up view over Iceland
        Self {
            zoom: 6.0,
            center: LatLng::new(65.0, -18.5),
            rotation: 180.0,
        }
    }
}

/// The viewport properties the coordinator watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewProperty {
    Zoom,
    Center,
    Rotation,
}

impl ViewProperty {
    /// Every watched property.
    pub const ALL: [ViewProperty; 3] = [
        ViewProperty::Zoom,
        ViewProperty::Center,
        ViewProperty::Rotation,
    ];

    /// Property name as used by renderers.
    pub fn name(self) -> &'static str {
        match self {
            ViewProperty::Zoom => "zoom",
            ViewProperty::Center => "center",
            ViewProperty::Rotation => "rotation",
        }
    }
}

/// A viewport property value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewValue {
    Zoom(f64),
    Center(LatLng),
    Rotation(f64),
}

impl ViewValue {
    /// The property this value belongs to.
    pub fn property(&self) -> ViewProperty {
        match self {
            ViewValue::Zoom(_) => ViewProperty::Zoom,
            ViewValue::Center(_) => ViewProperty::Center,
            ViewValue::Rotation(_) => ViewProperty::Rotation,
        }
    }
}

/// Change notification pushed by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewChange {
    /// Value after the change.
    pub new_value: ViewValue,
    /// Value before the change.
    pub old_value: ViewValue,
    /// Which property changed.
    pub property: ViewProperty,
}

impl ViewChange {
    /// Build a change, deriving the property from the new value.
    pub fn new(new_value: ViewValue, old_value: ViewValue) -> Self {
        Self {
            property: new_value.property(),
            new_value,
            old_value,
        }
    }
}

impl ViewState {
    /// Copy of this state with one property replaced.
    ///
    /// A value whose variant disagrees with `property` is ignored.
    pub fn with_value(mut self, property: ViewProperty, value: ViewValue) -> Self {
        match (property, value) {
            (ViewProperty::Zoom, ViewValue::Zoom(zoom)) => self.zoom = zoom,
            (ViewProperty::Center, ViewValue::Center(center)) => self.center = center,
            (ViewProperty::Rotation, ViewValue::Rotation(rotation)) => self.rotation = rotation,
            _ => {}
        }
        self
    }
}

/// Create the writer/reader pair for a session, seeded with `initial`.
pub fn view_state_channel(initial: ViewState) -> (ViewStateWriter, ViewStateReader) {
    let (tx, rx) = watch::channel(initial);
    (ViewStateWriter { tx }, ViewStateReader { rx })
}

/// The only path that mutates [`ViewState`].
#[derive(Debug)]
pub struct ViewStateWriter {
    tx: watch::Sender<ViewState>,
}

impl ViewStateWriter {
    /// Record a renderer-originated change.
    ///
    /// Returns `true` if the stored state changed.
    pub fn apply(&self, change: &ViewChange) -> bool {
        self.tx.send_if_modified(|state| {
            let next = state.with_value(change.property, change.new_value);
            if next == *state {
                false
            } else {
                *state = next;
                true
            }
        })
    }

    /// A new reader observing this writer.
    pub fn reader(&self) -> ViewStateReader {
        ViewStateReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only view of [`ViewState`].
#[derive(Debug, Clone)]
pub struct ViewStateReader {
    rx: watch::Receiver<ViewState>,
}

impl ViewStateReader {
    /// Current state.
    pub fn current(&self) -> ViewState {
        *self.rx.borrow()
    }

    /// Wait for the next change and return the new state.
    ///
    /// Returns `None` once the writer is gone.
    pub async fn changed(&mut self) -> Option<ViewState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}
