//! Hullscope - reactive geodesic buffer and convex hull analysis
//!
//! A map view shows a layer of point features. Moving the buffer distance
//! slider buffers the features inside the visible extent by that distance,
//! computes the convex hull of the unioned buffer, and reports both areas.
//!
//! # Modules
//!
//! - [`view`]: viewport state and the render surface it mirrors
//! - [`layers`]: layer resolution, readiness, and the feature snapshot
//! - [`geometry`]: geometry values and the asynchronous engine interface
//! - [`analysis`]: slider debounce, the analysis chain, and the presenter
//! - [`session`]: wires everything together from a [`config::HullscopeConfig`]
//! - [`memory`]: in-process surface and layers for tests and replay

pub mod analysis;
pub mod config;
pub mod geometry;
pub mod layers;
pub mod logging;
pub mod memory;
pub mod session;
pub mod view;
