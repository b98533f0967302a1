//! Viewport ↔ source coordinate mapping.
//!
//! A [`CoordinateBridge`] is built per layer from the viewport's spatial
//! reference and rotation and the source's georeferencing. It collapses to an
//! affine map when both sides share a projection, and otherwise reprojects
//! every point through [`proj4rs`].
//!
//! Bridges are never patched: when the viewport projection, rotation or the
//! source changes, the renderer builds a new one.

mod bridge;
mod srs;

pub use bridge::{CoordinateBridge, Rotation};
pub use srs::{Projector, Reprojection, SpatialReference};
