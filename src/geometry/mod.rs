//! Geometric primitives shared by every layer of the viewer.
//!
//! Three coordinate spaces appear throughout the crate:
//!
//! - **Viewport space**: the caller's view coordinates (map units of the
//!   viewport projection, or raw units when no projection is set)
//! - **Source physical space**: map units of the source image
//! - **Source pixel space**: continuous pixel index at a given pyramid level,
//!   corner-based, so `(0, 0)` is the top-left corner of the first pixel
//!
//! [`Point2`] and [`Extent`] are used for continuous coordinates in any of
//! them; [`PixelRegion`] is the integer rectangle used for tiles.

mod point;
mod region;

pub use point::{Extent, Point2, Quad};
pub use region::PixelRegion;
