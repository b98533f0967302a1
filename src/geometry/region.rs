//! Integer pixel rectangles.

use serde::{Deserialize, Serialize};

use super::point::{Extent, Point2};

/// Slack used when snapping continuous coordinates to pixel edges, so that
/// round-off in a transform does not pull in a neighbouring pixel.
const SNAP_EPSILON: f64 = 1e-6;

/// Axis-aligned rectangle of pixels at one pyramid level.
///
/// `x`/`y` is the index of the top-left pixel; the rectangle spans
/// `[x, x + width) × [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRegion {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl PixelRegion {
    pub const fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region anchored at the origin, covering a full level.
    pub const fn with_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Build a region from exclusive bounds; returns `None` if empty.
    pub fn from_bounds(x0: i64, y0: i64, x1: i64, y1: i64) -> Option<Self> {
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        let width = u32::try_from(x1 - x0).ok()?;
        let height = u32::try_from(y1 - y0).ok()?;
        Some(Self::new(x0, y0, width, height))
    }

    /// Smallest region containing the continuous extent.
    ///
    /// Returns `None` when the extent is empty or not finite.
    pub fn covering(extent: &Extent) -> Option<Self> {
        let corners = [extent.min_x, extent.min_y, extent.max_x, extent.max_y];
        if corners.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let x0 = (extent.min_x + SNAP_EPSILON).floor();
        let y0 = (extent.min_y + SNAP_EPSILON).floor();
        let x1 = (extent.max_x - SNAP_EPSILON).ceil();
        let y1 = (extent.max_y - SNAP_EPSILON).ceil();
        let limit = i64::MAX as f64 / 4.0;
        if [x0, y0, x1, y1].iter().any(|v| v.abs() > limit) {
            return None;
        }
        Self::from_bounds(x0 as i64, y0 as i64, x1 as i64, y1 as i64)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i64 {
        self.x + i64::from(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i64 {
        self.y + i64::from(self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Intersection with `bounds`, or `None` if nothing remains.
    pub fn crop(&self, bounds: &PixelRegion) -> Option<PixelRegion> {
        Self::from_bounds(
            self.x.max(bounds.x),
            self.y.max(bounds.y),
            self.right().min(bounds.right()),
            self.bottom().min(bounds.bottom()),
        )
    }

    pub fn intersects(&self, other: &PixelRegion) -> bool {
        self.crop(other).is_some()
    }

    /// Returns `true` if the pixel at `(x, y)` lies in the region.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Returns `true` if `other` lies entirely inside this region.
    pub fn contains_region(&self, other: &PixelRegion) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Continuous corners in upper-left, upper-right, lower-left, lower-right order.
    pub fn corners(&self) -> [Point2; 4] {
        let (x0, y0) = (self.x as f64, self.y as f64);
        let (x1, y1) = (self.right() as f64, self.bottom() as f64);
        [
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x0, y1),
            Point2::new(x1, y1),
        ]
    }
}
